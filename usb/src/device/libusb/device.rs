use crate::device::base::{
    ExecutableSisPm, FullSisPmDevice, OutletBus, SisPmCommands, SisPmDevice, UsbData,
    UsbDeviceEntry,
};
use crate::error::{OutletError, Result, TransportError};
use log::{debug, info, warn};
use rusb::{Device, DeviceDescriptor, DeviceHandle, GlobalContext, Language, UsbContext};
use std::time::Duration;

const INTERFACE: u8 = 0;
const CONFIGURATION: u8 = 1;

pub struct LibUsbBus<T: UsbContext = GlobalContext> {
    context: T,
}

impl LibUsbBus<GlobalContext> {
    pub fn new() -> Self {
        Self {
            context: GlobalContext::default(),
        }
    }
}

impl Default for LibUsbBus<GlobalContext> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: UsbContext> LibUsbBus<T> {
    pub fn with_context(context: T) -> Self {
        Self { context }
    }
}

impl<T: UsbContext> OutletBus for LibUsbBus<T> {
    type Device = SisPmUSB<T>;

    fn scan(&self) -> Vec<UsbDeviceEntry> {
        let mut found_devices = Vec::new();

        let devices = match self.context.devices() {
            Ok(devices) => devices,
            Err(error) => {
                debug!("Unable to enumerate USB devices: {}", error);
                return found_devices;
            }
        };

        for device in devices.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                found_devices.push(UsbDeviceEntry::new(
                    device.bus_number(),
                    device.address(),
                    descriptor.vendor_id(),
                    descriptor.product_id(),
                ));
            }
        }

        found_devices
    }

    fn open(&self, device: &SisPmDevice, timeout: Duration) -> Result<SisPmUSB<T>> {
        SisPmUSB::from_device(&self.context, *device, timeout)
    }
}

pub struct SisPmUSB<T: UsbContext> {
    // None once the device has been released.
    handle: Option<DeviceHandle<T>>,
    device: SisPmDevice,
    descriptor: DeviceDescriptor,

    language: Option<Language>,
    interface_claimed: bool,
    timeout: Duration,
}

impl<T: UsbContext> SisPmUSB<T> {
    fn find_device(context: &T, device: &SisPmDevice) -> Result<(Device<T>, DeviceDescriptor)> {
        for usb_device in context.devices()?.iter() {
            if usb_device.bus_number() != device.bus_number()
                || usb_device.address() != device.address()
            {
                continue;
            }

            let descriptor = usb_device.device_descriptor()?;
            let entry = UsbDeviceEntry::new(
                usb_device.bus_number(),
                usb_device.address(),
                descriptor.vendor_id(),
                descriptor.product_id(),
            );

            // The address may have been handed to something else since the scan.
            if device.matches(&entry) {
                return Ok((usb_device, descriptor));
            }
        }
        Err(OutletError::NotFound)
    }

    pub fn from_device(context: &T, device: SisPmDevice, timeout: Duration) -> Result<Self> {
        let (usb_device, descriptor) = Self::find_device(context, &device)?;
        let handle = usb_device.open()?;

        info!("Connected to {} at {:?}", device, usb_device);

        // Only needed for the string descriptors, devices without any still work.
        let language = match handle.read_languages(timeout) {
            Ok(languages) => languages.first().copied(),
            Err(error) => {
                debug!("Unable to read languages: {}", error);
                None
            }
        };

        cfg_if::cfg_if! {
            if #[cfg(target_os = "linux")] {
                // usbhid grabs the device on plug, it needs to let go before we can claim it.
                if let Err(error) = handle.set_auto_detach_kernel_driver(true) {
                    debug!("Kernel driver auto-detach unavailable: {}", error);
                }
            }
        }

        debug!(
            "Set Active Config: {:?}",
            handle.set_active_configuration(CONFIGURATION)
        );
        handle.claim_interface(INTERFACE)?;

        Ok(Self {
            handle: Some(handle),
            device,
            descriptor,
            language,
            interface_claimed: true,
            timeout,
        })
    }

    fn handle(&self) -> Result<&DeviceHandle<T>> {
        self.handle
            .as_ref()
            .ok_or(OutletError::Transport(TransportError::Closed))
    }
}

impl<T: UsbContext> ExecutableSisPm for SisPmUSB<T> {
    fn device(&self) -> &SisPmDevice {
        &self.device
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn control_transfer(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let handle = self.handle()?;

        let length = if request_type & 0x80 != 0 {
            handle.read_control(request_type, request, value, index, data, timeout)?
        } else {
            handle.write_control(request_type, request, value, index, data, timeout)?
        };
        Ok(length)
    }

    fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if self.interface_claimed {
            if let Err(error) = handle.release_interface(INTERFACE) {
                warn!("Unable to release interface on {}: {}", self.device, error);
            }
            self.interface_claimed = false;
        }

        // Dropping the handle closes it, and reattaches the kernel driver where detached.
        drop(handle);
        info!("Released {}", self.device);
    }

    fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn get_descriptor(&self) -> Result<UsbData> {
        let handle = self.handle()?;
        let version = self.descriptor.device_version();
        let device_version = (version.0, version.1, version.2);

        let (device_manufacturer, product_name) = match self.language {
            Some(language) => (
                handle.read_manufacturer_string(language, &self.descriptor, self.timeout)?,
                handle.read_product_string(language, &self.descriptor, self.timeout)?,
            ),
            None => (
                handle.read_manufacturer_string_ascii(&self.descriptor)?,
                handle.read_product_string_ascii(&self.descriptor)?,
            ),
        };

        Ok(UsbData {
            vendor_id: self.descriptor.vendor_id(),
            product_id: self.descriptor.product_id(),
            device_version,
            device_manufacturer,
            product_name,
        })
    }
}

impl<T: UsbContext> SisPmCommands for SisPmUSB<T> {}
impl<T: UsbContext> FullSisPmDevice for SisPmUSB<T> {}

impl<T: UsbContext> Drop for SisPmUSB<T> {
    fn drop(&mut self) {
        self.close();
    }
}
