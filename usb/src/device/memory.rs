//! An in-memory bus which behaves like a set of attached SiS-PM devices.
//!
//! Devices answer the same feature reports as the hardware, keep their outlet states on the bus
//! (so reopening a device sees earlier switches) and every handle records the transfers issued
//! through it. Useful for exercising code built on `OutletBus` without hardware attached.

use crate::commands::{PAYLOAD_LENGTH, REQUEST_GET_REPORT, REQUEST_SET_REPORT};
use crate::device::base::{
    ExecutableSisPm, FullSisPmDevice, OutletBus, SisPmCommands, SisPmDevice, UsbData,
    UsbDeviceEntry,
};
use crate::error::{OutletError, Result, TransportError};
use log::{debug, info};
use sispm_types::{DeviceType, OutletState, VID_GEMBIRD};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const BUS_NUMBER: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
}

struct AttachedDevice {
    entry: UsbDeviceEntry,
    serial: [u8; PAYLOAD_LENGTH],
    outlets: Vec<OutletState>,
    failures: HashMap<u8, rusb::Error>,
    access_denied: bool,
}

#[derive(Default)]
struct BusState {
    devices: Vec<AttachedDevice>,
    next_address: u8,
}

impl BusState {
    fn find(&mut self, device: &SisPmDevice) -> Option<&mut AttachedDevice> {
        self.devices
            .iter_mut()
            .find(|attached| device.matches(&attached.entry))
    }
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn attach(&self, vendor_id: u16, product_id: u16, outlets: u8, serial: [u8; 6]) -> u8 {
        let mut state = self.lock();
        state.next_address += 1;
        let address = state.next_address;

        state.devices.push(AttachedDevice {
            entry: UsbDeviceEntry::new(BUS_NUMBER, address, vendor_id, product_id),
            serial,
            outlets: vec![OutletState::Off; outlets as usize],
            failures: HashMap::new(),
            access_denied: false,
        });
        address
    }

    /// Attaches a device with every outlet switched off.
    pub fn add_device(&self, device_type: DeviceType, serial: [u8; 6]) -> SisPmDevice {
        let address = self.attach(
            VID_GEMBIRD,
            device_type.product_id(),
            device_type.outlet_count(),
            serial,
        );
        SisPmDevice::new(BUS_NUMBER, address, device_type)
    }

    /// Attaches something which isn't an outlet switch.
    pub fn add_foreign_device(&self, vendor_id: u16, product_id: u16) {
        self.attach(vendor_id, product_id, 0, [0; 6]);
    }

    pub fn unplug(&self, device: &SisPmDevice) {
        self.lock()
            .devices
            .retain(|attached| !device.matches(&attached.entry));
    }

    /// Makes every transfer touching `outlet` fail with `error`.
    pub fn fail_outlet(&self, device: &SisPmDevice, outlet: u8, error: rusb::Error) {
        if let Some(attached) = self.lock().find(device) {
            attached.failures.insert(outlet, error);
        }
    }

    pub fn deny_access(&self, device: &SisPmDevice) {
        if let Some(attached) = self.lock().find(device) {
            attached.access_denied = true;
        }
    }

    pub fn outlet_states(&self, device: &SisPmDevice) -> Vec<OutletState> {
        self.lock()
            .find(device)
            .map(|attached| attached.outlets.clone())
            .unwrap_or_default()
    }

    fn transfer(
        &self,
        device: &SisPmDevice,
        request_type: u8,
        request: u8,
        value: u16,
        data: &mut [u8],
    ) -> Result<usize> {
        let mut state = self.lock();
        let attached = state.find(device).ok_or(OutletError::NotFound)?;

        let report_id = (value & 0xff) as u8;
        let reading = request_type & 0x80 != 0;

        // Report 1 carries the serial, every third report after it an outlet.
        if report_id == 1 {
            if !reading || request != REQUEST_GET_REPORT {
                return Err(rusb::Error::Pipe.into());
            }
            let length = data.len().min(PAYLOAD_LENGTH);
            data[..length].copy_from_slice(&attached.serial[..length]);
            return Ok(length);
        }

        let outlet = report_id / 3;
        if report_id % 3 != 0 || outlet == 0 || outlet as usize > attached.outlets.len() {
            return Err(rusb::Error::Pipe.into());
        }

        if let Some(error) = attached.failures.get(&outlet) {
            return Err((*error).into());
        }

        let slot = outlet as usize - 1;
        match (reading, request) {
            (true, REQUEST_GET_REPORT) => {
                let length = data.len().min(PAYLOAD_LENGTH);
                if length < 2 {
                    return Err(rusb::Error::Overflow.into());
                }
                data[..length].fill(0);
                data[0] = report_id;
                data[1] = if attached.outlets[slot].is_on() { 0x03 } else { 0x00 };
                Ok(length)
            }
            (false, REQUEST_SET_REPORT) => {
                let switched = OutletState::from(data.get(1).is_some_and(|&value| value != 0));
                debug!("Memory outlet {} of {} now {}", outlet, device, switched);
                attached.outlets[slot] = switched;
                Ok(data.len())
            }
            _ => Err(rusb::Error::Pipe.into()),
        }
    }
}

impl OutletBus for MemoryBus {
    type Device = MemoryOutletDevice;

    fn scan(&self) -> Vec<UsbDeviceEntry> {
        self.lock()
            .devices
            .iter()
            .map(|attached| attached.entry)
            .collect()
    }

    fn open(&self, device: &SisPmDevice, timeout: Duration) -> Result<MemoryOutletDevice> {
        let mut state = self.lock();
        let attached = state.find(device).ok_or(OutletError::NotFound)?;
        if attached.access_denied {
            return Err(OutletError::PermissionDenied);
        }

        info!("Connected to memory device {}", device);
        Ok(MemoryOutletDevice {
            bus: self.clone(),
            device: *device,
            timeout,
            closed: false,
            releases: 0,
            transfers: vec![],
        })
    }
}

pub struct MemoryOutletDevice {
    bus: MemoryBus,
    device: SisPmDevice,
    timeout: Duration,
    closed: bool,
    releases: usize,
    transfers: Vec<RecordedTransfer>,
}

impl MemoryOutletDevice {
    /// Every transfer issued through this handle, in order.
    pub fn transfers(&self) -> &[RecordedTransfer] {
        &self.transfers
    }

    /// How many times the handle actually released the device.
    pub fn release_count(&self) -> usize {
        self.releases
    }
}

impl ExecutableSisPm for MemoryOutletDevice {
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
        _timeout: Duration,
    ) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }

        self.transfers.push(RecordedTransfer {
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        });
        self.bus
            .transfer(&self.device, request_type, request, value, data)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.releases += 1;
        info!("Released memory device {}", self.device);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn get_descriptor(&self) -> Result<UsbData> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        if self.bus.lock().find(&self.device).is_none() {
            return Err(OutletError::NotFound);
        }

        Ok(UsbData {
            vendor_id: self.device.vendor_id(),
            product_id: self.device.product_id(),
            device_version: (0, 0, 1),
            device_manufacturer: String::from("Gembird"),
            product_name: self.device.device_type().description().to_string(),
        })
    }
}

impl SisPmCommands for MemoryOutletDevice {}
impl FullSisPmDevice for MemoryOutletDevice {}

impl Drop for MemoryOutletDevice {
    fn drop(&mut self) {
        self.close();
    }
}
