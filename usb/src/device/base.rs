use crate::commands::{decode_status, format_serial, Command, PAYLOAD_LENGTH};
use crate::error::{OutletError, Result, TransportError};
use log::debug;
use sispm_types::{DeviceType, OutletIndex, OutletState, VID_GEMBIRD};
use std::fmt::Formatter;
use std::ops::RangeInclusive;
use std::time::Duration;

// This is a basic SuperTrait which defines all the 'Parts' of an outlet device for use.
pub trait FullSisPmDevice: SisPmCommands + Send {}

/// Something that can enumerate and open devices, libusb in practice.
pub trait OutletBus {
    type Device: FullSisPmDevice;

    /// Every device currently attached, regardless of vendor. An unreadable bus is empty.
    fn scan(&self) -> Vec<UsbDeviceEntry>;

    fn open(&self, device: &SisPmDevice, timeout: Duration) -> Result<Self::Device>;
}

pub trait ExecutableSisPm {
    fn device(&self) -> &SisPmDevice;
    fn timeout(&self) -> Duration;

    /// Issues a single control transfer. Bit 7 of `request_type` picks the direction, reads
    /// land in `data`. Returns the number of bytes transferred.
    fn control_transfer(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize>;

    /// Releases the device. Safe to call more than once, later calls do nothing.
    fn close(&mut self);
    fn is_closed(&self) -> bool;

    fn get_descriptor(&self) -> Result<UsbData>;

    fn perform_request(&mut self, command: Command) -> Result<Vec<u8>> {
        let mut request = command.request();
        let timeout = self.timeout();

        debug!("Sending {:?} to {}", command, self.device());
        let length = self.control_transfer(
            request.request_type,
            request.request,
            request.value,
            request.index,
            &mut request.data,
            timeout,
        )?;

        if !request.is_read() {
            return Ok(vec![]);
        }

        let response = request.data[..length.min(PAYLOAD_LENGTH)].to_vec();
        debug!("Response for {}: {:x?}", command, response);
        Ok(response)
    }
}

// These are commands that can be executed, but control_transfer must be implemented..
pub trait SisPmCommands: ExecutableSisPm {
    fn outlets(&self) -> RangeInclusive<u8> {
        1..=self.device().device_type().outlet_count()
    }

    /// Resolves an index into the outlet numbers it covers, in ascending order.
    fn select_outlets(&self, outlet: OutletIndex) -> Result<Vec<u8>> {
        let outlets = self.outlets();
        match outlet {
            OutletIndex::All => Ok(outlets.collect()),
            OutletIndex::Number(number) if outlets.contains(&number) => Ok(vec![number]),
            OutletIndex::Number(number) => Err(OutletError::InvalidArgument {
                outlet: number,
                count: *outlets.end(),
            }),
        }
    }

    fn read_outlet(&mut self, number: u8) -> Result<OutletState> {
        let response = self.perform_request(Command::GetStatus(number))?;
        decode_status(&response).ok_or_else(|| {
            TransportError::MalformedResponse {
                expected: 2,
                received: response.len(),
            }
            .into()
        })
    }

    fn write_outlet(&mut self, number: u8, state: OutletState) -> Result<()> {
        self.perform_request(Command::SetStatus(number, state))?;
        Ok(())
    }

    /// Switches the selected outlets. With `All` the outlets are switched in ascending order
    /// and the first failure is returned as is, outlets before it stay switched.
    fn set_outlet(&mut self, outlet: OutletIndex, state: OutletState) -> Result<()> {
        for number in self.select_outlets(outlet)? {
            debug!("Switching outlet {} {}", number, state);
            self.write_outlet(number, state)?;
        }
        Ok(())
    }

    fn get_outlet_state(&mut self, outlet: OutletIndex) -> Result<OutletReading> {
        let numbers = self.select_outlets(outlet)?;
        match outlet {
            OutletIndex::Number(number) => Ok(OutletReading::One(self.read_outlet(number)?)),
            OutletIndex::All => {
                let mut states = Vec::with_capacity(numbers.len());
                for number in numbers {
                    states.push(self.read_outlet(number)?);
                }
                Ok(OutletReading::All(states))
            }
        }
    }

    /// Flips the selected outlets, returning the state each one was switched to.
    fn toggle_outlet(&mut self, outlet: OutletIndex) -> Result<Vec<(u8, OutletState)>> {
        let mut toggled = vec![];
        for number in self.select_outlets(outlet)? {
            let state = self.read_outlet(number)?.inverted();
            self.write_outlet(number, state)?;
            toggled.push((number, state));
        }
        Ok(toggled)
    }

    fn serial_number(&mut self) -> Result<String> {
        let response = self.perform_request(Command::GetSerial)?;
        if response.is_empty() {
            return Err(TransportError::MalformedResponse {
                expected: PAYLOAD_LENGTH,
                received: 0,
            }
            .into());
        }
        Ok(format_serial(&response))
    }

    fn device_info(&mut self) -> Result<DeviceInfo> {
        let serial = self.serial_number()?;
        let device = self.device();

        Ok(DeviceInfo {
            device_type: device.device_type(),
            outlet_count: device.device_type().outlet_count(),
            serial,
            bus_number: device.bus_number(),
            address: device.address(),
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutletReading {
    One(OutletState),
    All(Vec<OutletState>),
}

impl OutletReading {
    pub fn states(&self) -> &[OutletState] {
        match self {
            OutletReading::One(state) => std::slice::from_ref(state),
            OutletReading::All(states) => states,
        }
    }
}

// A raw entry from a bus scan, before filtering by vendor and product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceEntry {
    pub(crate) bus_number: u8,
    pub(crate) address: u8,
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
}

impl UsbDeviceEntry {
    pub fn new(bus_number: u8, address: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            bus_number,
            address,
            vendor_id,
            product_id,
        }
    }

    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }
    pub fn address(&self) -> u8 {
        self.address
    }
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
}

// We primarily need the bus number, and address for comparison..
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SisPmDevice {
    pub(crate) bus_number: u8,
    pub(crate) address: u8,
    pub(crate) device_type: DeviceType,
}

impl SisPmDevice {
    pub fn new(bus_number: u8, address: u8, device_type: DeviceType) -> Self {
        Self {
            bus_number,
            address,
            device_type,
        }
    }

    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }
    pub fn address(&self) -> u8 {
        self.address
    }
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }
    pub fn vendor_id(&self) -> u16 {
        VID_GEMBIRD
    }
    pub fn product_id(&self) -> u16 {
        self.device_type.product_id()
    }

    pub(crate) fn matches(&self, entry: &UsbDeviceEntry) -> bool {
        entry.bus_number == self.bus_number
            && entry.address == self.address
            && entry.vendor_id == self.vendor_id()
            && entry.product_id == self.product_id()
    }
}

impl std::fmt::Display for SisPmDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (bus {:03}, address {:03})",
            self.device_type.description(),
            self.bus_number,
            self.address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub(crate) device_type: DeviceType,
    pub(crate) outlet_count: u8,
    pub(crate) serial: String,
    pub(crate) bus_number: u8,
    pub(crate) address: u8,
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
}

impl DeviceInfo {
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }
    pub fn outlet_count(&self) -> u8 {
        self.outlet_count
    }
    pub fn serial(&self) -> &str {
        &self.serial
    }
    pub fn bus_number(&self) -> u8 {
        self.bus_number
    }
    pub fn address(&self) -> u8 {
        self.address
    }
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
}

pub struct UsbData {
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) device_version: (u8, u8, u8),
    pub(crate) device_manufacturer: String,
    pub(crate) product_name: String,
}

impl UsbData {
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
    pub fn device_version(&self) -> (u8, u8, u8) {
        self.device_version
    }
    pub fn device_manufacturer(&self) -> String {
        self.device_manufacturer.clone()
    }
    pub fn product_name(&self) -> String {
        self.product_name.clone()
    }
}
