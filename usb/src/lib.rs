pub use rusb;
pub use sispm_types;

pub mod commands;
pub mod device;
pub mod devices;
pub mod error;

pub use device::base::{
    DeviceInfo, ExecutableSisPm, FullSisPmDevice, OutletBus, OutletReading, SisPmCommands,
    SisPmDevice, UsbData, UsbDeviceEntry,
};
pub use device::libusb::device::{LibUsbBus, SisPmUSB};
pub use device::memory::{MemoryBus, MemoryOutletDevice, RecordedTransfer};
pub use error::{OutletError, TransportError};
