pub mod base;
pub mod libusb;
pub mod memory;
