// This file wraps bus scanning into some 'Plain Old Rust Structs' which can be used by other
// modules to find outlet devices, without them needing to know how the bus is polled.
use crate::device::base::{ExecutableSisPm, OutletBus, SisPmCommands, SisPmDevice};
use crate::error::Result;
use log::{debug, warn};
use sispm_types::{DeviceType, VID_GEMBIRD};
use std::time::Duration;
use strum::IntoEnumIterator;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Returns a snapshot of every known SiS-PM device on the bus.
pub fn list_devices<B: OutletBus>(bus: &B) -> Vec<SisPmDevice> {
    let device_types: Vec<DeviceType> = DeviceType::iter().collect();
    list_devices_with_products(bus, &device_types)
}

/// As `list_devices`, but only for the given device types.
pub fn list_devices_with_products<B: OutletBus>(
    bus: &B,
    device_types: &[DeviceType],
) -> Vec<SisPmDevice> {
    let mut found_devices = Vec::new();

    for entry in bus.scan() {
        if entry.vendor_id() != VID_GEMBIRD {
            continue;
        }

        if let Some(device_type) = DeviceType::from_product_id(entry.product_id()) {
            if device_types.contains(&device_type) {
                let device = SisPmDevice::new(entry.bus_number(), entry.address(), device_type);
                debug!("Found {}", device);
                found_devices.push(device);
            }
        }
    }

    found_devices
}

/// Opens each device in turn, and returns the first whose serial matches.
///
/// Devices which can't be opened or read don't stop the search, but when nothing matches the
/// first such failure is returned, as the wanted device may be the one that failed.
pub fn find_device_by_serial<B: OutletBus>(
    bus: &B,
    serial: &str,
    timeout: Duration,
) -> Result<Option<B::Device>> {
    let wanted = serial.trim().to_lowercase();
    let mut first_error = None;

    for device in list_devices(bus) {
        let mut handle = match bus.open(&device, timeout) {
            Ok(handle) => handle,
            Err(error) => {
                warn!("Unable to open {}: {}", device, error);
                first_error.get_or_insert(error);
                continue;
            }
        };

        match handle.serial_number() {
            Ok(found) if found == wanted => return Ok(Some(handle)),
            Ok(found) => debug!("Skipping {}, serial {}", device, found),
            Err(error) => {
                warn!("Unable to read serial from {}: {}", device, error);
                first_error.get_or_insert(error);
            }
        }
        handle.close();
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(None),
    }
}
