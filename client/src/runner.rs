use crate::cli::{Cli, LevelFilter, SubCommands};
use crate::settings::Settings;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{debug, warn};
use serde::Serialize;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use sispm_types::{DeviceType, OutletIndex, OutletState};
use sispm_usb::devices::{find_device_by_serial, list_devices};
use sispm_usb::{ExecutableSisPm, LibUsbBus, OutletBus, SisPmCommands, SisPmDevice};
use std::io::Write;
use std::time::Duration;

pub fn run_cli() -> Result<()> {
    let cli: Cli = Cli::parse();

    CombinedLogger::init(vec![TermLogger::new(
        match cli.log_level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        },
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    let bus = LibUsbBus::new();
    let stdout = std::io::stdout();
    execute(&cli, &bus, &mut stdout.lock())
}

#[derive(Serialize)]
struct DeviceSummary {
    serial: Option<String>,
    device_type: DeviceType,
    description: &'static str,
    outlets: u8,
    bus_number: u8,
    address: u8,
}

#[derive(Serialize)]
struct DeviceDetails {
    serial: String,
    device_type: DeviceType,
    description: &'static str,
    outlets: u8,
    manufacturer: String,
    product: String,
    vendor_id: String,
    product_id: String,
    bus_number: u8,
    address: u8,
}

#[derive(Serialize)]
struct OutletStatus {
    outlet: u8,
    state: OutletState,
}

/// Runs the parsed command line against `bus`, writing results to `out`.
pub fn execute<B: OutletBus>(cli: &Cli, bus: &B, out: &mut impl Write) -> Result<()> {
    let settings = Settings::read(&cli.config)?;
    let timeout = Duration::from_millis(cli.timeout.unwrap_or(settings.timeout_millis));
    if timeout.is_zero() {
        bail!("The transfer timeout must be at least 1 millisecond");
    }
    debug!("Using a transfer timeout of {:?}", timeout);

    let serial = cli
        .device
        .as_deref()
        .or(settings.default_device.as_deref());

    match &cli.command {
        SubCommands::List => list(bus, timeout, cli.json, out),
        SubCommands::Config {
            default_device,
            clear_default_device,
            timeout_millis,
        } => {
            let mut settings = settings.clone();
            if let Some(device) = default_device {
                settings.default_device = Some(device.trim().to_lowercase());
            }
            if *clear_default_device {
                settings.default_device = None;
            }
            if let Some(timeout_millis) = timeout_millis {
                if *timeout_millis == 0 {
                    bail!("The transfer timeout must be at least 1 millisecond");
                }
                settings.timeout_millis = *timeout_millis;
            }

            settings.write(&cli.config)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
            Ok(())
        }
        SubCommands::Info => with_device(bus, serial, timeout, |handle| {
            info(handle, cli.json, out)
        }),
        SubCommands::Status { outlet } => with_device(bus, serial, timeout, |handle| {
            let states = read_states(handle, *outlet)?;
            print_states(&states, cli.json, out)
        }),
        SubCommands::On { outlet } => with_device(bus, serial, timeout, |handle| {
            switch(handle, *outlet, OutletState::On, cli.json, out)
        }),
        SubCommands::Off { outlet } => with_device(bus, serial, timeout, |handle| {
            switch(handle, *outlet, OutletState::Off, cli.json, out)
        }),
        SubCommands::Set { outlet, state } => with_device(bus, serial, timeout, |handle| {
            switch(handle, *outlet, *state, cli.json, out)
        }),
        SubCommands::Toggle { outlet } => with_device(bus, serial, timeout, |handle| {
            let toggled = handle
                .toggle_outlet(*outlet)
                .with_context(|| format!("Could not toggle outlet {}", outlet))?;
            let states: Vec<OutletStatus> = toggled
                .into_iter()
                .map(|(outlet, state)| OutletStatus { outlet, state })
                .collect();
            print_states(&states, cli.json, out)
        }),
    }
}

// Opens the selected device for the duration of `action`, and releases it on every path out.
fn with_device<B: OutletBus, T>(
    bus: &B,
    serial: Option<&str>,
    timeout: Duration,
    action: impl FnOnce(&mut B::Device) -> Result<T>,
) -> Result<T> {
    let mut handle = select_device(bus, serial, timeout)?;
    let result = action(&mut handle);
    handle.close();
    result
}

fn select_device<B: OutletBus>(
    bus: &B,
    serial: Option<&str>,
    timeout: Duration,
) -> Result<B::Device> {
    if let Some(serial) = serial {
        return find_device_by_serial(bus, serial, timeout)
            .with_context(|| format!("Unable to search for serial {}", serial))?
            .ok_or_else(|| anyhow!("No SiS-PM device with serial {} is connected", serial));
    }

    let devices = list_devices(bus);
    match devices.as_slice() {
        [] => Err(anyhow!("No SiS-PM devices are connected.")),
        [device] => bus
            .open(device, timeout)
            .with_context(|| format!("Unable to open {}", device)),
        _ => {
            let mut found = vec![];
            for device in &devices {
                let serial = read_serial(bus, device, timeout).unwrap_or_else(|error| {
                    warn!("Unable to read serial from {}: {}", device, error);
                    String::from("unknown serial")
                });
                found.push(format!("{} - {}", serial, device));
            }
            Err(anyhow!(
                "Multiple SiS-PM devices are connected, please specify which one to control with --device:\n{}",
                found.join("\n")
            ))
        }
    }
}

fn read_serial<B: OutletBus>(bus: &B, device: &SisPmDevice, timeout: Duration) -> Result<String> {
    let mut handle = bus.open(device, timeout)?;
    let serial = handle.serial_number();
    handle.close();
    Ok(serial?)
}

fn list<B: OutletBus>(bus: &B, timeout: Duration, json: bool, out: &mut impl Write) -> Result<()> {
    let mut summaries = vec![];
    for device in list_devices(bus) {
        let serial = match read_serial(bus, &device, timeout) {
            Ok(serial) => Some(serial),
            Err(error) => {
                warn!("Unable to read serial from {}: {}", device, error);
                None
            }
        };

        let device_type = device.device_type();
        summaries.push(DeviceSummary {
            serial,
            device_type,
            description: device_type.description(),
            outlets: device_type.outlet_count(),
            bus_number: device.bus_number(),
            address: device.address(),
        });
    }

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&summaries)?)?;
        return Ok(());
    }

    if summaries.is_empty() {
        writeln!(out, "No SiS-PM devices found.")?;
    }
    for summary in &summaries {
        writeln!(
            out,
            "{} - {} on bus {}, address {}",
            summary.serial.as_deref().unwrap_or("unknown serial"),
            summary.description,
            summary.bus_number,
            summary.address
        )?;
    }
    Ok(())
}

fn info<D: SisPmCommands>(handle: &mut D, json: bool, out: &mut impl Write) -> Result<()> {
    let info = handle
        .device_info()
        .context("Could not read the device information")?;
    let usb = handle
        .get_descriptor()
        .context("Could not read the USB descriptor strings")?;

    let details = DeviceDetails {
        serial: info.serial().to_string(),
        device_type: info.device_type(),
        description: info.device_type().description(),
        outlets: info.outlet_count(),
        manufacturer: usb.device_manufacturer(),
        product: usb.product_name(),
        vendor_id: format!("0x{:04x}", info.vendor_id()),
        product_id: format!("0x{:04x}", info.product_id()),
        bus_number: info.bus_number(),
        address: info.address(),
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&details)?)?;
        return Ok(());
    }

    writeln!(out, "Serial:       {}", details.serial)?;
    writeln!(out, "Device Type:  {}", details.description)?;
    writeln!(out, "Outlets:      {}", details.outlets)?;
    writeln!(out, "Manufacturer: {}", details.manufacturer)?;
    writeln!(out, "Product:      {}", details.product)?;
    writeln!(out, "Vendor ID:    {}", details.vendor_id)?;
    writeln!(out, "Product ID:   {}", details.product_id)?;
    writeln!(out, "Bus:          {}", details.bus_number)?;
    writeln!(out, "Address:      {}", details.address)?;
    Ok(())
}

fn read_states<D: SisPmCommands>(handle: &mut D, outlet: OutletIndex) -> Result<Vec<OutletStatus>> {
    let numbers = handle.select_outlets(outlet)?;
    let reading = handle
        .get_outlet_state(outlet)
        .with_context(|| format!("Could not read the state of outlet {}", outlet))?;

    Ok(numbers
        .into_iter()
        .zip(reading.states().iter().copied())
        .map(|(outlet, state)| OutletStatus { outlet, state })
        .collect())
}

// Success is confirmed with an additional status request, the device doesn't acknowledge switches.
fn switch<D: SisPmCommands>(
    handle: &mut D,
    outlet: OutletIndex,
    state: OutletState,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    handle
        .set_outlet(outlet, state)
        .with_context(|| format!("Could not switch outlet {} {}", outlet, state))?;

    let states = read_states(handle, outlet)?;
    if let Some(failed) = states.iter().find(|status| status.state != state) {
        bail!("Outlet {} did not switch {}", failed.outlet, state);
    }
    print_states(&states, json, out)
}

fn print_states(states: &[OutletStatus], json: bool, out: &mut impl Write) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(states)?)?;
        return Ok(());
    }

    for status in states {
        writeln!(out, "Outlet {}: {}", status.outlet, status.state)?;
    }
    Ok(())
}
