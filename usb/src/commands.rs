use rusb::{Direction, Recipient, RequestType};
use sispm_types::OutletState;

// HID class requests, addressed to the interface.
pub const REQUEST_TYPE_IN: u8 =
    rusb::request_type(Direction::In, RequestType::Class, Recipient::Interface);
pub const REQUEST_TYPE_OUT: u8 =
    rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);

pub const REQUEST_GET_REPORT: u8 = 0x01;
pub const REQUEST_SET_REPORT: u8 = 0x09;

// Feature report, report id in the low byte.
const REPORT_TYPE_FEATURE: u16 = 0x03 << 8;
const SERIAL_REPORT_ID: u8 = 0x01;

pub const PAYLOAD_LENGTH: usize = 6;

const STATE_ON: u8 = 0x03;
const STATE_OFF: u8 = 0x00;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum Command {
    GetSerial,
    GetStatus(u8),
    SetStatus(u8, OutletState),
}

/// A fully encoded control transfer, minus the timeout which belongs to the handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: [u8; PAYLOAD_LENGTH],
}

impl ControlRequest {
    pub fn is_read(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

impl Command {
    // Each outlet is reported through its own feature report, three ids apart. Outlet numbers
    // are validated against the device before a command is built.
    fn report_id(outlet: u8) -> u8 {
        outlet.wrapping_mul(3)
    }

    pub fn request(&self) -> ControlRequest {
        let mut data = [0; PAYLOAD_LENGTH];
        match *self {
            Command::GetSerial => ControlRequest {
                request_type: REQUEST_TYPE_IN,
                request: REQUEST_GET_REPORT,
                value: REPORT_TYPE_FEATURE | SERIAL_REPORT_ID as u16,
                index: 0,
                data,
            },
            Command::GetStatus(outlet) => {
                data[0] = Command::report_id(outlet);
                ControlRequest {
                    request_type: REQUEST_TYPE_IN,
                    request: REQUEST_GET_REPORT,
                    value: REPORT_TYPE_FEATURE | Command::report_id(outlet) as u16,
                    index: 0,
                    data,
                }
            }
            Command::SetStatus(outlet, state) => {
                data[0] = Command::report_id(outlet);
                data[1] = match state {
                    OutletState::On => STATE_ON,
                    OutletState::Off => STATE_OFF,
                };
                ControlRequest {
                    request_type: REQUEST_TYPE_OUT,
                    request: REQUEST_SET_REPORT,
                    value: REPORT_TYPE_FEATURE | Command::report_id(outlet) as u16,
                    index: 0,
                    data,
                }
            }
        }
    }
}

/// Decodes a feature report for an outlet, the second byte carries the switch state.
pub fn decode_status(response: &[u8]) -> Option<OutletState> {
    response.get(1).map(|&state| OutletState::from(state != 0))
}

/// Renders the serial report as colon separated hex pairs, eg `01:02:03:04:05:06`.
pub fn format_serial(response: &[u8]) -> String {
    response
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}
