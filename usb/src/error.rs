#[derive(thiserror::Error, Debug)]
pub enum OutletError {
    #[error("No SiS-PM device was found")]
    NotFound,

    #[error("Permission denied while claiming the SiS-PM interface")]
    PermissionDenied,

    #[error("USB transfer timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Illegal outlet id {outlet}, device has outlets 1 to {count}")]
    InvalidArgument { outlet: u8, count: u8 },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(rusb::Error),

    #[error("Device handle has already been closed")]
    Closed,

    #[error("Malformed response from SiS-PM, expected {expected} bytes, received {received}")]
    MalformedResponse { expected: usize, received: usize },
}

impl From<rusb::Error> for OutletError {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Access => OutletError::PermissionDenied,
            rusb::Error::NoDevice | rusb::Error::NotFound => OutletError::NotFound,
            rusb::Error::Timeout => OutletError::Timeout,
            other => OutletError::Transport(TransportError::Usb(other)),
        }
    }
}

pub type Result<T, E = OutletError> = std::result::Result<T, E>;
