use std::{fmt, io};

use crate::common::{onc_rpc::RpcError, vxi11::xdr::DeviceErrorCode};

/// Status reported for an RPC call that failed without a device reply
pub const STATUS_RPC_FAILED: i32 = -1;
/// Status reported when a read call got no response
pub const STATUS_NULL_READ_RESP: i32 = -50;
/// Status reported when a write call got no response
pub const STATUS_NULL_WRITE_RESP: i32 = -51;
/// Status reported when a read ran out of buffer before the message ended
pub const STATUS_BUFFER_TOO_SMALL: i32 = -100;

/// Errors returned by a [super::Vxi11Client]
#[derive(Debug)]
pub enum Error {
    /// RPC call failed, the device did not produce a reply
    Rpc(RpcError),
    /// A `device_write` call failed, the chunks sent before it are not undone
    NoWriteResponse(RpcError),
    /// A `device_read` call failed
    NoReadResponse(RpcError),
    /// The device replied with an error code
    Device(DeviceErrorCode),
    /// The read buffer was filled before end or termination character, carries number of bytes read
    BufferTooSmall(usize),
}

impl Error {
    /// Signed status code of this error.
    ///
    /// Device errors are negated device error codes, saturating at `i32::MIN`. The other kinds
    /// have fixed negative values.
    pub fn status(&self) -> i32 {
        match self {
            Error::Rpc(_) => STATUS_RPC_FAILED,
            Error::NoWriteResponse(_) => STATUS_NULL_WRITE_RESP,
            Error::NoReadResponse(_) => STATUS_NULL_READ_RESP,
            Error::Device(code) => i32::try_from(code.code()).map_or(i32::MIN, |code| -code),
            Error::BufferTooSmall(_) => STATUS_BUFFER_TOO_SMALL,
        }
    }
}

impl From<RpcError> for Error {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Rpc(RpcError::from(err))
    }
}

impl From<DeviceErrorCode> for Error {
    fn from(code: DeviceErrorCode) -> Self {
        Self::Device(code)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Rpc(err) => write!(f, "RPC error: {}", err),
            Error::NoWriteResponse(err) => write!(f, "No response to write: {}", err),
            Error::NoReadResponse(err) => write!(f, "No response to read: {}", err),
            Error::Device(code) => write!(f, "Device error {}: {}", code.code(), code),
            Error::BufferTooSmall(n) => write!(f, "Buffer too small, read {} bytes", n),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Rpc(err) | Error::NoWriteResponse(err) | Error::NoReadResponse(err) => Some(err),
            _ => None,
        }
    }
}
