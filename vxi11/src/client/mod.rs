//! VXI-11 client.
//!
//! A [Vxi11Client] owns the core channel connection and the link created on it. Operations
//! are issued one at a time, each awaiting the reply of the instrument.
//!
//! ```no_run
//! use lxi_vxi11_client::client::Vxi11Client;
//!
//! # async_std::task::block_on(async {
//! let mut inst = Vxi11Client::open("192.168.1.10").await?;
//! inst.write(b"*IDN?\n").await?;
//! let idn = inst.read(256).await?;
//! inst.close().await?;
//! # Ok::<(), lxi_vxi11_client::client::Error>(())
//! # });
//! ```

use std::time::Duration;

mod control;
pub mod error;
pub mod portmapper;
mod transfer;
pub mod vxi11;

#[cfg(test)]
pub(crate) mod fake_device;

pub use self::{
    error::Error,
    vxi11::{Link, Vxi11Client, Vxi11ClientBuilder},
};

/// Device name used when none is given
pub const DEFAULT_DEVICE: &str = "inst0";
/// Default io timeout of writes and control operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10000);
/// Default io timeout of reads
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default lock timeout when creating a link
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(10000);
/// Chunk size used when the device reports a max receive size of zero
pub const FALLBACK_MAX_RECV_SIZE: usize = 4096;
/// Largest number of bytes asked for by a single `device_read`, the reply has to fit in one
/// RPC record
pub const MAX_READ_REQUEST: usize = 512 * 1024;
/// Time an RPC may take on top of the timeouts forwarded to the device
pub(crate) const RPC_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

/// Timeout in milliseconds as sent to the device
pub(crate) fn millis(timeout: Duration) -> u32 {
    timeout.as_millis().try_into().unwrap_or(u32::MAX)
}

pub mod prelude {
    pub use super::{
        error::Error, portmapper::PortMapperClient, Link, Vxi11Client, Vxi11ClientBuilder,
    };
    pub use crate::common::vxi11::xdr::{DeviceAddrFamily, DeviceErrorCode};
}
