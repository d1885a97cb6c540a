//! VXI-11 program and procedure numbers.

pub mod xdr;

/// VXI-11 async channel program number
pub const DEVICE_ASYNC: u32 = 0x0607B0;
/// VXI-11 async channel program version
pub const DEVICE_ASYNC_VERSION: u32 = 1;
// Async channel procedures
pub const DEVICE_ABORT: u32 = 1;

/// VXI-11 core channel program number
pub const DEVICE_CORE: u32 = 0x0607AF;
/// VXI-11 core channel program version
pub const DEVICE_CORE_VERSION: u32 = 1;
// Core channel procedures
pub const CREATE_LINK: u32 = 10;
pub const DEVICE_WRITE: u32 = 11;
pub const DEVICE_READ: u32 = 12;
pub const DEVICE_READSTB: u32 = 13;
pub const DEVICE_TRIGGER: u32 = 14;
pub const DEVICE_CLEAR: u32 = 15;
pub const DEVICE_REMOTE: u32 = 16;
pub const DEVICE_LOCAL: u32 = 17;
pub const DEVICE_LOCK: u32 = 18;
pub const DEVICE_UNLOCK: u32 = 19;
pub const DEVICE_ENABLE_SRQ: u32 = 20;
pub const DESTROY_LINK: u32 = 23;
pub const CREATE_INTR_CHAN: u32 = 25;
pub const DESTROY_INTR_CHAN: u32 = 26;

/// VXI-11 interrupt channel program number
pub const DEVICE_INTR: u32 = 0x0607B1;
/// VXI-11 interrupt channel program version
pub const DEVICE_INTR_VERSION: u32 = 1;
// Interrupt channel procedures
pub const DEVICE_INTR_SRQ: u32 = 30;

