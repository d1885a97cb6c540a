//! XDR implementation used by the RPC programs in this crate

pub mod basic;

pub mod prelude {
    pub use super::basic::*;
    pub use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
}
