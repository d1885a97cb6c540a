//! Portmapper program constants, see [RFC1833](https://datatracker.ietf.org/doc/html/rfc1833).

pub mod xdr;

/// TCP/UDP port of portmapper/rpcbind
pub const PORTMAPPER_PORT: u16 = 111;

/// Portmapper program number
pub const PORTMAPPER_PROG: u32 = 100000;
/// Portmapper program version
pub const PORTMAPPER_VERS: u32 = 2;

pub const PORTMAPPER_PROT_TCP: u32 = 6;
pub const PORTMAPPER_PROT_UDP: u32 = 17;

// Procedures
pub const PMAPPROC_NULL: u32 = 0;
pub const PMAPPROC_SET: u32 = 1;
pub const PMAPPROC_UNSET: u32 = 2;
pub const PMAPPROC_GETPORT: u32 = 3;

pub mod prelude {
    pub use super::{
        xdr::Mapping, PORTMAPPER_PORT, PORTMAPPER_PROG, PORTMAPPER_PROT_TCP, PORTMAPPER_PROT_UDP,
        PORTMAPPER_VERS,
    };
}
