//! Services a VXI-11 client hosts for the instruments it talks to.

pub mod intr;

pub mod prelude {
    pub use super::intr::{
        ServiceError, SrqHandler, VxiIntrHandle, VxiIntrService, VxiIntrServiceBuilder,
    };
    pub use crate::common::vxi11::xdr::DeviceSrqParms;
}
