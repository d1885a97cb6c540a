pub mod onc_rpc;
pub mod portmapper;
pub mod vxi11;
pub mod xdr;
