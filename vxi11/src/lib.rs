//! VXI-11 client library.
//!
//! * [client] links to instrument devices over the core channel and transfers messages and
//!   control requests.
//! * [server] hosts the interrupt channel instruments send service requests to.
//! * [common] holds the XDR, ONC RPC and portmapper plumbing both are built on.

pub mod client;
pub mod common;
pub mod server;
