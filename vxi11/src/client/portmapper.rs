use async_std::net::{TcpStream, ToSocketAddrs};
use futures::{AsyncRead, AsyncWrite};

use crate::common::{
    onc_rpc::prelude::*,
    portmapper::{
        xdr::Mapping, PMAPPROC_GETPORT, PMAPPROC_NULL, PMAPPROC_SET, PMAPPROC_UNSET,
        PORTMAPPER_PROG, PORTMAPPER_VERS,
    },
};

pub mod prelude {
    pub use super::PortMapperClient;
    pub use crate::common::portmapper::prelude::*;
}

pub struct PortMapperClient<IO>(StreamRpcClient<IO>);

impl PortMapperClient<TcpStream> {
    /// Connect to a portmapper over TCP
    pub async fn connect_tcp(addrs: impl ToSocketAddrs) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addrs).await?;
        Ok(Self::new(stream))
    }
}

impl<IO> PortMapperClient<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: IO) -> Self {
        Self(StreamRpcClient::new(io, PORTMAPPER_PROG, PORTMAPPER_VERS))
    }

    pub async fn null(&mut self) -> Result<(), RpcError> {
        self.0.call(PMAPPROC_NULL, ()).await
    }

    /// Register a mapping, returns false if the portmapper refused it
    pub async fn set(&mut self, mapping: Mapping) -> Result<bool, RpcError> {
        self.0.call(PMAPPROC_SET, mapping).await
    }

    pub async fn unset(&mut self, mapping: Mapping) -> Result<bool, RpcError> {
        self.0.call(PMAPPROC_UNSET, mapping).await
    }

    /// Look up the port of a program, 0 if it is not registered
    pub async fn getport(&mut self, mapping: Mapping) -> Result<u16, RpcError> {
        self.0.call(PMAPPROC_GETPORT, mapping).await
    }
}
