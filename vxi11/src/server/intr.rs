//! Interrupt channel service.
//!
//! Instruments report service requests by calling `device_intr_srq` of the `DEVICE_INTR`
//! program. The service is hosted on both UDP and TCP since instruments differ in which one
//! they use.
//!
//! ```no_run
//! use lxi_vxi11_client::server::prelude::*;
//!
//! # async_std::task::block_on(async {
//! let handle = VxiIntrServiceBuilder::new()
//!     .handler(|parms: DeviceSrqParms| println!("SRQ from {:?}", parms.handle))
//!     .start()
//!     .await?;
//! println!("Waiting for SRQ on {}", handle.tcp_addr());
//! handle.join().await?;
//! # Ok::<(), ServiceError>(())
//! # });
//! ```

use std::{
    fmt, io,
    io::Cursor,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use async_std::{
    net::{TcpListener, UdpSocket},
    task::{self, JoinHandle},
};
use async_trait::async_trait;
use futures::try_join;

use crate::{
    client::portmapper::PortMapperClient,
    common::{
        onc_rpc::prelude::*,
        portmapper::prelude::*,
        vxi11::{xdr::DeviceSrqParms, DEVICE_INTR, DEVICE_INTR_SRQ, DEVICE_INTR_VERSION},
        xdr::prelude::*,
    },
};

/// Callback invoked for every service request received
pub type SrqHandler = Arc<dyn Fn(DeviceSrqParms) + Send + Sync>;

/// Error starting the interrupt service
#[derive(Debug)]
pub enum ServiceError {
    /// Failed to bind a socket
    Io(io::Error),
    /// Failed to talk to the portmapper
    Rpc(RpcError),
    /// Portmapper refused to register the mapping
    Rejected(Mapping),
}

impl From<io::Error> for ServiceError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<RpcError> for ServiceError {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Io(err) => write!(f, "{}", err),
            ServiceError::Rpc(err) => write!(f, "Portmapper error: {}", err),
            ServiceError::Rejected(mapping) => write!(
                f,
                "Portmapper rejected mapping of program {:#x} to port {}",
                mapping.prog, mapping.port
            ),
        }
    }
}

impl std::error::Error for ServiceError {}

/// `DEVICE_INTR` dispatcher
struct VxiIntrServer {
    handler: SrqHandler,
}

#[async_trait]
impl RpcService for VxiIntrServer {
    async fn call(
        self: Arc<Self>,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &mut Cursor<Vec<u8>>,
        _ret: &mut Cursor<Vec<u8>>,
    ) -> Result<(), RpcError> {
        if prog != DEVICE_INTR {
            return Err(RpcError::ProgUnavail);
        }
        if vers != DEVICE_INTR_VERSION {
            return Err(RpcError::ProgMissmatch(MissmatchInfo {
                low: DEVICE_INTR_VERSION,
                high: DEVICE_INTR_VERSION,
            }));
        }

        match proc {
            0 => Ok(()),
            DEVICE_INTR_SRQ => {
                let mut parms = DeviceSrqParms::default();
                parms.read_xdr(args).map_err(|_| RpcError::GarbageArgs)?;
                log::debug!("Service request, handle={:?}", parms.handle.0);
                (self.handler)(parms);
                Ok(())
            }
            _ => Err(RpcError::ProcUnavail),
        }
    }

    fn replies(&self, prog: u32, vers: u32, proc: u32) -> bool {
        (prog, vers, proc) != (DEVICE_INTR, DEVICE_INTR_VERSION, DEVICE_INTR_SRQ)
    }
}

/// Interrupt service without a handler
pub struct VxiIntrServiceBuilder {
    bind_addr: IpAddr,
    portmapper: Option<SocketAddr>,
}

impl Default for VxiIntrServiceBuilder {
    fn default() -> Self {
        Self {
            bind_addr: Ipv4Addr::UNSPECIFIED.into(),
            portmapper: Some((Ipv4Addr::LOCALHOST, PORTMAPPER_PORT).into()),
        }
    }
}

impl VxiIntrServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address to bind the UDP socket and TCP listener to
    pub fn bind_addr(self, bind_addr: IpAddr) -> Self {
        Self { bind_addr, ..self }
    }

    /// Register the service with the portmapper at `addr`
    pub fn portmapper(self, addr: SocketAddr) -> Self {
        Self {
            portmapper: Some(addr),
            ..self
        }
    }

    /// Do not register the service with any portmapper
    pub fn without_portmapper(self) -> Self {
        Self {
            portmapper: None,
            ..self
        }
    }

    /// Set the SRQ handler
    pub fn handler<F>(self, handler: F) -> VxiIntrService
    where
        F: Fn(DeviceSrqParms) + Send + Sync + 'static,
    {
        VxiIntrService {
            bind_addr: self.bind_addr,
            portmapper: self.portmapper,
            handler: Arc::new(handler),
        }
    }
}

/// Interrupt service with a handler, ready to be started
pub struct VxiIntrService {
    bind_addr: IpAddr,
    portmapper: Option<SocketAddr>,
    handler: SrqHandler,
}

impl VxiIntrService {
    /// Replace the SRQ handler
    pub fn handler<F>(self, handler: F) -> Self
    where
        F: Fn(DeviceSrqParms) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            ..self
        }
    }

    /// Bind UDP and TCP endpoints on ephemeral ports, register them with the portmapper and
    /// serve them in a separate task.
    ///
    /// Any stale registration of `DEVICE_INTR` is removed first. Nothing is spawned if a step
    /// fails.
    pub async fn start(self) -> Result<VxiIntrHandle, ServiceError> {
        let mut portmap = match self.portmapper {
            Some(addr) => {
                let mut portmap = PortMapperClient::connect_tcp(addr).await?;
                portmap
                    .unset(Mapping::program(DEVICE_INTR, DEVICE_INTR_VERSION))
                    .await?;
                Some(portmap)
            }
            None => None,
        };

        let socket = UdpSocket::bind((self.bind_addr, 0)).await?;
        let listener = TcpListener::bind((self.bind_addr, 0)).await?;
        let udp_addr = socket.local_addr()?;
        let tcp_addr = listener.local_addr()?;

        if let Some(portmap) = portmap.as_mut() {
            for (prot, port) in [
                (PORTMAPPER_PROT_UDP, udp_addr.port()),
                (PORTMAPPER_PROT_TCP, tcp_addr.port()),
            ] {
                let mapping = Mapping::new(DEVICE_INTR, DEVICE_INTR_VERSION, prot, port as u32);
                if !portmap.set(mapping).await? {
                    log::error!("Failed to register {:?}", mapping);
                    return Err(ServiceError::Rejected(mapping));
                }
            }
        }

        let server = Arc::new(VxiIntrServer {
            handler: self.handler,
        });
        let task = task::spawn(async move {
            let res = try_join!(server.clone().serve_udp(socket), server.serve_tcp(listener));
            match &res {
                Ok(_) => log::error!("Interrupt service stopped"),
                Err(err) => log::error!("Interrupt service terminated: {}", err),
            }
            res.map(|_| ())
        });

        Ok(VxiIntrHandle {
            udp_addr,
            tcp_addr,
            task,
        })
    }
}

/// A running interrupt service
///
/// Dropping the handle leaves the service running.
pub struct VxiIntrHandle {
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    task: JoinHandle<io::Result<()>>,
}

impl VxiIntrHandle {
    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// Resolves if the service terminates
    pub async fn join(self) -> io::Result<()> {
        self.task.await
    }
}
