use std::{io::ErrorKind, time::Duration};

use async_std::{future, net::TcpStream};
use futures::{AsyncRead, AsyncWrite};

use crate::{
    client::{
        millis, portmapper::PortMapperClient, Error, DEFAULT_DEVICE, DEFAULT_LOCK_TIMEOUT,
        DEFAULT_READ_TIMEOUT, DEFAULT_TIMEOUT, RPC_TIMEOUT_MARGIN,
    },
    common::{
        onc_rpc::prelude::*,
        portmapper::prelude::*,
        vxi11::{
            xdr::{
                CreateLinkParms, CreateLinkResp, DeviceEnableSrqParms, DeviceError,
                DeviceGenericParms, DeviceLink, DeviceLockParms, DeviceReadParms, DeviceReadResp,
                DeviceReadStbResp, DeviceRemoteFunc, DeviceWriteParms, DeviceWriteResp,
            },
            CREATE_INTR_CHAN, CREATE_LINK, DESTROY_INTR_CHAN, DESTROY_LINK, DEVICE_CLEAR,
            DEVICE_CORE, DEVICE_CORE_VERSION, DEVICE_ENABLE_SRQ, DEVICE_LOCAL, DEVICE_LOCK,
            DEVICE_READ, DEVICE_READSTB, DEVICE_REMOTE, DEVICE_TRIGGER, DEVICE_UNLOCK,
            DEVICE_WRITE,
        },
        xdr::prelude::*,
    },
};

/// Deadline of an RPC forwarding `timeouts` (in ms) to the device
fn deadline(timeouts: &[u32]) -> Duration {
    timeouts
        .iter()
        .map(|ms| Duration::from_millis(*ms as u64))
        .sum::<Duration>()
        + RPC_TIMEOUT_MARGIN
}

/// Core channel procedures
pub(crate) struct Vxi11CoreClient<IO>(StreamRpcClient<IO>);

impl<IO> Vxi11CoreClient<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: IO) -> Self {
        Self(StreamRpcClient::new(io, DEVICE_CORE, DEVICE_CORE_VERSION))
    }

    async fn call<ARGS, RET>(
        &mut self,
        proc: u32,
        args: ARGS,
        deadline: Duration,
    ) -> Result<RET, RpcError>
    where
        ARGS: XdrEncode,
        RET: XdrDecode + Default,
    {
        match future::timeout(deadline, self.0.call(proc, args)).await {
            Ok(res) => res,
            Err(_) => {
                log::debug!("Procedure {} timed out after {:?}", proc, deadline);
                Err(RpcError::Io(ErrorKind::TimedOut.into()))
            }
        }
    }

    pub(crate) async fn create_link(
        &mut self,
        parms: CreateLinkParms,
    ) -> Result<CreateLinkResp, RpcError> {
        let deadline = deadline(&[parms.lock_timeout, millis(DEFAULT_TIMEOUT)]);
        self.call(CREATE_LINK, parms, deadline).await
    }

    pub(crate) async fn device_write(
        &mut self,
        parms: DeviceWriteParms,
    ) -> Result<DeviceWriteResp, RpcError> {
        let deadline = deadline(&[parms.io_timeout, parms.lock_timeout]);
        self.call(DEVICE_WRITE, parms, deadline).await
    }

    pub(crate) async fn device_read(
        &mut self,
        parms: DeviceReadParms,
    ) -> Result<DeviceReadResp, RpcError> {
        let deadline = deadline(&[parms.io_timeout, parms.lock_timeout]);
        self.call(DEVICE_READ, parms, deadline).await
    }

    pub(crate) async fn device_readstb(
        &mut self,
        parms: DeviceGenericParms,
    ) -> Result<DeviceReadStbResp, RpcError> {
        let deadline = deadline(&[parms.io_timeout, parms.lock_timeout]);
        self.call(DEVICE_READSTB, parms, deadline).await
    }

    /// `device_trigger`, `device_clear`, `device_remote` or `device_local`
    pub(crate) async fn device_generic(
        &mut self,
        proc: u32,
        parms: DeviceGenericParms,
    ) -> Result<DeviceError, RpcError> {
        debug_assert!(matches!(
            proc,
            DEVICE_TRIGGER | DEVICE_CLEAR | DEVICE_REMOTE | DEVICE_LOCAL
        ));
        let deadline = deadline(&[parms.io_timeout, parms.lock_timeout]);
        self.call(proc, parms, deadline).await
    }

    pub(crate) async fn device_lock(
        &mut self,
        parms: DeviceLockParms,
    ) -> Result<DeviceError, RpcError> {
        let deadline = deadline(&[parms.lock_timeout]);
        self.call(DEVICE_LOCK, parms, deadline).await
    }

    pub(crate) async fn device_unlock(&mut self, lid: DeviceLink) -> Result<DeviceError, RpcError> {
        self.call(DEVICE_UNLOCK, lid, deadline(&[millis(DEFAULT_TIMEOUT)]))
            .await
    }

    pub(crate) async fn device_enable_srq(
        &mut self,
        parms: DeviceEnableSrqParms,
    ) -> Result<DeviceError, RpcError> {
        self.call(DEVICE_ENABLE_SRQ, parms, deadline(&[millis(DEFAULT_TIMEOUT)]))
            .await
    }

    pub(crate) async fn destroy_link(&mut self, lid: DeviceLink) -> Result<DeviceError, RpcError> {
        self.call(DESTROY_LINK, lid, deadline(&[millis(DEFAULT_TIMEOUT)]))
            .await
    }

    pub(crate) async fn create_intr_chan(
        &mut self,
        parms: DeviceRemoteFunc,
    ) -> Result<DeviceError, RpcError> {
        self.call(CREATE_INTR_CHAN, parms, deadline(&[millis(DEFAULT_TIMEOUT)]))
            .await
    }

    pub(crate) async fn destroy_intr_chan(&mut self) -> Result<DeviceError, RpcError> {
        self.call(DESTROY_INTR_CHAN, (), deadline(&[millis(DEFAULT_TIMEOUT)]))
            .await
    }
}

/// Link negotiated with the device by `create_link`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    /// Link id assigned by the device
    pub lid: DeviceLink,
    /// Largest chunk the device accepts in one `device_write`, may be reported as zero
    pub max_recv_size: u32,
    /// Port of the abort channel
    pub abort_port: u16,
}

/// Options used when creating a link.
///
/// ```no_run
/// use std::time::Duration;
/// use lxi_vxi11_client::client::Vxi11ClientBuilder;
///
/// # async_std::task::block_on(async {
/// let inst = Vxi11ClientBuilder::new()
///     .device("gpib0,5")
///     .io_timeout(Duration::from_secs(2))
///     .term_char(b'\n')
///     .connect("192.168.1.10")
///     .await?;
/// # Ok::<(), lxi_vxi11_client::client::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Vxi11ClientBuilder {
    device: String,
    client_id: Option<i32>,
    lock_device: bool,
    lock_timeout: Duration,
    io_timeout: Duration,
    read_timeout: Duration,
    term_char: Option<u8>,
    portmapper_port: u16,
    core_port: Option<u16>,
}

impl Default for Vxi11ClientBuilder {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            client_id: None,
            lock_device: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            io_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            term_char: None,
            portmapper_port: PORTMAPPER_PORT,
            core_port: None,
        }
    }
}

impl Vxi11ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device name to link to, `inst0` if not set
    pub fn device(self, device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..self
        }
    }

    /// Client id sent in `create_link`, defaults to the process id
    pub fn client_id(self, client_id: i32) -> Self {
        Self {
            client_id: Some(client_id),
            ..self
        }
    }

    /// Request an exclusive lock when the link is created
    pub fn lock_device(self, lock_device: bool) -> Self {
        Self {
            lock_device,
            ..self
        }
    }

    pub fn lock_timeout(self, lock_timeout: Duration) -> Self {
        Self {
            lock_timeout,
            ..self
        }
    }

    /// Timeout used by [Vxi11Client::write]
    pub fn io_timeout(self, io_timeout: Duration) -> Self {
        Self { io_timeout, ..self }
    }

    /// Timeout used by [Vxi11Client::read]
    pub fn read_timeout(self, read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            ..self
        }
    }

    /// Termination character used by [Vxi11Client::read]
    pub fn term_char(self, term_char: u8) -> Self {
        Self {
            term_char: Some(term_char),
            ..self
        }
    }

    pub fn portmapper_port(self, portmapper_port: u16) -> Self {
        Self {
            portmapper_port,
            ..self
        }
    }

    /// Connect to the core channel on this port instead of asking the portmapper
    pub fn core_port(self, core_port: u16) -> Self {
        Self {
            core_port: Some(core_port),
            ..self
        }
    }

    /// Look up and connect to the core channel of `host`, then create a link.
    pub async fn connect(self, host: &str) -> Result<Vxi11Client<TcpStream>, Error> {
        let core_port = match self.core_port {
            Some(port) => port,
            None => {
                let mut portmap =
                    PortMapperClient::connect_tcp((host, self.portmapper_port)).await?;
                let port = portmap
                    .getport(Mapping::new(
                        DEVICE_CORE,
                        DEVICE_CORE_VERSION,
                        PORTMAPPER_PROT_TCP,
                        0,
                    ))
                    .await?;
                if port == 0 {
                    log::error!("Core channel not registered at {}", host);
                    return Err(Error::Rpc(RpcError::ProgUnavail));
                }
                port
            }
        };
        log::debug!("Core channel @ {}:{}", host, core_port);

        let stream = TcpStream::connect((host, core_port)).await?;
        self.link(stream).await
    }

    /// Create a link over an already connected core channel
    pub async fn link<IO>(self, io: IO) -> Result<Vxi11Client<IO>, Error>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let mut core = Vxi11CoreClient::new(io);

        let parms = CreateLinkParms {
            client_id: self
                .client_id
                .unwrap_or_else(|| std::process::id() as i32),
            lock_device: self.lock_device,
            lock_timeout: millis(self.lock_timeout),
            device: self.device,
        };
        let resp = core.create_link(parms).await?;
        if resp.error.is_error() {
            log::error!("Create link returned error: {:?}", resp.error);
            return Err(resp.error.into());
        }

        let link = Link {
            lid: resp.lid,
            max_recv_size: resp.max_recv_size,
            abort_port: resp.abort_port,
        };
        log::debug!(lid = link.lid.0; "Link created, max_recv_size={}, abort_port={}", link.max_recv_size, link.abort_port);

        Ok(Vxi11Client {
            core,
            link,
            io_timeout: self.io_timeout,
            read_timeout: self.read_timeout,
            term_char: self.term_char,
        })
    }
}

/// A link to a device and the core channel it was created on
pub struct Vxi11Client<IO = TcpStream> {
    pub(crate) core: Vxi11CoreClient<IO>,
    pub(crate) link: Link,
    pub(crate) io_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) term_char: Option<u8>,
}

impl Vxi11Client<TcpStream> {
    /// Link to device `inst0` of `host` with default options
    pub async fn open(host: &str) -> Result<Self, Error> {
        Vxi11ClientBuilder::new().connect(host).await
    }

    /// Link to `device` of `host` with default options
    pub async fn open_device(host: &str, device: &str) -> Result<Self, Error> {
        Vxi11ClientBuilder::new().device(device).connect(host).await
    }
}

impl<IO> Vxi11Client<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn set_io_timeout(&mut self, io_timeout: Duration) {
        self.io_timeout = io_timeout;
    }

    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }

    pub fn set_term_char(&mut self, term_char: Option<u8>) {
        self.term_char = term_char;
    }

    /// Destroy the link and close the connection.
    ///
    /// The connection is closed even if `destroy_link` fails.
    pub async fn close(mut self) -> Result<(), Error> {
        let lid = self.link.lid;
        let res = self.core.destroy_link(lid).await;
        drop(self);
        log::debug!(lid = lid.0; "Link closed");

        let resp = res?;
        if resp.error.is_error() {
            Err(resp.error.into())
        } else {
            Ok(())
        }
    }
}
