//! ONC RPC clients and services, see [RFC5531](https://datatracker.ietf.org/doc/html/rfc5531).
//!
//! Calls over stream transports use record marking ([record]), calls over UDP are sent as
//! a single datagram.

use std::{
    fmt,
    io::{self, Cursor, Error, ErrorKind, Write},
    sync::Arc,
    time::Duration,
};

use async_listen::ListenExt;
use async_std::{
    net::{TcpListener, UdpSocket},
    task,
};
use async_trait::async_trait;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, StreamExt};

use crate::common::xdr::prelude::*;

use self::{
    record::{read_record, write_record},
    xdr::{
        AcceptStat, AcceptedReply, AuthFlavour, AuthStat, MissmatchInfo, MsgType, RejectStat,
        RejectedReply, ReplyStat, Replybody, RpcMessage, RPC_VERSION,
    },
};

mod record;
pub mod xdr;

pub mod prelude {
    pub use super::{
        xdr::MissmatchInfo, RpcError, RpcService, StreamRpcClient, UdpRpcClient,
    };
}

/// Largest record accepted on a stream transport
const MAX_RECORD_LEN: usize = 1024 * 1024;
/// Largest datagram accepted on UDP
const MAX_DATAGRAM_LEN: usize = 8 * 1024;

/// An error which occured during an RPC call
///
#[derive(Debug)]
pub enum RpcError {
    /// Program not available
    ProgUnavail,
    /// Program version not available (se accepted version low-high in [MissmatchInfo])
    ProgMissmatch(MissmatchInfo),
    /// Procedure not available
    ProcUnavail,
    /// Arguments have too many or too few bytes to deserialize
    GarbageArgs,
    /// Internal error
    SystemErr,
    /// RPC version not supported
    RpcMissmatch(MissmatchInfo),
    /// Error during RPC authentication
    AuthError(AuthStat),
    /// (De-)serialiation error on RPC channel
    Io(Error),
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::ProgUnavail => write!(f, "program unavailable"),
            RpcError::ProgMissmatch(m) => {
                write!(f, "program version mismatch ({}-{})", m.low, m.high)
            }
            RpcError::ProcUnavail => write!(f, "procedure unavailable"),
            RpcError::GarbageArgs => write!(f, "garbage arguments"),
            RpcError::SystemErr => write!(f, "system error"),
            RpcError::RpcMissmatch(m) => write!(f, "rpc version mismatch ({}-{})", m.low, m.high),
            RpcError::AuthError(stat) => write!(f, "authentication error {:?}", stat),
            RpcError::Io(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// A program hosted by this process.
///
/// Implementors only decode arguments and encode results in [RpcService::call], message
/// framing and the accept/reject logic of RPC is provided.
#[async_trait]
pub trait RpcService: Send + Sync {
    /// Run procedure `proc`, reading arguments from `args` and writing the result to `ret`
    async fn call(
        self: Arc<Self>,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &mut Cursor<Vec<u8>>,
        ret: &mut Cursor<Vec<u8>>,
    ) -> Result<(), RpcError>;

    /// Returns false for one-way procedures which must not be answered.
    ///
    /// Only consulted for calls the service accepted.
    fn replies(&self, _prog: u32, _vers: u32, _proc: u32) -> bool {
        true
    }

    /// Serve calls on a connected stream until it is closed
    async fn serve_stream<IO>(self: Arc<Self>, mut stream: IO) -> io::Result<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        loop {
            let fragment = read_record(&mut stream, MAX_RECORD_LEN).await?;

            if let Some(reply) = self.clone().handle_message(fragment).await? {
                write_record(&mut stream, reply).await?;
            }
        }
    }

    /// Accept connections from `listener` and serve each of them in a separate task
    async fn serve_tcp(self: Arc<Self>, listener: TcpListener) -> io::Result<()>
    where
        Self: 'static,
    {
        log::info!("Listening on TCP {}", listener.local_addr()?);
        let mut incoming = listener
            .incoming()
            .log_warnings(|warn| log::warn!("Listening error: {}", warn))
            .handle_errors(Duration::from_millis(100))
            .backpressure(10);

        while let Some((token, stream)) = incoming.next().await {
            let peer = stream.peer_addr()?;
            log::debug!("Accepted from: {}", peer);

            let s = self.clone();
            task::spawn(async move {
                if let Err(err) = s.serve_stream(stream).await {
                    log::debug!("Error processing client: {}", err)
                }
                drop(token);
            });
        }
        log::info!("Stopped");
        Ok(())
    }

    /// Serve datagrams received on `socket`
    async fn serve_udp(self: Arc<Self>, socket: UdpSocket) -> io::Result<()> {
        log::info!("Listening on UDP {}", socket.local_addr()?);
        let mut buf = vec![0; MAX_DATAGRAM_LEN];
        loop {
            let (n, peer) = socket.recv_from(&mut buf).await?;

            match self.clone().handle_message(buf[..n].to_vec()).await {
                Ok(Some(reply)) => {
                    socket.send_to(&reply, peer).await?;
                }
                Ok(None) => {}
                Err(err) => log::debug!("Error processing datagram from {}: {}", peer, err),
            }
        }
    }

    /// Decode a call message, dispatch it and encode the reply (if any)
    async fn handle_message(self: Arc<Self>, data_in: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        let mut ret = Cursor::new(Vec::new());
        let mut data_in = Cursor::new(data_in);
        let mut msg = RpcMessage::default();
        msg.read_xdr(&mut data_in)?;
        log::trace!("-> {:?}", msg);

        let xid = msg.xid;

        let (stat, reply) = if let MsgType::Call(call) = msg.mtype {
            if call.rpc_vers != RPC_VERSION {
                (ReplyStat::rpc_vers_missmatch(RPC_VERSION, RPC_VERSION), true)
            } else if call.cred.flavour != AuthFlavour::None
                && call.cred.flavour != AuthFlavour::Sys
            {
                (ReplyStat::auth_error(AuthStat::RejectedCred), true)
            } else if call.verf.flavour != AuthFlavour::None {
                (ReplyStat::auth_error(AuthStat::RejectedVerf), true)
            } else {
                let res = self
                    .clone()
                    .call(call.prog, call.vers, call.proc, &mut data_in, &mut ret)
                    .await;
                let stat = match res {
                    Ok(()) => AcceptStat::Success,
                    Err(RpcError::ProgUnavail) => AcceptStat::ProgUnavail,
                    Err(RpcError::ProgMissmatch(m)) => AcceptStat::ProgMissmatch(m),
                    Err(RpcError::ProcUnavail) => AcceptStat::ProcUnavail,
                    Err(RpcError::GarbageArgs) => AcceptStat::GarbageArgs,
                    Err(RpcError::Io(err)) => return Err(err),
                    Err(_) => AcceptStat::SystemErr,
                };
                // Callers of an unknown program or version still expect a rejection
                let reply = match stat {
                    AcceptStat::ProgUnavail | AcceptStat::ProgMissmatch(_) => true,
                    _ => self.replies(call.prog, call.vers, call.proc),
                };
                if !matches!(stat, AcceptStat::Success) {
                    ret = Cursor::new(Vec::new());
                }

                (
                    ReplyStat::Accepted(AcceptedReply {
                        verf: Default::default(),
                        stat,
                    }),
                    reply,
                )
            }
        } else {
            return Err(ErrorKind::Unsupported.into());
        };

        if !reply {
            return Ok(None);
        }

        let reply = RpcMessage::reply(xid, stat);
        log::trace!("<- {:?}", reply);

        let mut data_out = Cursor::new(Vec::new());
        reply.write_xdr(&mut data_out)?;
        data_out.write_all(&ret.into_inner()[..])?;

        Ok(Some(data_out.into_inner()))
    }
}

/// Decode a reply to call `xid`, returning the result if the call was accepted.
///
/// Returns `Ok(None)` for a reply to another call, e.g. a late reply to a call which timed out.
fn decode_reply<RET>(xid: u32, data: Vec<u8>) -> Result<Option<RET>, RpcError>
where
    RET: XdrDecode + Default,
{
    let mut ret_cursor = Cursor::new(data);

    let mut reply = RpcMessage::default();
    let mut ret: RET = Default::default();
    reply.read_xdr(&mut ret_cursor)?;
    log::trace!("<- {:?}", reply);
    if reply.xid != xid {
        log::debug!("Discarding reply xid {}, waiting for xid {}", reply.xid, xid);
        return Ok(None);
    }
    let res = match reply.mtype {
        MsgType::Reply(Replybody {
            stat: ReplyStat::Accepted(accepted),
        }) => match accepted.stat {
            AcceptStat::Success => {
                ret.read_xdr(&mut ret_cursor)?;
                Ok(ret)
            }
            AcceptStat::ProgUnavail => Err(RpcError::ProgUnavail),
            AcceptStat::ProgMissmatch(m) => Err(RpcError::ProgMissmatch(m)),
            AcceptStat::ProcUnavail => Err(RpcError::ProcUnavail),
            AcceptStat::GarbageArgs => Err(RpcError::GarbageArgs),
            AcceptStat::SystemErr => Err(RpcError::SystemErr),
        },
        MsgType::Reply(Replybody {
            stat: ReplyStat::Denied(RejectedReply { stat }),
        }) => match stat {
            RejectStat::RpcMissmatch(m) => Err(RpcError::RpcMissmatch(m)),
            RejectStat::AuthError(err) => Err(RpcError::AuthError(err)),
        },
        MsgType::Call(..) => Err(RpcError::Io(ErrorKind::InvalidData.into())),
    };
    res.map(Some)
}

/// Encode a call message followed by its arguments
fn encode_call<ARGS>(xid: u32, prog: u32, vers: u32, proc: u32, args: ARGS) -> io::Result<Vec<u8>>
where
    ARGS: XdrEncode,
{
    let mut args_cursor = Cursor::new(Vec::new());
    let msg = RpcMessage::call(xid, prog, vers, proc);
    log::trace!("-> {:?}", msg);
    msg.write_xdr(&mut args_cursor)?;
    args.write_xdr(&mut args_cursor)?;
    Ok(args_cursor.into_inner())
}

pub struct UdpRpcClient {
    xid: u32,
    prog: u32,
    vers: u32,
    socket: UdpSocket,
}

impl UdpRpcClient {
    /// Create a client calling program `prog`, version `vers` through a connected socket
    pub fn new(prog: u32, vers: u32, socket: UdpSocket) -> Self {
        Self {
            xid: 0,
            prog,
            vers,
            socket,
        }
    }

    /// Call the null procedure of program/version
    pub async fn null(&mut self) -> Result<(), RpcError> {
        self.call(0, ()).await
    }

    /// Call procedure `proc` with arguments of type `ARGS`. Returns `Ok(RET)` if successfull.
    pub async fn call<ARGS, RET>(&mut self, proc: u32, args: ARGS) -> Result<RET, RpcError>
    where
        ARGS: XdrEncode,
        RET: XdrDecode + Default,
    {
        self.xid = self.xid.wrapping_add(1);
        let msg = encode_call(self.xid, self.prog, self.vers, proc, args)?;
        self.socket.send(&msg).await?;

        let mut buf = vec![0; MAX_DATAGRAM_LEN];
        loop {
            let n = self.socket.recv(&mut buf).await?;
            if let Some(ret) = decode_reply(self.xid, buf[..n].to_vec())? {
                break Ok(ret);
            }
        }
    }

    /// Call procedure `proc` without waiting for a reply
    pub async fn call_no_reply<ARGS>(&mut self, proc: u32, args: ARGS) -> Result<(), RpcError>
    where
        ARGS: XdrEncode,
    {
        self.xid = self.xid.wrapping_add(1);
        let msg = encode_call(self.xid, self.prog, self.vers, proc, args)?;
        self.socket.send(&msg).await?;
        Ok(())
    }
}

/// RPC client on a stream transport.
///
/// A call may be cancelled (e.g. by a timeout) while waiting for its reply, the late reply is
/// skipped by the next call. A call cancelled in the middle of sending or receiving a record
/// leaves the stream out of sync, every later call then fails with
/// [ErrorKind::BrokenPipe].
pub struct StreamRpcClient<IO> {
    xid: u32,
    prog: u32,
    vers: u32,
    io: IO,
    /// Set while a record is partially sent or received
    broken: bool,
}

impl<IO> StreamRpcClient<IO> {
    /// Create a client calling program `prog`, version `vers` over `io`
    pub fn new(io: IO, prog: u32, vers: u32) -> Self {
        Self {
            xid: 0,
            io,
            prog,
            vers,
            broken: false,
        }
    }
}

impl<IO> StreamRpcClient<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Call the null procedure of program/version
    pub async fn null(&mut self) -> Result<(), RpcError> {
        self.call(0, ()).await
    }

    /// Call procedure `proc` with arguments of type `ARGS`. Returns `Ok(RET)` if successfull.
    pub async fn call<ARGS, RET>(&mut self, proc: u32, args: ARGS) -> Result<RET, RpcError>
    where
        ARGS: XdrEncode,
        RET: XdrDecode + Default,
    {
        self.send(proc, args).await?;

        loop {
            let record = self.receive().await?;
            if let Some(ret) = decode_reply(self.xid, record)? {
                break Ok(ret);
            }
        }
    }

    /// Call procedure `proc` without waiting for a reply
    pub async fn call_no_reply<ARGS>(&mut self, proc: u32, args: ARGS) -> Result<(), RpcError>
    where
        ARGS: XdrEncode,
    {
        self.send(proc, args).await
    }

    async fn send<ARGS>(&mut self, proc: u32, args: ARGS) -> Result<(), RpcError>
    where
        ARGS: XdrEncode,
    {
        if self.broken {
            return Err(RpcError::Io(ErrorKind::BrokenPipe.into()));
        }
        self.xid = self.xid.wrapping_add(1);
        let msg = encode_call(self.xid, self.prog, self.vers, proc, args)?;

        self.broken = true;
        write_record(&mut self.io, msg).await?;
        self.broken = false;
        Ok(())
    }

    /// Receive the next record
    async fn receive(&mut self) -> Result<Vec<u8>, RpcError> {
        // Nothing is consumed until the first byte of a record arrives, waiting can be cancelled
        let mut first = [0u8; 1];
        if self.io.read(&mut first).await? == 0 {
            return Err(RpcError::Io(ErrorKind::UnexpectedEof.into()));
        }

        self.broken = true;
        let record = read_record(&mut (&first[..]).chain(&mut self.io), MAX_RECORD_LEN).await?;
        self.broken = false;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use async_std::{future, os::unix::net::UnixStream};
    use futures::AsyncWriteExt;

    use super::*;

    const TEST_PROG: u32 = 0x2000_0001;
    const TEST_VERS: u32 = 3;

    /// Adds two numbers, procedure 2 is one-way and procedure 3 answers after 300ms
    struct Adder;

    #[async_trait]
    impl RpcService for Adder {
        async fn call(
            self: Arc<Self>,
            prog: u32,
            vers: u32,
            proc: u32,
            args: &mut Cursor<Vec<u8>>,
            ret: &mut Cursor<Vec<u8>>,
        ) -> Result<(), RpcError> {
            if prog != TEST_PROG {
                return Err(RpcError::ProgUnavail);
            }
            if vers != TEST_VERS {
                return Err(RpcError::ProgMissmatch(MissmatchInfo {
                    low: TEST_VERS,
                    high: TEST_VERS,
                }));
            }
            match proc {
                0 | 2 => Ok(()),
                3 => {
                    task::sleep(Duration::from_millis(300)).await;
                    Ok(())
                }
                1 => {
                    let (mut a, mut b) = (0u32, 0u32);
                    a.read_xdr(args).map_err(|_| RpcError::GarbageArgs)?;
                    b.read_xdr(args).map_err(|_| RpcError::GarbageArgs)?;
                    (a + b).write_xdr(ret)?;
                    Ok(())
                }
                _ => Err(RpcError::ProcUnavail),
            }
        }

        fn replies(&self, prog: u32, vers: u32, proc: u32) -> bool {
            (prog, vers, proc) != (TEST_PROG, TEST_VERS, 2)
        }
    }

    struct Pair(u32, u32);

    impl XdrEncode for Pair {
        fn write_xdr<WR>(&self, writer: &mut WR) -> io::Result<()>
        where
            WR: std::io::Write,
        {
            self.0.write_xdr(writer)?;
            self.1.write_xdr(writer)
        }
    }

    fn serve(stream: UnixStream) {
        task::spawn(Arc::new(Adder).serve_stream(stream));
    }

    #[async_std::test]
    async fn call_accepted() {
        let (client, server) = UnixStream::pair().unwrap();
        serve(server);
        let mut client = StreamRpcClient::new(client, TEST_PROG, TEST_VERS);

        client.null().await.unwrap();
        let sum: u32 = client.call(1, Pair(2, 3)).await.unwrap();
        assert_eq!(sum, 5);
    }

    #[async_std::test]
    async fn call_rejected() {
        let (client, server) = UnixStream::pair().unwrap();
        serve(server);

        let mut client = StreamRpcClient::new(client, TEST_PROG, TEST_VERS + 1);
        let res: Result<u32, _> = client.call(1, Pair(2, 3)).await;
        assert!(matches!(
            res,
            Err(RpcError::ProgMissmatch(MissmatchInfo { low: 3, high: 3 }))
        ));

        // Same connection, wrong procedure
        client.vers = TEST_VERS;
        let res: Result<u32, _> = client.call(9, ()).await;
        assert!(matches!(res, Err(RpcError::ProcUnavail)));

        // Missing second argument
        let res: Result<u32, _> = client.call(1, 1u32).await;
        assert!(matches!(res, Err(RpcError::GarbageArgs)));
    }

    #[async_std::test]
    async fn one_way_call_is_not_answered() {
        let (client, server) = UnixStream::pair().unwrap();
        serve(server);
        let mut client = StreamRpcClient::new(client, TEST_PROG, TEST_VERS);

        client.call_no_reply(2, ()).await.unwrap();
        // The next reply read must belong to this call, not the one-way one
        let sum: u32 = client.call(1, Pair(40, 2)).await.unwrap();
        assert_eq!(sum, 42);
    }

    #[async_std::test]
    async fn late_reply_is_skipped() {
        let (client, server) = UnixStream::pair().unwrap();
        serve(server);
        let mut client = StreamRpcClient::new(client, TEST_PROG, TEST_VERS);

        let res = future::timeout(Duration::from_millis(50), client.call::<_, ()>(3, ())).await;
        assert!(res.is_err());

        // Reply to the abandoned call arrives first
        let sum: u32 = client.call(1, Pair(2, 2)).await.unwrap();
        assert_eq!(sum, 4);
        client.null().await.unwrap();
    }

    #[async_std::test]
    async fn cancelled_inside_record() {
        let (client, mut server) = UnixStream::pair().unwrap();
        let mut client = StreamRpcClient::new(client, TEST_PROG, TEST_VERS);
        // Header of a 100 byte record, followed by only two bytes of it
        server.write_all(b"\x80\x00\x00\x64\x00\x00").await.unwrap();

        let res = future::timeout(Duration::from_millis(100), client.null()).await;
        assert!(res.is_err());

        let res = client.null().await;
        assert!(matches!(res, Err(RpcError::Io(ref err)) if err.kind() == ErrorKind::BrokenPipe));
    }

    #[async_std::test]
    async fn udp_call() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        task::spawn(Arc::new(Adder).serve_udp(server));

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(addr).await.unwrap();
        let mut client = UdpRpcClient::new(TEST_PROG, TEST_VERS, socket);

        client.null().await.unwrap();
        let sum: u32 = client.call(1, Pair(1, 1)).await.unwrap();
        assert_eq!(sum, 2);
    }
}
