//! Scripted core channel used by the client tests

use std::{
    collections::VecDeque,
    io::{self, Cursor},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_std::{
    os::unix::net::UnixStream,
    task::{self, JoinHandle},
};
use async_trait::async_trait;

use crate::common::{
    onc_rpc::prelude::*,
    vxi11::{
        xdr::{
            CreateLinkParms, CreateLinkResp, DeviceEnableSrqParms, DeviceError, DeviceErrorCode,
            DeviceGenericParms, DeviceLink, DeviceLockParms, DeviceReadParms, DeviceReadResp,
            DeviceReadStbResp, DeviceRemoteFunc, DeviceWriteParms, DeviceWriteResp, ReadReason,
        },
        CREATE_INTR_CHAN, CREATE_LINK, DESTROY_INTR_CHAN, DESTROY_LINK, DEVICE_CLEAR,
        DEVICE_CORE, DEVICE_CORE_VERSION, DEVICE_ENABLE_SRQ, DEVICE_LOCAL, DEVICE_LOCK,
        DEVICE_READ, DEVICE_READSTB, DEVICE_REMOTE, DEVICE_TRIGGER, DEVICE_UNLOCK, DEVICE_WRITE,
    },
    xdr::prelude::*,
};

#[derive(Default)]
pub(crate) struct State {
    pub create_link: Option<CreateLinkParms>,
    pub create_link_error: DeviceErrorCode,
    pub writes: Vec<DeviceWriteParms>,
    /// Replies to `device_write`, accepts the whole chunk when empty
    pub write_replies: VecDeque<DeviceWriteResp>,
    pub reads: Vec<DeviceReadParms>,
    /// Replies to `device_read`, served before `output`
    pub read_replies: VecDeque<DeviceReadResp>,
    /// Message read in pieces of the requested size, the read times out when it is empty too
    pub output: VecDeque<u8>,
    /// Delay before answering the next `device_read`
    pub read_delay: Duration,
    pub generic: Vec<(u32, DeviceGenericParms)>,
    pub locks: Vec<DeviceLockParms>,
    pub unlocks: Vec<DeviceLink>,
    pub enable_srq: Vec<DeviceEnableSrqParms>,
    pub intr_chan: Vec<DeviceRemoteFunc>,
    pub destroyed_intr_chan: usize,
    pub destroyed: Vec<DeviceLink>,
    pub stb: u8,
    /// Error returned by all control procedures
    pub error: DeviceErrorCode,
    pub destroy_error: DeviceErrorCode,
    /// Reject every call after `create_link` with `SYSTEM_ERR`
    pub fail_rpc: bool,
}

pub(crate) struct FakeDevice {
    max_recv_size: u32,
    state: Mutex<State>,
}

impl FakeDevice {
    pub const LID: DeviceLink = DeviceLink(7);
    pub const ABORT_PORT: u16 = 4242;

    pub fn new(max_recv_size: u32) -> Arc<Self> {
        Arc::new(Self {
            max_recv_size,
            state: Mutex::new(State::default()),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Serve a connected stream pair, returns the client end
    pub fn spawn(self: Arc<Self>) -> (UnixStream, JoinHandle<io::Result<()>>) {
        let (client, server) = UnixStream::pair().unwrap();
        let handle = task::spawn(self.serve_stream(server));
        (client, handle)
    }

    fn dispatch(
        &self,
        proc: u32,
        args: &mut Cursor<Vec<u8>>,
        ret: &mut Cursor<Vec<u8>>,
    ) -> Result<(), RpcError> {
        fn decode<T: XdrDecode + Default>(args: &mut Cursor<Vec<u8>>) -> Result<T, RpcError> {
            let mut parms = T::default();
            parms.read_xdr(args).map_err(|_| RpcError::GarbageArgs)?;
            Ok(parms)
        }

        let mut state = self.state();
        if proc != CREATE_LINK && state.fail_rpc {
            return Err(RpcError::SystemErr);
        }
        let error = DeviceError { error: state.error };

        match proc {
            0 => Ok(()),
            CREATE_LINK => {
                let parms: CreateLinkParms = decode(args)?;
                state.create_link = Some(parms);
                let resp = CreateLinkResp {
                    error: state.create_link_error,
                    lid: Self::LID,
                    abort_port: Self::ABORT_PORT,
                    max_recv_size: self.max_recv_size,
                };
                Ok(resp.write_xdr(ret)?)
            }
            DEVICE_WRITE => {
                let parms: DeviceWriteParms = decode(args)?;
                let resp = state.write_replies.pop_front().unwrap_or(DeviceWriteResp {
                    error: DeviceErrorCode::NoError,
                    size: parms.data.0.len() as u32,
                });
                state.writes.push(parms);
                Ok(resp.write_xdr(ret)?)
            }
            DEVICE_READ => {
                let parms: DeviceReadParms = decode(args)?;
                let resp = match state.read_replies.pop_front() {
                    Some(resp) => resp,
                    None if !state.output.is_empty() => {
                        let n = state.output.len().min(parms.request_size as usize);
                        let data: Vec<u8> = state.output.drain(..n).collect();
                        let reason = if state.output.is_empty() {
                            ReadReason::END
                        } else {
                            ReadReason::REQCNT
                        };
                        DeviceReadResp {
                            error: DeviceErrorCode::NoError,
                            reason: ReadReason(reason),
                            data: Opaque(data),
                        }
                    }
                    None => DeviceReadResp {
                        error: DeviceErrorCode::IoTimeout,
                        ..Default::default()
                    },
                };
                state.reads.push(parms);
                Ok(resp.write_xdr(ret)?)
            }
            DEVICE_READSTB => {
                let parms: DeviceGenericParms = decode(args)?;
                state.generic.push((proc, parms));
                let resp = DeviceReadStbResp {
                    error: state.error,
                    stb: state.stb,
                };
                Ok(resp.write_xdr(ret)?)
            }
            DEVICE_TRIGGER | DEVICE_CLEAR | DEVICE_REMOTE | DEVICE_LOCAL => {
                let parms: DeviceGenericParms = decode(args)?;
                state.generic.push((proc, parms));
                Ok(error.write_xdr(ret)?)
            }
            DEVICE_LOCK => {
                let parms: DeviceLockParms = decode(args)?;
                state.locks.push(parms);
                Ok(error.write_xdr(ret)?)
            }
            DEVICE_UNLOCK => {
                let lid: DeviceLink = decode(args)?;
                state.unlocks.push(lid);
                Ok(error.write_xdr(ret)?)
            }
            DEVICE_ENABLE_SRQ => {
                let parms: DeviceEnableSrqParms = decode(args)?;
                state.enable_srq.push(parms);
                Ok(error.write_xdr(ret)?)
            }
            CREATE_INTR_CHAN => {
                let parms: DeviceRemoteFunc = decode(args)?;
                state.intr_chan.push(parms);
                Ok(error.write_xdr(ret)?)
            }
            DESTROY_INTR_CHAN => {
                state.destroyed_intr_chan += 1;
                Ok(error.write_xdr(ret)?)
            }
            DESTROY_LINK => {
                let lid: DeviceLink = decode(args)?;
                state.destroyed.push(lid);
                let resp = DeviceError {
                    error: state.destroy_error,
                };
                Ok(resp.write_xdr(ret)?)
            }
            _ => Err(RpcError::ProcUnavail),
        }
    }
}

#[async_trait]
impl RpcService for FakeDevice {
    async fn call(
        self: Arc<Self>,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &mut Cursor<Vec<u8>>,
        ret: &mut Cursor<Vec<u8>>,
    ) -> Result<(), RpcError> {
        if prog != DEVICE_CORE {
            return Err(RpcError::ProgUnavail);
        }
        if vers != DEVICE_CORE_VERSION {
            return Err(RpcError::ProgMissmatch(MissmatchInfo {
                low: DEVICE_CORE_VERSION,
                high: DEVICE_CORE_VERSION,
            }));
        }
        if proc == DEVICE_READ {
            let delay = std::mem::take(&mut self.state().read_delay);
            task::sleep(delay).await;
        }
        self.dispatch(proc, args, ret)
    }
}
