#![allow(dead_code)]

use std::{
    io::Cursor,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_std::{net::TcpListener, task};
use async_trait::async_trait;
use lxi_vxi11_client::common::{
    onc_rpc::prelude::*,
    portmapper::{
        prelude::*, PMAPPROC_GETPORT, PMAPPROC_NULL, PMAPPROC_SET, PMAPPROC_UNSET,
    },
    xdr::prelude::*,
};

/// In-memory portmapper
#[derive(Default)]
pub struct FakePortMapper {
    pub mappings: Mutex<Vec<Mapping>>,
    /// Every SET/UNSET/GETPORT call in order
    pub calls: Mutex<Vec<(u32, Mapping)>>,
    /// Refuse every SET
    pub reject: bool,
}

impl FakePortMapper {
    pub fn new(mappings: Vec<Mapping>) -> Arc<Self> {
        Arc::new(Self {
            mappings: Mutex::new(mappings),
            ..Default::default()
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl RpcService for FakePortMapper {
    async fn call(
        self: Arc<Self>,
        prog: u32,
        vers: u32,
        proc: u32,
        args: &mut Cursor<Vec<u8>>,
        ret: &mut Cursor<Vec<u8>>,
    ) -> Result<(), RpcError> {
        if prog != PORTMAPPER_PROG || vers != PORTMAPPER_VERS {
            return Err(RpcError::ProgUnavail);
        }
        if proc == PMAPPROC_NULL {
            return Ok(());
        }

        let mut mapping = Mapping::default();
        mapping
            .read_xdr(args)
            .map_err(|_| RpcError::GarbageArgs)?;
        self.calls.lock().unwrap().push((proc, mapping));

        let mut mappings = self.mappings.lock().unwrap();
        match proc {
            PMAPPROC_SET => {
                let exists = mappings.iter().any(|m| {
                    (m.prog, m.vers, m.prot) == (mapping.prog, mapping.vers, mapping.prot)
                });
                let res = !self.reject && !exists;
                if res {
                    mappings.push(mapping);
                }
                res.write_xdr(ret)?;
            }
            PMAPPROC_UNSET => {
                let len = mappings.len();
                mappings.retain(|m| (m.prog, m.vers) != (mapping.prog, mapping.vers));
                (mappings.len() != len).write_xdr(ret)?;
            }
            PMAPPROC_GETPORT => {
                let port = mappings
                    .iter()
                    .find(|m| {
                        (m.prog, m.vers, m.prot) == (mapping.prog, mapping.vers, mapping.prot)
                    })
                    .map_or(0, |m| m.port);
                port.write_xdr(ret)?;
            }
            _ => return Err(RpcError::ProcUnavail),
        }
        Ok(())
    }
}

/// Serve `service` on an ephemeral TCP port of localhost
pub async fn serve_tcp<S>(service: Arc<S>) -> SocketAddr
where
    S: RpcService + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    task::spawn(service.serve_tcp(listener));
    addr
}
