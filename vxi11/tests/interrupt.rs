use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_std::{
    future,
    net::{TcpStream, UdpSocket},
    task::{self, TaskId},
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver},
    StreamExt,
};
use lxi_vxi11_client::{
    common::{
        onc_rpc::prelude::*,
        portmapper::{prelude::*, PMAPPROC_SET, PMAPPROC_UNSET},
        vxi11::{DEVICE_INTR, DEVICE_INTR_SRQ, DEVICE_INTR_VERSION},
        xdr::basic::Opaque,
    },
    server::prelude::*,
};

mod common;

use common::{serve_tcp, FakePortMapper};

type Received = UnboundedReceiver<(Vec<u8>, Option<TaskId>)>;

/// Service on localhost, reporting every SRQ handle and the task it was handled in
fn service() -> (VxiIntrService, Received) {
    let (sender, receiver) = unbounded();
    let service = VxiIntrServiceBuilder::new()
        .bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .without_portmapper()
        .handler(move |parms: DeviceSrqParms| {
            let task = task::try_current().map(|t| t.id());
            sender.unbounded_send((parms.handle.0, task)).unwrap();
        });
    (service, receiver)
}

/// Receive exactly one SRQ
async fn expect_one(received: &mut Received) -> (Vec<u8>, Option<TaskId>) {
    let srq = future::timeout(Duration::from_secs(2), received.next())
        .await
        .expect("no SRQ received")
        .unwrap();
    assert!(
        future::timeout(Duration::from_millis(200), received.next())
            .await
            .is_err(),
        "SRQ handled more than once"
    );
    srq
}

#[async_std::test]
async fn srq_over_udp() {
    let (service, mut received) = service();
    let handle = service.start().await.unwrap();

    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    socket.connect(handle.udp_addr()).await.unwrap();
    let mut client = UdpRpcClient::new(DEVICE_INTR, DEVICE_INTR_VERSION, socket);

    // The null procedure is answered
    client.null().await.unwrap();

    client
        .call_no_reply(DEVICE_INTR_SRQ, DeviceSrqParms::new(Opaque(vec![0, 0, 0, 1])))
        .await
        .unwrap();

    let (srq, task) = expect_one(&mut received).await;
    assert_eq!(srq, vec![0, 0, 0, 1]);
    assert!(task.is_some());
    assert_ne!(task, Some(task::current().id()));
}

#[async_std::test]
async fn srq_over_tcp() {
    let (service, mut received) = service();
    let handle = service.start().await.unwrap();

    let stream = TcpStream::connect(handle.tcp_addr()).await.unwrap();
    let mut client = StreamRpcClient::new(stream, DEVICE_INTR, DEVICE_INTR_VERSION);

    client
        .call_no_reply(DEVICE_INTR_SRQ, DeviceSrqParms::new(Opaque(b"dmm".to_vec())))
        .await
        .unwrap();
    // Would read the reply of the SRQ if one was sent
    client.null().await.unwrap();

    let (srq, task) = expect_one(&mut received).await;
    assert_eq!(srq, b"dmm".to_vec());
    assert_ne!(task, Some(task::current().id()));
}

#[async_std::test]
async fn last_handler_wins() {
    let (first, mut first_received) = service();
    let (sender, mut received) = unbounded();
    let service = first.handler(move |parms: DeviceSrqParms| {
        sender.unbounded_send(parms.handle.0).unwrap();
    });
    let handle = service.start().await.unwrap();

    let stream = TcpStream::connect(handle.tcp_addr()).await.unwrap();
    let mut client = StreamRpcClient::new(stream, DEVICE_INTR, DEVICE_INTR_VERSION);
    client
        .call_no_reply(DEVICE_INTR_SRQ, DeviceSrqParms::new(Opaque(vec![9])))
        .await
        .unwrap();
    client.null().await.unwrap();

    assert_eq!(received.next().await, Some(vec![9]));
    // First handler was dropped with the service it belonged to
    assert_eq!(first_received.next().await, None);
}

#[async_std::test]
async fn registers_with_portmapper() {
    let portmapper = FakePortMapper::new(vec![Mapping::new(
        DEVICE_INTR,
        DEVICE_INTR_VERSION,
        PORTMAPPER_PROT_TCP,
        1234,
    )]);
    let pm_addr = serve_tcp(portmapper.clone()).await;

    let handle = VxiIntrServiceBuilder::new()
        .bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .portmapper(pm_addr)
        .handler(|_: DeviceSrqParms| {})
        .start()
        .await
        .unwrap();

    let udp_port = handle.udp_addr().port() as u32;
    let tcp_port = handle.tcp_addr().port() as u32;
    assert_eq!(
        *portmapper.calls.lock().unwrap(),
        vec![
            (
                PMAPPROC_UNSET,
                Mapping::new(DEVICE_INTR, DEVICE_INTR_VERSION, 0, 0)
            ),
            (
                PMAPPROC_SET,
                Mapping::new(DEVICE_INTR, DEVICE_INTR_VERSION, PORTMAPPER_PROT_UDP, udp_port)
            ),
            (
                PMAPPROC_SET,
                Mapping::new(DEVICE_INTR, DEVICE_INTR_VERSION, PORTMAPPER_PROT_TCP, tcp_port)
            ),
        ]
    );
    // Stale mapping was replaced
    assert_eq!(
        *portmapper.mappings.lock().unwrap(),
        vec![
            Mapping::new(DEVICE_INTR, DEVICE_INTR_VERSION, PORTMAPPER_PROT_UDP, udp_port),
            Mapping::new(DEVICE_INTR, DEVICE_INTR_VERSION, PORTMAPPER_PROT_TCP, tcp_port),
        ]
    );
}

#[async_std::test]
async fn rejected_registration() {
    let pm_addr = serve_tcp(FakePortMapper::rejecting()).await;

    let res = VxiIntrServiceBuilder::new()
        .bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .portmapper(pm_addr)
        .handler(|_: DeviceSrqParms| {})
        .start()
        .await;

    assert!(matches!(
        res,
        Err(ServiceError::Rejected(Mapping {
            prot: PORTMAPPER_PROT_UDP,
            ..
        }))
    ));
}

#[async_std::test]
async fn portmapper_unreachable() {
    // Nothing listens on the port of a dropped listener
    let addr: SocketAddr = {
        let listener = async_std::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let res = VxiIntrServiceBuilder::new()
        .portmapper(addr)
        .handler(|_: DeviceSrqParms| {})
        .start()
        .await;

    assert!(matches!(res, Err(ServiceError::Rpc(RpcError::Io(_)))));
}
