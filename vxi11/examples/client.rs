use std::{
    error::Error,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use async_std::task;
use clap::Parser;
use lxi_vxi11_client::{client::prelude::*, server::prelude::*};

/// Send a command to a VXI-11 instrument and print the answer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host name or address of the instrument
    host: String,

    /// Command to send, a response is read if it ends with '?'
    #[arg(default_value = "*IDN?")]
    command: String,

    /// Device name
    #[arg(short, long, default_value = "inst0")]
    device: String,

    /// Io timeout in milliseconds
    #[arg(short, long, default_value_t = 10000)]
    timeout: u64,

    /// Largest response accepted
    #[arg(long, default_value_t = 64 * 1024)]
    max_response: usize,

    /// Arm SRQ and wait this many seconds for service requests.
    /// The instrument must be able to reach this host at `--srq-host`.
    #[arg(long)]
    srq: Option<u64>,

    /// Address of this host as seen from the instrument
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    srq_host: Ipv4Addr,
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn Error>> {
    femme::with_level(log::LevelFilter::Debug);
    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout);

    let mut inst = Vxi11ClientBuilder::new()
        .device(args.device)
        .io_timeout(timeout)
        .read_timeout(timeout)
        .term_char(b'\n')
        .connect(&args.host)
        .await?;
    log::info!("Linked to {}: {:?}", args.host, inst.link());

    let mut command = args.command.into_bytes();
    command.push(b'\n');
    inst.write(&command).await?;
    if command.ends_with(b"?\n") {
        let response = inst.read(args.max_response).await?;
        println!("{}", String::from_utf8_lossy(&response).trim_end());
    }

    if let Some(secs) = args.srq {
        let service = VxiIntrServiceBuilder::new()
            .without_portmapper()
            .handler(|parms: DeviceSrqParms| {
                log::info!("Service request, handle={:?}", parms.handle.0)
            })
            .start()
            .await?;

        inst.create_intr_chan_at(
            SocketAddrV4::new(args.srq_host, service.tcp_addr().port()),
            DeviceAddrFamily::Tcp,
        )
        .await?;
        inst.enable_srq(true).await?;
        log::info!("Waiting {}s for service requests", secs);
        task::sleep(Duration::from_secs(secs)).await;
        inst.enable_srq(false).await?;
        inst.destroy_intr_chan().await?;
    }

    inst.close().await?;
    Ok(())
}
