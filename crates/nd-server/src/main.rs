//! Serve host directory trees as DOS network drives over UDP.

use gumdrop::Options;
use nd_dos::{msg2err, Error};
use nd_drive::Drives;
use nd_proto::PROTO_UDP_PORT;
use nd_server::config::{parse_share, CommandOptions};
use nd_server::udp::UdpTransport;
use nd_server::{signal, Server};
use tracing::info;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = CommandOptions::parse_args_default_or_exit();

    let mut drives = Drives::new();
    for share in &opts.shares {
        parse_share(share, &mut drives)?;
    }
    if !drives.iter().any(|(_, drive)| drive.is_shared()) {
        return Err(msg2err!("no shared drive defined, use --help to display help"));
    }

    let mut transport = UdpTransport::bind(&opts.bind_addr, opts.bind_port.unwrap_or(PROTO_UDP_PORT))?;
    let exit_flag = signal::install()?;

    info!("listening on {}", transport.local_addr()?);
    for (letter, drive) in drives.iter() {
        if drive.is_shared() {
            info!(
                "{letter}: => {} ({:?} attributes{})",
                drive.root().display(),
                drive.attr_mode(),
                if drive.read_only() { ", read-only" } else { "" },
            );
        }
    }

    let mut server = Server::new(drives, exit_flag);
    server.run(&mut transport)
}
