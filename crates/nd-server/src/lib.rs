//! The netdrive server: protocol engine, reply cache and transports.

pub mod cache;
pub mod config;
mod engine;
pub mod signal;
pub mod transport;
pub mod udp;

use cache::ReplyCache;
use nd_dos::date::unix_now;
use nd_dos::Error;
use nd_drive::Drives;
use nd_proto::{bsd_checksum, Header, HEADER_LEN, PROTO_MAGIC, PROTO_VERSION};
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};
use transport::{Transport, WaitResult};

/// Receive buffer; larger than any valid packet.
const RECV_BUFFER: usize = 2048;

/// Everything one server instance owns.
///
/// The core is single-threaded and strictly serial: one request is
/// processed to completion before the next datagram is considered.
pub struct Server {
    pub drives: Drives,
    cache: ReplyCache,
    exit_flag: &'static AtomicBool,
}

impl Server {
    pub fn new(drives: Drives, exit_flag: &'static AtomicBool) -> Self {
        Self {
            drives,
            cache: ReplyCache::new(),
            exit_flag,
        }
    }

    /// Serve datagrams until the exit flag is raised.
    pub fn run(&mut self, transport: &mut dyn Transport) -> Result<(), Error> {
        let mut request = [0u8; RECV_BUFFER];
        while !self.exit_flag.load(Ordering::Relaxed) {
            match transport.wait_for_data(10_000)? {
                WaitResult::Timeout => continue,
                WaitResult::Signal => {
                    debug!("wait_for_data: interrupted by a signal");
                    continue;
                }
                WaitResult::Ready => {}
            }

            let (len, peer) = transport.receive(&mut request)?;
            debug!("received {len} bytes from {peer}");

            if let Some(reply) = self.handle_datagram(&request[..len], peer) {
                let want = reply.len();
                let sent = transport.send_reply(reply)?;
                if sent != want {
                    error!("reply: sent {sent} of {want} bytes");
                }
            }
        }
        Ok(())
    }

    /// Validate one datagram and produce the finalized reply bytes.
    ///
    /// Malformed datagrams are dropped silently; the client times out
    /// and retries. A repeated sequence number from the same peer is
    /// answered with the cached reply so mutations stay at-most-once.
    pub fn handle_datagram(&mut self, packet: &[u8], peer: SocketAddrV4) -> Option<&[u8]> {
        let Some(header) = Header::parse(packet) else {
            warn!("truncated packet from {peer}");
            return None;
        };
        if header.version != PROTO_VERSION {
            warn!("unsupported protocol version {} from {peer}", header.version);
            return None;
        }

        let advertised = header.length();
        if advertised < HEADER_LEN || advertised > packet.len() {
            warn!("malformed packet length {advertised} from {peer}");
            return None;
        }
        // trailing bytes beyond the advertised length are ignored
        let packet = &packet[..advertised];

        if header.has_checksum() {
            let computed = bsd_checksum(&packet[HEADER_LEN..]);
            if computed != header.checksum {
                warn!(
                    "checksum mismatch from {peer}: computed 0x{computed:04X}, received 0x{:04X}",
                    header.checksum
                );
                return None;
            }
        } else if header.checksum != PROTO_MAGIC {
            warn!("bad magic from {peer}");
            return None;
        }

        let entry = self.cache.entry(peer);

        // the last reply answers a repeated sequence number verbatim
        if entry.len > 0 && Header::parse(&entry.packet).is_some_and(|cached| cached.sequence == header.sequence) {
            debug!("retransmitting the cached reply (sequence {})", header.sequence);
            return Some(&entry.packet[..entry.len]);
        }

        match engine::process_request(&mut self.drives, &mut entry.packet, packet) {
            Some(total) => {
                finalize(&mut entry.packet, total, header.has_checksum());
                entry.len = total;
                entry.timestamp = unix_now();
                Some(&entry.packet[..total])
            }
            None => {
                entry.len = 0;
                None
            }
        }
    }
}

/// Write the final length and checksum-or-magic into a reply.
///
/// The checksum choice mirrors the request.
fn finalize(reply: &mut [u8], total: usize, with_checksum: bool) {
    let Some(mut header) = Header::parse(reply) else {
        return;
    };
    if with_checksum {
        header.checksum = bsd_checksum(&reply[HEADER_LEN..total]);
        header.length_flags = 0x8000 | total as u16;
    } else {
        header.checksum = PROTO_MAGIC;
        header.length_flags = total as u16 & 0x7FFF;
    }
    header.emit(reply);
}
