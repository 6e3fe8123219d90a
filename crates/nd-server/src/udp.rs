//! The UDP transport.

use crate::transport::{Transport, WaitResult};
use nd_dos::{msg2err, Error};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::unix::io::AsRawFd;

pub struct UdpTransport {
    socket: UdpSocket,
    last_peer: Option<SocketAddrV4>,
}

impl UdpTransport {
    /// Bind to the given address and port. An empty address binds to
    /// all interfaces.
    pub fn bind(addr: &str, port: u16) -> Result<Self, Error> {
        let ip: Ipv4Addr = if addr.is_empty() {
            Ipv4Addr::UNSPECIFIED
        } else {
            addr.parse().map_err(|_| msg2err!(format!("invalid bind address {addr:?}")))?
        };
        let socket = UdpSocket::bind(SocketAddrV4::new(ip, port))?;
        Ok(Self {
            socket,
            last_peer: None,
        })
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn wait_for_data(&mut self, timeout_ms: u32) -> Result<WaitResult, Error> {
        // select() instead of a blocking recv so an arriving signal is
        // observable as EINTR
        let fd = self.socket.as_raw_fd();
        let mut read_set: libc::fd_set = unsafe { core::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_set);
            libc::FD_SET(fd, &mut read_set);
        }
        let mut timeout = libc::timeval {
            tv_sec: (timeout_ms / 1000) as libc::time_t,
            tv_usec: ((timeout_ms % 1000) * 1000) as libc::suseconds_t,
        };

        let res = unsafe {
            libc::select(
                fd + 1,
                &mut read_set,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut timeout,
            )
        };
        if res == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(WaitResult::Signal);
            }
            return Err(msg2err!(format!("select: {err}")));
        }
        Ok(if res == 0 { WaitResult::Timeout } else { WaitResult::Ready })
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4), Error> {
        let (len, addr) = self.socket.recv_from(buf)?;
        match addr {
            SocketAddr::V4(peer) => {
                self.last_peer = Some(peer);
                Ok((len, peer))
            }
            SocketAddr::V6(peer) => Err(msg2err!(format!("unexpected IPv6 peer {peer}"))),
        }
    }

    fn send_reply(&mut self, data: &[u8]) -> Result<usize, Error> {
        let peer = self.last_peer.ok_or_else(|| msg2err!("no peer to reply to"))?;
        Ok(self.socket.send_to(data, peer)?)
    }
}
