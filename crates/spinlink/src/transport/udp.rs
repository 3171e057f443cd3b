// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One bidirectional UDP socket bound to a SpiNNaker endpoint.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::SOCKET_RECEIVE_BUFFER_BYTES;
use crate::protocol::ChipCoord;

/// Largest datagram an SCP exchange can produce, with headroom.
const RECEIVE_BUFFER_LEN: usize = 512;

/// What an endpoint can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Can send SCP requests.
    pub scp_send: bool,
    /// Can receive SCP responses or tagged traffic.
    pub scp_recv: bool,
    /// Is the (unique) boot endpoint.
    pub boot: bool,
    /// Talks to a BMP rather than to SCAMP.
    pub bmp: bool,
}

impl Capabilities {
    /// A normal SCAMP connection: sends and receives SCP.
    #[must_use]
    pub fn scamp() -> Self {
        Capabilities {
            scp_send: true,
            scp_recv: true,
            boot: false,
            bmp: false,
        }
    }

    /// A BMP connection: SCP-shaped frames to a board management processor.
    #[must_use]
    pub fn bmp() -> Self {
        Capabilities {
            scp_send: true,
            scp_recv: true,
            boot: false,
            bmp: true,
        }
    }

    /// The boot endpoint: raw boot frames only, no SCP.
    #[must_use]
    pub fn boot_sender() -> Self {
        Capabilities {
            scp_send: false,
            scp_recv: false,
            boot: true,
            bmp: false,
        }
    }

    /// A receive-only sink for IP-tagged traffic.
    #[must_use]
    pub fn tag_sink() -> Self {
        Capabilities {
            scp_send: false,
            scp_recv: true,
            boot: false,
            bmp: false,
        }
    }
}

/// A UDP endpoint with known remote address and capability set.
///
/// The socket is owned by exactly one pipeline (or one listener); callers
/// never touch it directly.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    remote_chip: Option<ChipCoord>,
    capabilities: Capabilities,
}

impl UdpEndpoint {
    /// Open a connected endpoint to `remote`, ephemeral local port.
    pub fn connect(
        remote: SocketAddr,
        remote_chip: Option<ChipCoord>,
        capabilities: Capabilities,
    ) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if let Err(err) = socket.set_recv_buffer_size(SOCKET_RECEIVE_BUFFER_BYTES) {
            // The OS may refuse a large buffer; the default still works.
            log::warn!("[UDP] could not grow receive buffer: {}", err);
        }
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        socket.bind(&bind_addr.into())?;
        let socket: UdpSocket = socket.into();
        socket.connect(remote)?;
        let local_addr = socket.local_addr()?;
        log::debug!(
            "[UDP] endpoint {} -> {} chip={:?}",
            local_addr,
            remote,
            remote_chip
        );
        Ok(UdpEndpoint {
            socket,
            local_addr,
            remote_addr: Some(remote),
            remote_chip,
            capabilities,
        })
    }

    /// Open a receive-only endpoint bound to `local_port` on all interfaces.
    pub fn bind_listener(local_port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if let Err(err) = socket.set_recv_buffer_size(SOCKET_RECEIVE_BUFFER_BYTES) {
            log::warn!("[UDP] could not grow receive buffer: {}", err);
        }
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), local_port);
        socket.bind(&bind_addr.into())?;
        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr()?;
        log::debug!("[UDP] listener bound to {}", local_addr);
        Ok(UdpEndpoint {
            socket,
            local_addr,
            remote_addr: None,
            remote_chip: None,
            capabilities: Capabilities::tag_sink(),
        })
    }

    /// Local socket address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote socket address, if connected.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Remote IP, if connected.
    #[must_use]
    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_addr.map(|a| a.ip())
    }

    /// Chip the remote end of this endpoint sits on, if known.
    #[must_use]
    pub fn remote_chip(&self) -> Option<ChipCoord> {
        self.remote_chip
    }

    /// Capability set of this endpoint.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Send one datagram to the connected remote.
    pub fn send(&self, data: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(data)?;
        if sent != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", sent, data.len()),
            ));
        }
        Ok(())
    }

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// A lapse returns `WouldBlock`/`TimedOut`; callers treat both as the
    /// receive timing out.
    pub fn receive(&self, timeout: Duration) -> io::Result<Vec<u8>> {
        self.receive_from(timeout).map(|(data, _)| data)
    }

    /// Receive one datagram with its source address.
    pub fn receive_from(&self, timeout: Duration) -> io::Result<(Vec<u8>, SocketAddr)> {
        // set_read_timeout(None) would block forever; clamp to 1ms.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; RECEIVE_BUFFER_LEN];
        let (len, source) = self.socket.recv_from(&mut buf)?;
        Ok((buf[..len].to_vec(), source))
    }
}

/// Whether an I/O error is a receive timeout rather than a socket failure.
#[must_use]
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_pair() -> (UdpSocket, UdpEndpoint) {
        let peer = UdpSocket::bind("127.0.0.1:0").expect("bind peer");
        let endpoint = UdpEndpoint::connect(
            peer.local_addr().expect("peer addr"),
            Some(ChipCoord::new(0, 0)),
            Capabilities::scamp(),
        )
        .expect("connect endpoint");
        (peer, endpoint)
    }

    #[test]
    fn test_send_reaches_peer() {
        let (peer, endpoint) = local_pair();
        endpoint.send(b"ping").expect("send");
        let mut buf = [0u8; 16];
        let (len, _) = peer.recv_from(&mut buf).expect("recv");
        assert_eq!(&buf[..len], b"ping");
    }

    #[test]
    fn test_receive_round_trip() {
        let (peer, endpoint) = local_pair();
        endpoint.send(b"hello").expect("send");
        let mut buf = [0u8; 16];
        let (_, from) = peer.recv_from(&mut buf).expect("recv");
        peer.send_to(b"world", from).expect("reply");

        let data = endpoint
            .receive(Duration::from_millis(500))
            .expect("receive");
        assert_eq!(data, b"world");
    }

    #[test]
    fn test_receive_times_out() {
        let (_peer, endpoint) = local_pair();
        let err = endpoint
            .receive(Duration::from_millis(20))
            .expect_err("nothing to receive");
        assert!(is_timeout(&err), "unexpected kind: {:?}", err.kind());
    }

    #[test]
    fn test_capability_constructors() {
        assert!(Capabilities::scamp().scp_send);
        assert!(!Capabilities::tag_sink().scp_send);
        assert!(Capabilities::bmp().bmp);
    }
}
