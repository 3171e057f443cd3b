// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Boot frame framing and the send-only boot connection.
//!
//! Boot frames predate SDP: they are big-endian, carry an opcode and three
//! operands, and solicit no reply. This module only frames and sends them;
//! generating a boot image is the caller's business.

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use crate::config::UDP_BOOT_PORT;

/// Boot protocol version stamped into every frame.
const BOOT_PROTOCOL_VERSION: u16 = 1;

/// Opcodes of the boot protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BootOpcode {
    /// Hello / flood-fill start.
    FloodFillStart = 1,
    /// One block of the boot image.
    FloodFillBlock = 3,
    /// End of image, start execution.
    FloodFillControl = 5,
}

/// One frame of the boot conversation.
#[derive(Debug, Clone)]
pub struct BootFrame {
    /// Frame opcode.
    pub opcode: BootOpcode,
    /// First operand.
    pub operand1: u32,
    /// Second operand.
    pub operand2: u32,
    /// Third operand.
    pub operand3: u32,
    /// Image bytes carried by this frame, big-endian words.
    pub payload: Vec<u8>,
}

impl BootFrame {
    /// Frame without payload.
    #[must_use]
    pub fn control(opcode: BootOpcode, operand1: u32, operand2: u32, operand3: u32) -> Self {
        BootFrame {
            opcode,
            operand1,
            operand2,
            operand3,
            payload: Vec::new(),
        }
    }

    /// Encode the frame for the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(18 + self.payload.len());
        buf.extend_from_slice(&BOOT_PROTOCOL_VERSION.to_be_bytes());
        buf.extend_from_slice(&(self.opcode as u32).to_be_bytes());
        buf.extend_from_slice(&self.operand1.to_be_bytes());
        buf.extend_from_slice(&self.operand2.to_be_bytes());
        buf.extend_from_slice(&self.operand3.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Send-only connection to the boot port of a board.
///
/// Unique per transceiver; no replies are ever solicited.
#[derive(Debug)]
pub struct BootSender {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl BootSender {
    /// Open a boot sender towards `host`.
    pub fn open(host: IpAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        let remote = SocketAddr::new(host, UDP_BOOT_PORT);
        socket.connect(remote)?;
        log::debug!("[BOOT] sender ready for {}", remote);
        Ok(BootSender { socket, remote })
    }

    /// Remote boot address.
    #[must_use]
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Send one boot frame.
    pub fn send(&self, frame: &BootFrame) -> io::Result<()> {
        let data = frame.encode();
        let sent = self.socket.send(&data)?;
        if sent != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short boot send",
            ));
        }
        Ok(())
    }

    /// Stream a sequence of boot frames in order.
    pub fn send_all<'a, I>(&self, frames: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a BootFrame>,
    {
        for frame in frames {
            self.send(frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_big_endian() {
        let frame = BootFrame::control(BootOpcode::FloodFillStart, 0x0102_0304, 0, 8);
        let encoded = frame.encode();
        assert_eq!(&encoded[0..2], &[0, 1], "protocol version");
        assert_eq!(&encoded[2..6], &[0, 0, 0, 1], "opcode");
        assert_eq!(&encoded[6..10], &[1, 2, 3, 4], "operand 1 big-endian");
        assert_eq!(encoded.len(), 18);
    }

    #[test]
    fn test_sender_streams_frames() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind");
        let port = receiver.local_addr().expect("addr").port();

        // Point the sender at our receiver rather than the real boot port.
        let socket = UdpSocket::bind("0.0.0.0:0").expect("bind sender");
        let remote: SocketAddr = format!("127.0.0.1:{}", port).parse().expect("addr");
        socket.connect(remote).expect("connect");
        let sender = BootSender { socket, remote };

        let frames = [
            BootFrame::control(BootOpcode::FloodFillStart, 0, 0, 1),
            BootFrame::control(BootOpcode::FloodFillControl, 1, 0, 0),
        ];
        sender.send_all(frames.iter()).expect("send");

        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).expect("first frame");
        assert_eq!(len, 18);
    }
}
