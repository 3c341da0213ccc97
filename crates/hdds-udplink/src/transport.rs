// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Connected, non-blocking UDP socket shared by one send/receive worker pair.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::LinkConfig;

/// UDP socket connected to the link's peer.
///
/// Connecting filters out datagrams from other sources and lets the kernel
/// report ICMP unreachable errors on the socket, which surface as receive
/// faults.
#[derive(Debug)]
pub struct LinkSocket {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl LinkSocket {
    /// Open a socket bound per `config` and connect it to `peer`.
    pub fn open(config: &LinkConfig, peer: SocketAddr) -> io::Result<Self> {
        let domain = if peer.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        if config.socket_send_buffer > 0 {
            socket.set_send_buffer_size(config.socket_send_buffer)?;
        }
        if config.socket_recv_buffer > 0 {
            socket.set_recv_buffer_size(config.socket_recv_buffer)?;
        }

        socket.bind(&config.local_bind_addr().into())?;
        socket.connect(&peer.into())?;
        // Workers poll; a read must never park the thread.
        socket.set_nonblocking(true)?;

        let socket: UdpSocket = socket.into();
        log::debug!(
            "[LINK] socket open local={:?} peer={}",
            socket.local_addr().ok(),
            peer
        );
        Ok(Self { socket, peer })
    }

    /// Transmit one datagram to the peer.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.socket.send(data)
    }

    /// Read one datagram if one is pending.
    ///
    /// Returns `Ok(None)` when nothing is available.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
