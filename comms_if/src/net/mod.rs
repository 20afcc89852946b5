//! # Network Module
//!
//! This module provides the datagram transport which carries frames between the node and its
//! remote controller. The peer speaks raw UDP with one frame per datagram, so the transport is a
//! thin wrapper over a non-blocking [`UdpSocket`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
};
use log::trace;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A transport able to move whole frames to and from the remote controller.
///
/// Implementors must never block in `try_receive`. Waiting for a frame is the caller's job.
pub trait FrameTransport {
    /// Send one frame's bytes to the remote peer.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receive one datagram into `buf` if one is pending, returning its length.
    fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A UDP socket bound to a local address and aimed at a single remote peer.
pub struct UdpTransport {
    socket: UdpSocket,

    remote: SocketAddr,

    options: SocketOptions,
}

/// Represents options which can be set on a [`UdpTransport`].
#[derive(Debug, Clone, Deserialize)]
pub struct SocketOptions {
    /// Local address to bind, for instance `"0.0.0.0:22224"`.
    pub bind_addr: String,

    /// Address of the remote controller, for instance `"192.168.1.2:22222"`.
    pub remote_addr: String,

    /// If false frames are built but never put on the wire.
    ///
    /// The default value is `true`.
    #[serde(default = "default_true")]
    pub send_enabled: bool,

    /// If false the socket is never read and every receive reports nothing pending.
    ///
    /// The default value is `true`.
    #[serde(default = "default_true")]
    pub recv_enabled: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Invalid socket address {0:?}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),

    #[error("Could not bind the socket to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    #[error("Could not set the socket to non-blocking mode: {0}")]
    NonBlockingError(std::io::Error),

    #[error("Could not send the frame: {0}")]
    SendError(std::io::Error),

    #[error("Only {sent} of {len} bytes were sent")]
    ShortSend { sent: usize, len: usize },

    #[error("Could not receive a datagram: {0}")]
    RecvError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl UdpTransport {
    /// Create a new transport, binding the local socket.
    pub fn new(options: SocketOptions) -> Result<Self, TransportError> {
        let bind = parse_addr(&options.bind_addr)?;
        let remote = parse_addr(&options.remote_addr)?;

        let socket = UdpSocket::bind(bind)
            .map_err(|e| TransportError::BindError(bind, e))?;
        socket.set_nonblocking(true)
            .map_err(TransportError::NonBlockingError)?;

        Ok(Self {
            socket,
            remote,
            options,
        })
    }

    /// The address the socket is actually bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// The remote peer's address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl FrameTransport for UdpTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.options.send_enabled {
            return Ok(());
        }

        let sent = self.socket.send_to(bytes, self.remote)
            .map_err(TransportError::SendError)?;

        if sent != bytes.len() {
            return Err(TransportError::ShortSend {
                sent,
                len: bytes.len(),
            });
        }

        Ok(())
    }

    fn try_receive(&mut self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        if !self.options.recv_enabled {
            return Ok(None);
        }

        match self.socket.recv_from(buf) {
            Ok((len, from)) => {
                trace!("Received {} bytes from {}", len, from);
                Ok(Some(len))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::RecvError(e)),
        }
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:22224".into(),
            remote_addr: "127.0.0.1:22222".into(),
            send_enabled: true,
            recv_enabled: true,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a socket address string.
pub fn parse_addr(addr: &str) -> Result<SocketAddr, TransportError> {
    addr.parse()
        .map_err(|e| TransportError::InvalidAddress(addr.to_string(), e))
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{thread, time::Duration};

    fn pair() -> (UdpTransport, UdpTransport) {
        let mut a = UdpTransport::new(SocketOptions {
            bind_addr: "127.0.0.1:0".into(),
            remote_addr: "127.0.0.1:9".into(),
            ..Default::default()
        }).unwrap();
        let b = UdpTransport::new(SocketOptions {
            bind_addr: "127.0.0.1:0".into(),
            remote_addr: a.local_addr().unwrap().to_string(),
            ..Default::default()
        }).unwrap();
        a.remote = b.local_addr().unwrap();

        (a, b)
    }

    fn receive_within(t: &mut UdpTransport, buf: &mut [u8]) -> Option<usize> {
        for _ in 0..100 {
            if let Some(len) = t.try_receive(buf).unwrap() {
                return Some(len);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_nothing_pending() {
        let (mut a, _b) = pair();
        let mut buf = [0u8; 16];
        assert!(a.try_receive(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_datagram_round_trip() {
        let (mut a, mut b) = pair();
        let mut buf = [0u8; 16];

        b.send(&[1, 2, 3, 4]).unwrap();
        assert_eq!(receive_within(&mut a, &mut buf), Some(4));
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_disabled_switches() {
        let (mut a, mut b) = pair();
        let mut buf = [0u8; 16];

        b.options.send_enabled = false;
        b.send(&[9, 9]).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(a.try_receive(&mut buf).unwrap().is_none());

        b.options.send_enabled = true;
        a.options.recv_enabled = false;
        b.send(&[9, 9]).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(a.try_receive(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_bad_address() {
        let opts = SocketOptions {
            bind_addr: "not an address".into(),
            ..Default::default()
        };
        assert!(matches!(
            UdpTransport::new(opts),
            Err(TransportError::InvalidAddress(_, _))
        ));
    }
}
