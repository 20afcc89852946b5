//! # Frame Server Module
//!
//! This module abstracts over the networking side of the node. Each cycle the server waits a
//! bounded time for one frame from the remote controller, and sends one frame back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    thread,
    time::{Duration, Instant},
};
use comms_if::{
    frame::{WireFrame, FRAME_BYTES},
    net::{FrameTransport, TransportError},
};
use log::trace;

use crate::params::NodeExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the node.
pub struct FrameServer<T> {
    transport: T,

    /// Longest wait for an inbound frame
    recv_timeout: Duration,

    /// Interval between polls of the transport
    poll_interval: Duration,

    /// Datagram buffer, one byte longer than a frame so oversized datagrams are detected
    buf: [u8; FRAME_BYTES + 1],
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Result of one bounded receive.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A frame of the right length. Its checksum has not been checked.
    Received(WireFrame),

    /// A datagram of the wrong length, given in bytes
    Malformed(usize),

    /// Nothing arrived before the timeout
    Timeout,

    /// The transport failed
    Failed(TransportError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: FrameTransport> FrameServer<T> {

    /// Create a new server over the given transport.
    pub fn new(transport: T, params: &NodeExecParams) -> Self {
        Self::with_timing(
            transport,
            Duration::from_millis(params.recv_timeout_ms),
            Duration::from_micros(params.recv_poll_us)
        )
    }

    pub fn with_timing(transport: T, recv_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            transport,
            recv_timeout,
            poll_interval,
            buf: [0u8; FRAME_BYTES + 1],
        }
    }

    /// Wait up to the receive timeout for one datagram.
    pub fn receive(&mut self) -> RecvOutcome {
        let start = Instant::now();

        loop {
            match self.transport.try_receive(&mut self.buf) {
                Ok(Some(len)) if len == FRAME_BYTES => {
                    return match WireFrame::from_bytes(&self.buf[..len]) {
                        Ok(f) => RecvOutcome::Received(f),
                        Err(_) => RecvOutcome::Malformed(len)
                    };
                },
                Ok(Some(len)) => return RecvOutcome::Malformed(len),
                Ok(None) => (),
                Err(e) => return RecvOutcome::Failed(e)
            }

            if start.elapsed() >= self.recv_timeout {
                trace!("No frame within {:?}", self.recv_timeout);
                return RecvOutcome::Timeout;
            }

            thread::sleep(self.poll_interval);
        }
    }

    /// Send a frame to the remote controller.
    pub fn send(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        self.transport.send(frame.as_bytes())
    }
}
