//! [`ActuatorLink`] implementation for Kondo ICS serial servos
//!
//! Every transaction is a three byte request followed by a three byte reply carrying the
//! servo's current position. Buses wired with a shared TX/RX line read back their own request
//! first, which is discarded when `echo` is set.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use util::maths::clamp;

use super::{ActuatorLink, BusPort, BusType, ServoConfig, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Native position of the centre of travel.
pub const ICS_CENTRE: f64 = 7500.0;

/// Lowest native position accepted.
pub const ICS_MIN: f64 = 3500.0;

/// Highest native position accepted.
pub const ICS_MAX: f64 = 11500.0;

/// Native units per degree.
pub const ICS_UNITS_PER_DEG: f64 = 29.6296;

/// Position value which releases the servo instead of moving it.
const ICS_RELEASE_POS: u16 = 0;

/// Length of a request or reply.
const ICS_MSG_LEN: usize = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A bank of ICS servos on one serial port.
pub struct IcsLink<P> {
    port: P,

    /// Discard a loopback copy of each request before the reply
    echo: bool,

    buf: [u8; ICS_MSG_LEN * 2],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P: BusPort> IcsLink<P> {
    pub fn new(port: P, echo: bool) -> Self {
        Self {
            port,
            echo,
            buf: [0u8; ICS_MSG_LEN * 2],
        }
    }

    /// Send one position request and return the position the servo replies with.
    fn transact(&mut self, addr: u8, pos: u16) -> Result<u16, ServoError> {
        let request = encode_request(addr, pos);
        let reply_len = if self.echo { ICS_MSG_LEN * 2 } else { ICS_MSG_LEN };

        let n = self.port.transact(&request, &mut self.buf[..reply_len])?;

        if n == 0 {
            return Err(ServoError::NoReply(addr));
        }
        if n < reply_len {
            return Err(ServoError::ShortReply { addr, len: n });
        }

        let reply = &self.buf[reply_len - ICS_MSG_LEN..reply_len];
        trace!("ICS {:02x?} -> {:02x?}", request, reply);

        decode_reply(addr, reply)
    }
}

impl<P: BusPort> ActuatorLink for IcsLink<P> {
    fn bus_type(&self) -> BusType {
        BusType::KondoIcs
    }

    fn set_position(&mut self, config: &ServoConfig, deg: f64) -> Result<f64, ServoError> {
        let pos = self.transact(config.address, deg_to_native(deg, config))?;
        Ok(native_to_deg(pos, config))
    }

    fn release(&mut self, config: &ServoConfig, _current_deg: f64) -> Result<f64, ServoError> {
        let pos = self.transact(config.address, ICS_RELEASE_POS)?;
        Ok(native_to_deg(pos, config))
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a demanded angle into the servo's native position.
pub fn deg_to_native(deg: f64, config: &ServoConfig) -> u16 {
    let raw = ICS_CENTRE 
        + ((config.trim_deg + deg * config.sign_f64()) * ICS_UNITS_PER_DEG).round();

    clamp(&raw, &ICS_MIN, &ICS_MAX) as u16
}

/// Convert a native position reported by the servo back into a demand angle.
pub fn native_to_deg(native: u16, config: &ServoConfig) -> f64 {
    ((native as f64 - ICS_CENTRE) / ICS_UNITS_PER_DEG - config.trim_deg) * config.sign_f64()
}

/// Build a position request.
pub fn encode_request(addr: u8, pos: u16) -> [u8; ICS_MSG_LEN] {
    [
        0x80 | (addr & 0x1F),
        ((pos >> 7) & 0x7F) as u8,
        (pos & 0x7F) as u8,
    ]
}

/// Check a reply against the address it answers and extract the position.
pub fn decode_reply(addr: u8, reply: &[u8]) -> Result<u16, ServoError> {
    if reply.len() < ICS_MSG_LEN {
        return Err(ServoError::ShortReply { addr, len: reply.len() });
    }

    let expected = (0x80 | (addr & 0x1F)) & 0x7F;
    if reply[0] != expected {
        return Err(ServoError::MismatchedReply { addr, byte: reply[0] });
    }

    Ok((((reply[1] & 0x7F) as u16) << 7) | (reply[2] & 0x7F) as u16)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    /// Port which answers each request with the next scripted reply and records what it was sent.
    struct ScriptedPort {
        replies: VecDeque<Vec<u8>>,
        requests: Vec<Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into(),
                requests: Vec::new(),
            }
        }
    }

    impl BusPort for ScriptedPort {
        fn transact(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, ServoError> {
            self.requests.push(request.to_vec());
            let next = self.replies.pop_front().unwrap_or_default();
            let n = next.len().min(reply.len());
            reply[..n].copy_from_slice(&next[..n]);
            Ok(n)
        }
    }

    fn config(address: u8, sign: i8, trim_deg: f64) -> ServoConfig {
        ServoConfig { mounted: true, address, sign, trim_deg }
    }

    fn reply_for(addr: u8, pos: u16) -> Vec<u8> {
        let r = encode_request(addr, pos);
        vec![r[0] & 0x7F, r[1], r[2]]
    }

    #[test]
    fn test_native_conversion() {
        let c = config(0, 1, 0.0);
        assert_eq!(deg_to_native(0.0, &c), 7500);
        assert_eq!(deg_to_native(90.0, &c), 10167);
        assert_eq!(deg_to_native(-90.0, &c), 4833);

        // Clamped to the servo's travel
        assert_eq!(deg_to_native(500.0, &c), 11500);
        assert_eq!(deg_to_native(-500.0, &c), 3500);

        // Sign and trim
        let c = config(0, -1, 2.0);
        assert_eq!(deg_to_native(10.0, &c), (7500.0 + (-8.0 * ICS_UNITS_PER_DEG).round()) as u16);
        assert!((native_to_deg(deg_to_native(10.0, &c), &c) - 10.0).abs() < 0.05);
    }

    #[test]
    fn test_encode_request() {
        assert_eq!(encode_request(3, 7500), [0x83, 0x3A, 0x4C]);
        assert_eq!(encode_request(0x25, 0), [0x85, 0x00, 0x00]);
    }

    #[test]
    fn test_decode_reply() {
        assert_eq!(decode_reply(3, &[0x03, 0x3A, 0x4C]).unwrap(), 7500);
        assert!(matches!(
            decode_reply(3, &[0x04, 0x3A, 0x4C]),
            Err(ServoError::MismatchedReply { addr: 3, byte: 0x04 })
        ));
        assert!(matches!(
            decode_reply(3, &[0x03]),
            Err(ServoError::ShortReply { addr: 3, len: 1 })
        ));
    }

    #[test]
    fn test_set_position() {
        let c = config(5, 1, 0.0);
        let port = ScriptedPort::new(vec![reply_for(5, deg_to_native(30.0, &c))]);
        let mut link = IcsLink::new(port, false);

        let applied = link.set_position(&c, 30.0).unwrap();
        assert!((applied - 30.0).abs() < 0.05);
        assert_eq!(link.port.requests, vec![encode_request(5, deg_to_native(30.0, &c)).to_vec()]);
    }

    #[test]
    fn test_release_with_echo() {
        let c = config(1, 1, 0.0);
        let mut reply = encode_request(1, 0).to_vec();
        reply.extend(reply_for(1, 7500));
        let mut link = IcsLink::new(ScriptedPort::new(vec![reply]), true);

        assert_eq!(link.release(&c, 45.0).unwrap(), 0.0);
        assert_eq!(link.port.requests[0], vec![0x81, 0x00, 0x00]);
    }

    #[test]
    fn test_comm_failures() {
        let c = config(2, 1, 0.0);
        let mut link = IcsLink::new(ScriptedPort::new(vec![vec![], vec![0x02, 0x3A]]), false);

        assert!(matches!(link.set_position(&c, 0.0), Err(ServoError::NoReply(2))));
        assert!(matches!(
            link.set_position(&c, 0.0),
            Err(ServoError::ShortReply { addr: 2, len: 2 })
        ));
    }
}
