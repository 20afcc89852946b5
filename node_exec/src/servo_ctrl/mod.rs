//! # Servo Controller Module
//!
//! This module provides a unified interface over the serial buses which carry actuator commands.
//! Each bank of actuators talks through one [`ActuatorLink`]; the bus type named in the parameters
//! selects the implementation. Bus types without an implementation fail fast with
//! [`ServoError::Unsupported`] so a misconfigured node never starts.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ActuatorLink`] implementation for Kondo ICS serial servos.
pub mod ics;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::{ErrorKind, Read, Write},
    time::Duration,
};
use log::info;
use serde::{Serialize, Deserialize};

use crate::params::BankParams;
pub use ics::IcsLink;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for driving actuators over a bus.
pub trait ActuatorLink: Send {

    /// The bus type this link talks over.
    fn bus_type(&self) -> BusType;

    /// Command a position and return the angle the actuator reports back.
    ///
    /// ## Arguments
    /// - `config` - The static configuration of the channel (address, rotation sign, trim)
    /// - `deg` - The demanded angle in degrees, before sign and trim are applied
    fn set_position(&mut self, config: &ServoConfig, deg: f64) -> Result<f64, ServoError>;

    /// Release the actuator (torque off) and return the angle it reports back.
    ///
    /// `current_deg` is the last known angle, used by links which cannot measure.
    fn release(&mut self, config: &ServoConfig, current_deg: f64) -> Result<f64, ServoError>;
}

/// A half-duplex byte transport to a servo bus.
pub trait BusPort: Send {

    /// Write `request` and read up to `reply.len()` bytes of reply, returning the number read.
    ///
    /// Running out of time before the reply buffer is full is not an error; the short count is
    /// returned and interpreted by the caller.
    fn transact(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, ServoError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Static configuration of one actuator channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ServoConfig {
    /// Whether an actuator is fitted on this channel
    pub mounted: bool,

    /// Address of the actuator on its bus
    #[serde(default)]
    pub address: u8,

    /// Rotation sign, `1` or `-1`
    #[serde(default = "default_sign")]
    pub sign: i8,

    /// Static offset applied before the sign, in degrees
    #[serde(default)]
    pub trim_deg: f64,
}

/// [`BusPort`] over any blocking byte device with a read timeout, for instance an open serial
/// port. A read which times out ends the transaction with the bytes received so far.
pub struct IoPort<D> {
    device: D,
}

/// Link for a bank with nothing fitted. Commands are accepted and echoed without any bus traffic.
pub struct NullLink;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Actuator bus protocols, with their wire codes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusType {
    None,
    Pwm,
    Pca9685,
    FutabaRs,
    Dynamixel1,
    Dynamixel2,
    KondoIcs,
    KondoPmx,
    JrXbus,
    FeetechSts,
    FeetechScs,
}

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("The {0:?} bus is not supported")]
    Unsupported(BusType),

    #[error("Could not open the bus device {0:?}: {1}")]
    OpenError(String, std::io::Error),

    #[error("Bus I/O error: {0}")]
    Io(std::io::Error),

    #[error("No reply from the servo at address {0}")]
    NoReply(u8),

    #[error("Short reply from the servo at address {addr} ({len} bytes)")]
    ShortReply { addr: u8, len: usize },

    #[error("Reply from the servo at address {addr} did not match the request (found {byte:#04x})")]
    MismatchedReply { addr: u8, byte: u8 },

    #[cfg(all(target_arch = "arm", target_os = "linux", target_env = "gnu"))]
    #[error("UART error: {0}")]
    Uart(rppal::uart::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BusType {
    /// Wire code of this bus type.
    pub fn code(&self) -> u8 {
        match self {
            BusType::None => 0,
            BusType::Pwm => 1,
            BusType::Pca9685 => 11,
            BusType::FutabaRs => 21,
            BusType::Dynamixel1 => 31,
            BusType::Dynamixel2 => 32,
            BusType::KondoIcs => 43,
            BusType::KondoPmx => 44,
            BusType::JrXbus => 51,
            BusType::FeetechSts => 61,
            BusType::FeetechScs => 62,
        }
    }

    /// Decode a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        [
            BusType::None,
            BusType::Pwm,
            BusType::Pca9685,
            BusType::FutabaRs,
            BusType::Dynamixel1,
            BusType::Dynamixel2,
            BusType::KondoIcs,
            BusType::KondoPmx,
            BusType::JrXbus,
            BusType::FeetechSts,
            BusType::FeetechScs,
        ]
        .iter()
        .copied()
        .find(|b| b.code() == code)
    }
}

impl Default for BusType {
    fn default() -> Self {
        BusType::None
    }
}

impl ServoConfig {
    /// A channel with nothing fitted.
    pub fn unmounted() -> Self {
        Self {
            mounted: false,
            address: 0,
            sign: 1,
            trim_deg: 0.0,
        }
    }

    /// The rotation sign as a float.
    pub fn sign_f64(&self) -> f64 {
        if self.sign < 0 { -1.0 } else { 1.0 }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self::unmounted()
    }
}

impl<D> IoPort<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }
}

impl<D> BusPort for IoPort<D>
where
    D: Read + Write + Send
{
    fn transact(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, ServoError> {
        self.device.write_all(request).map_err(ServoError::Io)?;
        self.device.flush().map_err(ServoError::Io)?;

        let mut read = 0;
        while read < reply.len() {
            match self.device.read(&mut reply[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => 
                    break,
                Err(e) => return Err(ServoError::Io(e))
            }
        }

        Ok(read)
    }
}

#[cfg(all(target_arch = "arm", target_os = "linux", target_env = "gnu"))]
impl BusPort for rppal::uart::Uart {
    fn transact(&mut self, request: &[u8], reply: &mut [u8]) -> Result<usize, ServoError> {
        self.write(request).map_err(ServoError::Uart)?;
        self.drain().map_err(ServoError::Uart)?;

        let mut read = 0;
        while read < reply.len() {
            match self.read(&mut reply[read..]).map_err(ServoError::Uart)? {
                0 => break,
                n => read += n
            }
        }

        Ok(read)
    }
}

impl ActuatorLink for NullLink {
    fn bus_type(&self) -> BusType {
        BusType::None
    }

    fn set_position(&mut self, _config: &ServoConfig, deg: f64) -> Result<f64, ServoError> {
        Ok(deg)
    }

    fn release(&mut self, _config: &ServoConfig, current_deg: f64) -> Result<f64, ServoError> {
        Ok(current_deg)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the link for one bank of actuators.
pub fn open_link(params: &BankParams) -> Result<Box<dyn ActuatorLink>, ServoError> {
    match params.bus {
        BusType::None => Ok(Box::new(NullLink)),
        BusType::KondoIcs => {
            let port = open_port(params)?;
            info!("Opened {:?} bus on {}", params.bus, params.device);
            Ok(Box::new(IcsLink::new(port, params.echo)))
        },
        other => Err(ServoError::Unsupported(other))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_sign() -> i8 {
    1
}

/// Open the bank's UART through the peripheral library.
#[cfg(all(target_arch = "arm", target_os = "linux", target_env = "gnu"))]
fn open_port(params: &BankParams) -> Result<rppal::uart::Uart, ServoError> {
    use rppal::uart::{Parity, Uart};

    let mut uart = Uart::with_path(&params.device, params.baud, Parity::Even, 8, 1)
        .map_err(ServoError::Uart)?;
    uart.set_read_mode(0, Duration::from_millis(params.reply_timeout_ms))
        .map_err(ServoError::Uart)?;

    Ok(uart)
}

/// Open the bank's tty through the serial port library, with the bus line settings and the reply
/// timeout applied so a silent servo ends the transaction.
#[cfg(not(all(target_arch = "arm", target_os = "linux", target_env = "gnu")))]
fn open_port(params: &BankParams) -> Result<IoPort<Box<dyn serialport::SerialPort>>, ServoError> {
    let port = serialport::new(&params.device, params.baud)
        .parity(serialport::Parity::Even)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .timeout(Duration::from_millis(params.reply_timeout_ms))
        .open()
        .map_err(|e| ServoError::OpenError(params.device.clone(), e.into()))?;

    Ok(IoPort::new(port))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    /// A device which reads back a fixed buffer and swallows writes.
    struct Loopback {
        written: Vec<u8>,
        to_read: Cursor<Vec<u8>>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.to_read.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bus_codes() {
        for code in 0..=u8::MAX {
            if let Some(bus) = BusType::from_code(code) {
                assert_eq!(bus.code(), code);
            }
        }
        assert_eq!(BusType::from_code(43), Some(BusType::KondoIcs));
        assert_eq!(BusType::from_code(2), None);
    }

    #[test]
    fn test_unsupported_bus() {
        let params = BankParams {
            bus: BusType::Dynamixel2,
            ..Default::default()
        };
        assert!(matches!(
            open_link(&params),
            Err(ServoError::Unsupported(BusType::Dynamixel2))
        ));
    }

    #[test]
    fn test_null_link() {
        let mut link = open_link(&BankParams::default()).unwrap();
        let config = ServoConfig::unmounted();
        assert_eq!(link.bus_type(), BusType::None);
        assert_eq!(link.set_position(&config, 12.5).unwrap(), 12.5);
        assert_eq!(link.release(&config, 3.0).unwrap(), 3.0);
    }

    #[test]
    fn test_io_port_short_read() {
        let mut port = IoPort::new(Loopback {
            written: Vec::new(),
            to_read: Cursor::new(vec![1, 2]),
        });

        let mut reply = [0u8; 3];
        assert_eq!(port.transact(&[9, 8, 7], &mut reply).unwrap(), 2);
        assert_eq!(&reply[..2], &[1, 2]);
        assert_eq!(port.device.written, vec![9, 8, 7]);
    }

    /// A device which accepts writes and never answers, timing out every read.
    struct Silent {
        reads: usize,
    }

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            Err(std::io::Error::new(ErrorKind::TimedOut, "Operation timed out"))
        }
    }

    impl Write for Silent {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_silent_servo_is_a_failure() {
        let mut link = IcsLink::new(IoPort::new(Silent { reads: 0 }), false);
        let config = ServoConfig {
            mounted: true,
            address: 4,
            ..ServoConfig::unmounted()
        };

        assert!(matches!(link.set_position(&config, 10.0), Err(ServoError::NoReply(4))));
        assert!(matches!(link.release(&config, 10.0), Err(ServoError::NoReply(4))));
    }

    #[test]
    fn test_io_port_read_timeout() {
        let mut port = IoPort::new(Silent { reads: 0 });
        let mut reply = [0u8; 3];
        assert_eq!(port.transact(&[1, 2, 3], &mut reply).unwrap(), 0);
        assert_eq!(port.device.reads, 1);
    }

    #[cfg(not(all(target_arch = "arm", target_os = "linux", target_env = "gnu")))]
    #[test]
    fn test_open_missing_device() {
        let params = BankParams {
            bus: BusType::KondoIcs,
            device: String::from("/dev/node-exec-no-such-tty"),
            reply_timeout_ms: 2,
            ..Default::default()
        };
        assert!(matches!(open_link(&params), Err(ServoError::OpenError(_, _))));
    }
}
