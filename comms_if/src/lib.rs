//! # Communications interface crate.
//!
//! Provides the wire contract shared by the actuation node and its remote controller: the fixed
//! layout state frame, its integrity protocol, the command identifiers carried inside it, and the
//! datagram transport that moves it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// The fixed layout state frame exchanged every cycle
pub mod frame;

/// Sequence counter validation
pub mod seq;

/// Command identifiers carried in the frame's master slot
pub mod cmd;

/// Status bitfield and channel fault codes
pub mod status;

/// Datagram transport
pub mod net;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use frame::{WireFrame, FrameError, FRAME_LEN, FRAME_BYTES};
pub use seq::{SequenceTracker, SeqOutcome};
pub use cmd::{MasterCommand, SettingsSlot};
pub use status::{StatusBits, FaultCode};
pub use net::{FrameTransport, TransportError, UdpTransport, SocketOptions};
