//! # Node library.
//!
//! The control core of the actuation node. This library allows the executable and the tests to
//! access the items defined inside the node crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuator channels and banks, with communication fault accounting
pub mod actuator;

/// Control loop - runs one full frame cycle back to back
pub mod control_loop;

/// Command dispatcher - the three ordered command phases of a cycle
pub mod dispatch;

/// Frame server - bounded receive and send of frames over the datagram transport
pub mod frame_server;

/// Sensor and input device snapshots, and their merge into the frame
pub mod inputs;

/// Per cycle motion limiting
pub mod motion;

/// Parameters for the node executable
pub mod params;

/// Cycle pacing against the tick source
pub mod scheduler;

/// Drivers used to control servos
pub mod servo_ctrl;

/// Persistent settings store
pub mod settings;

/// Control flags and fault counters
pub mod state;

/// Shared test fixtures
#[cfg(test)]
pub(crate) mod testing;
