//! # Settings Store
//!
//! Persistent settings are held as three whole frames, one per [`SettingsSlot`]. The servo slot
//! carries the channel table in the bank region of the frame: for each channel the command slot
//! holds a config word and the target slot holds the trim in hundredths of a degree.
//!
//! Config word layout:
//!
//! | Bits  | Meaning               |
//! |-------|-----------------------|
//! | 0     | mounted               |
//! | 1     | reversed rotation     |
//! | 2..=7 | bus address           |

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};
use comms_if::{cmd::SettingsSlot, frame::{Bank, WireFrame}};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{params::NodeExecParams, servo_ctrl::ServoConfig};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Persistent storage for a [`SettingsSnapshot`].
pub trait SettingsStore: Send {
    fn load(&self) -> Result<SettingsSnapshot, SettingsError>;

    fn write(&mut self, snapshot: &SettingsSnapshot) -> Result<(), SettingsError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The full contents of the settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub board: WireFrame,
    pub servo: WireFrame,
    pub user: WireFrame,
}

/// Settings persisted as a JSON file.
pub struct JsonSettingsStore {
    path: PathBuf,

    write_protect: bool,

    /// Snapshot returned while the file does not exist
    default: SettingsSnapshot,
}

/// Settings held in memory only, lost when the node stops.
#[derive(Debug, Clone)]
pub struct MemorySettingsStore {
    snapshot: SettingsSnapshot,

    write_protect: bool,

    writes: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("The settings store is write protected")]
    Protected,

    #[error("Could not access the settings file {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Could not (de)serialise the settings file {0:?}: {1}")]
    Serde(PathBuf, serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SettingsSnapshot {
    /// A snapshot whose servo slot holds the given channel tables.
    pub fn from_channel_table(left: &[ServoConfig], right: &[ServoConfig]) -> Self {
        Self {
            board: WireFrame::default(),
            servo: encode_servo_slot(left, right),
            user: WireFrame::default(),
        }
    }

    pub fn slot(&self, slot: SettingsSlot) -> &WireFrame {
        match slot {
            SettingsSlot::Board => &self.board,
            SettingsSlot::Servo => &self.servo,
            SettingsSlot::User => &self.user,
        }
    }
}

impl JsonSettingsStore {
    pub fn new<P: AsRef<Path>>(path: P, write_protect: bool, default: SettingsSnapshot) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_protect,
            default,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<SettingsSnapshot, SettingsError> {
        if !self.path.exists() {
            debug!("No settings file at {:?}, using defaults", self.path);
            return Ok(self.default.clone());
        }

        let file = fs::File::open(&self.path)
            .map_err(|e| SettingsError::Io(self.path.clone(), e))?;

        serde_json::from_reader(file)
            .map_err(|e| SettingsError::Serde(self.path.clone(), e))
    }

    fn write(&mut self, snapshot: &SettingsSnapshot) -> Result<(), SettingsError> {
        if self.write_protect {
            return Err(SettingsError::Protected);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SettingsError::Io(self.path.clone(), e))?;
        }

        // Written beside the store and renamed over it, so a crash never leaves a partial file
        let tmp = self.temp_path();
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp)
            .map_err(|e| SettingsError::Io(tmp.clone(), e))?;

        serde_json::to_writer_pretty(&file, snapshot)
            .map_err(|e| SettingsError::Serde(tmp.clone(), e))?;
        file.sync_all()
            .map_err(|e| SettingsError::Io(tmp.clone(), e))?;

        fs::rename(&tmp, &self.path)
            .map_err(|e| SettingsError::Io(self.path.clone(), e))?;

        info!("Settings written to {:?}", self.path);

        Ok(())
    }
}

impl MemorySettingsStore {
    pub fn new(snapshot: SettingsSnapshot, write_protect: bool) -> Self {
        Self {
            snapshot,
            write_protect,
            writes: 0,
        }
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<SettingsSnapshot, SettingsError> {
        Ok(self.snapshot.clone())
    }

    fn write(&mut self, snapshot: &SettingsSnapshot) -> Result<(), SettingsError> {
        if self.write_protect {
            return Err(SettingsError::Protected);
        }

        self.snapshot = snapshot.clone();
        self.writes += 1;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Encode a channel's static configuration into a config word.
pub fn encode_config_word(config: &ServoConfig) -> u16 {
    (config.mounted as u16)
        | ((config.sign < 0) as u16) << 1
        | ((config.address & 0x3F) as u16) << 2
}

/// Decode a config word and its trim.
pub fn decode_config_word(word: u16, trim_deg: f64) -> ServoConfig {
    ServoConfig {
        mounted: word & 0x01 != 0,
        address: ((word >> 2) & 0x3F) as u8,
        sign: if word & 0x02 != 0 { -1 } else { 1 },
        trim_deg,
    }
}

/// Build a servo settings frame from both channel tables.
pub fn encode_servo_slot(left: &[ServoConfig], right: &[ServoConfig]) -> WireFrame {
    let mut frame = WireFrame::default();

    for &(side, configs) in [(Bank::Left, left), (Bank::Right, right)].iter() {
        for (i, config) in configs.iter().enumerate() {
            frame.set_slot_u16(side.command_slot(i), encode_config_word(config));
            frame.set_target_deg(side, i, config.trim_deg);
        }
    }

    frame.write_checksum();
    frame
}

/// Read `count` channels of one bank from a servo settings frame.
pub fn decode_servo_slot(frame: &WireFrame, side: Bank, count: usize) -> Vec<ServoConfig> {
    (0..count)
        .map(|i| decode_config_word(frame.slot_u16(side.command_slot(i)), frame.target_deg(side, i)))
        .collect()
}

/// Seed the store from the parameter channel tables and/or override the tables from the store,
/// as the settings parameters request.
pub fn apply_boot_settings(
    params: &mut NodeExecParams,
    store: &mut dyn SettingsStore
) -> Result<(), SettingsError> {
    if params.settings.write_at_boot {
        store.write(&SettingsSnapshot::from_channel_table(
            &params.left.channels, 
            &params.right.channels
        ))?;
        info!("Settings store seeded from the channel tables");
    }

    if params.settings.load_at_boot {
        let snapshot = store.load()?;

        for &side in Bank::ALL.iter() {
            let bank = params.bank_mut(side);
            bank.channels = decode_servo_slot(&snapshot.servo, side, bank.channels.len());
        }
        info!("Channel tables loaded from the settings store");
    }

    Ok(())
}
