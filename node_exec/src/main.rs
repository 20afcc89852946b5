//! # Node Control Executable
//!
//! This executable runs the control core of an actuation node:
//! - Receives one state frame per cycle from the remote controller and sends one back
//! - Acts on the master commands the remote sends
//! - Drives the two banks of serial bus servos

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{path::PathBuf, time::Duration};
use color_eyre::{Result, eyre::{eyre, WrapErr}};
use comms_if::{frame::Bank, net::UdpTransport};
use log::{error, info};

// Internal
use node_lib::{
    actuator::{ActuatorBank, Banks},
    control_loop::ControlLoop,
    inputs::SensorInputs,
    params::NodeExecParams,
    scheduler::{StdDelay, TickCounter, TickTimer},
    servo_ctrl::open_link,
    settings::{
        apply_boot_settings, JsonSettingsStore, MemorySettingsStore, SettingsSnapshot,
        SettingsStore
    },
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "node_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Node Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let mut params: NodeExecParams = util::params::load("node_exec.toml")
        .wrap_err("Failed to load the parameters")?;

    if let Err(e) = params.validate() {
        error!("Invalid configuration, not starting: {}", e);
        return Err(e).wrap_err("Parameter validation failed");
    }

    info!("Parameters loaded");

    // ---- SETTINGS ----

    let default_settings = SettingsSnapshot::from_channel_table(
        &params.left.channels,
        &params.right.channels
    );

    let mut settings: Box<dyn SettingsStore> = if params.settings.path.is_empty() {
        info!("No settings path given, settings are held in memory");
        Box::new(MemorySettingsStore::new(default_settings, params.settings.write_protect))
    }
    else {
        let path = settings_path(&params.settings.path)?;
        info!("Settings file: {:?}", path);
        Box::new(JsonSettingsStore::new(path, params.settings.write_protect, default_settings))
    };

    apply_boot_settings(&mut params, settings.as_mut())
        .wrap_err("Failed to apply the stored settings")?;

    // ---- ACTUATORS ----

    let mut banks = Vec::with_capacity(2);
    for &side in Bank::ALL.iter() {
        let bank = params.bank(side);
        let link = open_link(bank)
            .wrap_err_with(|| format!("Failed to open the {:?} bank", side))?;

        info!(
            "{:?} bank: {:?} bus, {} channels ({} mounted)",
            side,
            link.bus_type(),
            bank.channels.len(),
            bank.channels.iter().filter(|c| c.mounted).count()
        );

        banks.push(ActuatorBank::new(side, &bank.channels, link));
    }
    let right = banks.pop().ok_or_else(|| eyre!("Right bank missing"))?;
    let left = banks.pop().ok_or_else(|| eyre!("Left bank missing"))?;

    // ---- NETWORK ----

    let transport = UdpTransport::new(params.net.clone())
        .wrap_err("Failed to initialise the frame transport")?;

    info!(
        "Frame transport bound on {:?}, remote {}",
        transport.local_addr(),
        transport.remote_addr()
    );

    // ---- TICK SOURCE ----

    let ticks = TickCounter::new();
    let _timer = TickTimer::start(Duration::from_millis(params.cycle_period_ms), ticks.clone());

    // ---- MAIN LOOP ----

    let mut control = ControlLoop::new(
        &params,
        transport,
        Banks::new(left, right),
        settings,
        SensorInputs::none(),
        ticks,
        Box::new(StdDelay),
    );

    info!("Initialisation complete, entering main loop");

    control.run()
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Resolve the settings path, taking relative paths from the software root.
fn settings_path(path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);

    if path.is_absolute() {
        return Ok(path);
    }

    Ok(host::get_sw_root().wrap_err("Software root not set")?.join(path))
}
