//! Keyturner - command-line client for keyturner smart locks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use keyturner::config::{AppConfig, ConfigLoadResult};
use keyturner::flows::Flow;
use keyturner::protocol::{DeviceConfig, KeyturnerStates, LockActionKind, SecurityPin};
use keyturner::store::FileStore;
use keyturner::transport::BtleTransport;
use keyturner::{Error, Result};

/// Pair with and operate keyturner smart locks over Bluetooth LE.
#[derive(Parser)]
#[command(name = "keyturner", version)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lock BLE address (default: active device)
    #[arg(long, short, global = true)]
    device: Option<String>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Also log to a daily rolling file in the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair with a lock that is in pairing mode
    Authorize {
        /// Security PIN (4 or 6 digits), required by 5G locks that have one set
        #[arg(long)]
        pin: Option<SecurityPin>,
    },
    /// Show the lock state
    Status,
    /// Show the lock configuration
    Config,
    /// Lock the door
    Lock {
        /// Appended to this client's name in the lock's activity log
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Unlock the door
    Unlock {
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Unlock and pull the latch
    Unlatch {
        #[arg(long)]
        suffix: Option<String>,
    },
    /// Unlock when locked, otherwise lock
    Toggle,
    /// Show the activity log, newest first
    Logs {
        #[arg(long, default_value_t = 0)]
        start: u32,
        #[arg(long, default_value_t = 10)]
        count: u16,
    },
    /// Set the device used when --device is not given
    Use { device: String },
}

fn init_logging(verbose: bool, log_file: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let (file_layer, guard) = if log_file {
        let dir = ProjectDirs::from("", "", "keyturner")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "keyturner.log"));
        (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file)?;

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    tracing::debug!("Config path: {:?}", config_path);

    let config = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => config,
        ConfigLoadResult::Missing => {
            tracing::info!("No config file, using defaults");
            AppConfig::default()
        }
        ConfigLoadResult::Invalid(e) => {
            return Err(e).with_context(|| format!("Invalid config file {}", config_path.display()));
        }
    };
    let store = FileStore::new(config_path, config.clone());

    if let Command::Use { device } = &cli.command {
        store.set_active_device(device)?;
        println!("active_device: {device}");
        return Ok(());
    }

    let Some(device) = config.resolve_device(cli.device.as_deref()).map(str::to_string) else {
        bail!("No device given: pass --device or set one with `keyturner use <address>`");
    };

    let transport = BtleTransport::new(config.ble.adapter_index).await?;
    let flow = Flow::new(&transport, &store).with_scan_timeout(Duration::from_secs(config.ble.scan_timeout_secs));

    match cli.command {
        Command::Authorize { pin } => {
            let context = flow.authorize(&device, &config.client.name, pin).await?;
            println!("device: {device}");
            println!("auth_id: {}", context.auth_id_value());
            if store.config()?.active_device.is_none() {
                store.set_active_device(&device)?;
            }
        }
        Command::Status => print_status(&flow.get_status(&device).await?),
        Command::Config => print_config(&flow.get_config(&device).await?),
        Command::Lock { suffix } => lock_action(&flow, &device, LockActionKind::Lock, suffix).await?,
        Command::Unlock { suffix } => lock_action(&flow, &device, LockActionKind::Unlock, suffix).await?,
        Command::Unlatch { suffix } => lock_action(&flow, &device, LockActionKind::Unlatch, suffix).await?,
        Command::Toggle => {
            let action = flow.toggle(&device).await?;
            println!("action: {action}");
            println!("status: complete");
        }
        Command::Logs { start, count } => match flow.get_logs(&device, start, count).await {
            Ok(entries) => entries.iter().for_each(|entry| println!("{entry}")),
            Err(Error::LogStreamInterrupted { received, source }) => {
                received.iter().for_each(|entry| println!("{entry}"));
                return Err(*source).context(format!("Log retrieval stopped after {} entries", received.len()));
            }
            Err(e) => return Err(e.into()),
        },
        Command::Use { .. } => {}
    }
    Ok(())
}

async fn lock_action(
    flow: &Flow<'_, BtleTransport, FileStore>,
    device: &str,
    action: LockActionKind,
    suffix: Option<String>,
) -> Result<()> {
    flow.perform_lock_action(device, action, suffix).await?;
    println!("action: {action}");
    println!("status: complete");
    Ok(())
}

fn print_status(states: &KeyturnerStates) {
    println!("device_state: {}", states.device_state);
    println!("lock_state: {}", states.lock_state);
    println!("trigger: {}", states.trigger);
    println!("current_time: {}", states.current_time);
    println!("timezone_offset: {}", states.timezone_offset);
    println!("battery: {}%", states.battery.percentage);
    println!("battery_charging: {}", states.battery.charging);
    println!("battery_critical: {}", states.battery.critical);
    println!("last_lock_action: {}", states.last_lock_action);
    println!("last_lock_action_trigger: {}", states.last_lock_action_trigger);
    println!("last_lock_action_completion: {}", states.last_lock_action_completion);
    println!("door_sensor: {}", states.door_sensor);
    println!("nightmode_active: {}", states.nightmode_active);
    println!("remote_access: {}", states.remote_access);
    println!("ble_strength: {}", states.ble_strength);
}

fn print_config(config: &DeviceConfig) {
    println!("name: {}", config.name);
    println!("nuki_id: {}", config.device_id_hex());
    println!("firmware: {}", config.firmware_string());
    println!("hardware: {}", config.hardware_string());
    println!("latitude: {}", config.latitude);
    println!("longitude: {}", config.longitude);
    println!("current_time: {}", config.current_time);
    println!("timezone: {}", config.timezone_name().unwrap_or("unknown"));
    println!("timezone_offset: {}", config.timezone_offset);
    println!("auto_unlatch: {}", config.auto_unlatch);
    println!("pairing_enabled: {}", config.pairing_enabled);
    println!("button_enabled: {}", config.button_enabled);
    println!("led_enabled: {}", config.led_enabled);
    println!("single_lock: {}", config.single_lock);
    println!("has_fob: {}", config.has_fob);
    println!("has_keypad: {}", config.has_keypad);
}
