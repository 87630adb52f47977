mod alarm;
mod api;
mod clock;
mod config;
mod console;
mod diagnostics;
mod dst;
mod input;
mod link;
mod logging;
mod sntp;
mod time_provider;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueEnum};
use log::{LevelFilter, info};

use crate::alarm::scheduler::AlarmSchedule;
use crate::alarm::sounds::{AlarmSoundLibrary, LogBuzzer};
use crate::alarm::storage::{FileStorage, LoadOutcome};
use crate::api::PortalConfig;
use crate::clock::{ClockModel, ClockSettings};
use crate::config::{DeviceConfig, load_device_config};
use crate::console::ConsoleInput;
use crate::diagnostics::DiagnosticsInput;
use crate::dst::DstRule;
use crate::input::{ConfirmButton, DebounceSettings, EncoderInput};
use crate::link::{HostLink, WifiCredentials};
use crate::time_provider::{MonotonicTicks, SntpSettings, TimingSourceKind, select_source};
use crate::ui::app::{DeviceApp, DeviceSettings, Peripherals};
use crate::ui::display::TerminalDisplay;

const LINK_RETRY_DELAY: Duration = Duration::from_millis(500);
const CONSOLE_STEP_GAP: Duration = Duration::from_millis(120);

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliTimingSource {
    Auto,
    System,
    Sntp,
}

impl From<CliTimingSource> for TimingSourceKind {
    fn from(value: CliTimingSource) -> Self {
        match value {
            CliTimingSource::Auto => TimingSourceKind::Auto,
            CliTimingSource::System => TimingSourceKind::System,
            CliTimingSource::Sntp => TimingSourceKind::Sntp,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliDstRule {
    Off,
    Literal,
    Bounded,
}

impl From<CliDstRule> for DstRule {
    fn from(value: CliDstRule) -> Self {
        match value {
            CliDstRule::Off => DstRule::Off,
            CliDstRule::Literal => DstRule::Literal,
            CliDstRule::Bounded => DstRule::Bounded,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LevelFilter {
    fn from(value: CliLogLevel) -> Self {
        match value {
            CliLogLevel::Off => LevelFilter::Off,
            CliLogLevel::Error => LevelFilter::Error,
            CliLogLevel::Warn => LevelFilter::Warn,
            CliLogLevel::Info => LevelFilter::Info,
            CliLogLevel::Debug => LevelFilter::Debug,
            CliLogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dialclock",
    version,
    about = "Network-synced alarm clock with a rotary-encoder menu"
)]
struct Cli {
    /// Alarm storage image.
    #[arg(long, default_value = "dialclock.eeprom")]
    storage: PathBuf,

    /// Device config file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CliTimingSource::Auto)]
    time_source: CliTimingSource,

    #[arg(long)]
    ntp_server: Option<String>,

    #[arg(long)]
    ntp_timeout_ms: Option<u64>,

    #[arg(long, allow_hyphen_values = true)]
    utc_offset_secs: Option<i64>,

    #[arg(long, value_enum)]
    dst_rule: Option<CliDstRule>,

    #[arg(long)]
    diagnostics: bool,

    #[arg(long, default_value = "0.0.0.0")]
    portal_bind: String,

    #[arg(long, default_value_t = 8080)]
    portal_port: u16,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    mdns_enabled: bool,

    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.log_level.into())?;

    let config = device_config(&cli)?;
    let sounds = AlarmSoundLibrary::standard();
    let storage = FileStorage::open(&cli.storage)
        .with_context(|| format!("failed to open {}", cli.storage.display()))?;
    info!("alarm storage image: {}", storage.path().display());
    let (schedule, outcome) = AlarmSchedule::load(Box::new(storage), &sounds)
        .with_context(|| format!("failed to load alarms from {}", cli.storage.display()))?;
    if outcome == LoadOutcome::Uninitialized {
        info!("no alarms stored yet");
    }

    let mut selected = select_source(
        cli.time_source.into(),
        &SntpSettings {
            server: config.ntp_server.clone(),
            timeout: config.ntp_timeout,
        },
    )?;
    let clock_settings = ClockSettings {
        utc_offset_secs: config.utc_offset_secs,
        dst_rule: config.dst_rule,
    };

    if cli.diagnostics {
        diagnostics::run_diagnostics(
            &DiagnosticsInput {
                storage_path: &cli.storage,
                outcome,
                schedule: &schedule,
                sounds: &sounds,
                clock: clock_settings,
            },
            &mut selected,
        )?;
        return Ok(());
    }
    if let Some(reason) = selected.fallback_reason.as_deref() {
        info!("{reason}");
    }
    info!("time source: {}", selected.label);

    let ticks = Arc::new(MonotonicTicks::new());
    let encoder = Arc::new(EncoderInput::new(DebounceSettings {
        menu_ms: config.menu_debounce_ms,
        value_ms: config.value_debounce_ms,
    }));
    let button = Arc::new(ConfirmButton::new(config.button_debounce_ms));
    let quit = Arc::new(AtomicBool::new(false));

    ConsoleInput {
        encoder: Arc::clone(&encoder),
        button: Arc::clone(&button),
        ticks: ticks.clone(),
        quit: Arc::clone(&quit),
        step_gap: CONSOLE_STEP_GAP,
    }
    .spawn();

    let app = DeviceApp::new(
        ClockModel::new(clock_settings),
        schedule,
        sounds,
        Peripherals {
            display: Box::new(TerminalDisplay::new()),
            buzzer: Box::new(LogBuzzer),
            time_source: selected.source,
            ticks: Box::new(Arc::clone(&ticks)),
            link: Box::new(HostLink::new(
                config.ntp_server.clone(),
                config.link_retries,
                LINK_RETRY_DELAY,
            )),
            encoder,
            button,
        },
        DeviceSettings {
            resync_interval: config.resync_interval,
            sync_retry_delay: config.sync_retry_delay,
            backlight_timeout: config.backlight_timeout,
            hostname: config.hostname.clone(),
            credentials: WifiCredentials {
                ssid: config.wifi_ssid,
                passwd: config.wifi_passwd,
            },
        },
    );

    ui::app::run(
        app,
        PortalConfig {
            bind_addr: cli.portal_bind,
            port: cli.portal_port,
            mdns_enabled: cli.mdns_enabled,
            hostname: config.hostname,
        },
        &quit,
    )
}

/// File values first, then any flag given on the command line.
fn device_config(cli: &Cli) -> Result<DeviceConfig> {
    let mut config = match &cli.config {
        Some(path) => load_device_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    if let Some(server) = &cli.ntp_server {
        config.ntp_server = server.clone();
    }
    if let Some(timeout_ms) = cli.ntp_timeout_ms {
        if timeout_ms == 0 {
            bail!("--ntp-timeout-ms must be greater than zero");
        }
        config.ntp_timeout = Duration::from_millis(timeout_ms);
    }
    if let Some(offset) = cli.utc_offset_secs {
        config.utc_offset_secs = offset;
    }
    if let Some(rule) = cli.dst_rule {
        config.dst_rule = rule.into();
    }
    Ok(config)
}
