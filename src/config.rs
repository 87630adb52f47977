use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::dst::DstRule;

/// Device tunables. Every field has a default so the file is optional.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceConfig {
    pub utc_offset_secs: i64,
    pub dst_rule: DstRule,
    pub ntp_server: String,
    pub ntp_timeout: Duration,
    pub resync_interval: Duration,
    pub sync_retry_delay: Duration,
    pub backlight_timeout: Duration,
    pub menu_debounce_ms: u64,
    pub value_debounce_ms: u64,
    pub button_debounce_ms: u64,
    pub link_retries: u32,
    pub hostname: String,
    pub wifi_ssid: String,
    pub wifi_passwd: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfigFile::default().into()
    }
}

pub fn load_device_config(path: &Path) -> Result<DeviceConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read device config {}", path.display()))?;
    parse_device_config_text(&content)
}

pub fn parse_device_config_text(content: &str) -> Result<DeviceConfig> {
    let raw = serde_json::from_str::<DeviceConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported device config version {}; expected version 1",
            raw.version
        );
    }
    if raw.ntp_timeout_ms == 0 {
        bail!("ntp_timeout_ms must be greater than zero");
    }
    if raw.resync_interval_secs == 0 {
        bail!("resync_interval_secs must be greater than zero");
    }
    if raw.hostname.trim().is_empty() {
        bail!("hostname must not be empty");
    }
    Ok(raw.into())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceConfigFile {
    version: u32,
    #[serde(default = "default_utc_offset_secs")]
    utc_offset_secs: i64,
    #[serde(default)]
    dst_rule: DstRuleFile,
    #[serde(default = "default_ntp_server")]
    ntp_server: String,
    #[serde(default = "default_ntp_timeout_ms")]
    ntp_timeout_ms: u64,
    #[serde(default = "default_resync_interval_secs")]
    resync_interval_secs: u64,
    #[serde(default = "default_sync_retry_delay_ms")]
    sync_retry_delay_ms: u64,
    #[serde(default = "default_backlight_timeout_secs")]
    backlight_timeout_secs: u64,
    #[serde(default = "default_menu_debounce_ms")]
    menu_debounce_ms: u64,
    #[serde(default = "default_value_debounce_ms")]
    value_debounce_ms: u64,
    #[serde(default = "default_button_debounce_ms")]
    button_debounce_ms: u64,
    #[serde(default = "default_link_retries")]
    link_retries: u32,
    #[serde(default = "default_hostname")]
    hostname: String,
    #[serde(default)]
    wifi_ssid: String,
    #[serde(default)]
    wifi_passwd: String,
}

impl Default for DeviceConfigFile {
    fn default() -> Self {
        Self {
            version: 1,
            utc_offset_secs: default_utc_offset_secs(),
            dst_rule: DstRuleFile::default(),
            ntp_server: default_ntp_server(),
            ntp_timeout_ms: default_ntp_timeout_ms(),
            resync_interval_secs: default_resync_interval_secs(),
            sync_retry_delay_ms: default_sync_retry_delay_ms(),
            backlight_timeout_secs: default_backlight_timeout_secs(),
            menu_debounce_ms: default_menu_debounce_ms(),
            value_debounce_ms: default_value_debounce_ms(),
            button_debounce_ms: default_button_debounce_ms(),
            link_retries: default_link_retries(),
            hostname: default_hostname(),
            wifi_ssid: String::new(),
            wifi_passwd: String::new(),
        }
    }
}

impl From<DeviceConfigFile> for DeviceConfig {
    fn from(raw: DeviceConfigFile) -> Self {
        Self {
            utc_offset_secs: raw.utc_offset_secs,
            dst_rule: raw.dst_rule.into(),
            ntp_server: raw.ntp_server,
            ntp_timeout: Duration::from_millis(raw.ntp_timeout_ms),
            resync_interval: Duration::from_secs(raw.resync_interval_secs),
            sync_retry_delay: Duration::from_millis(raw.sync_retry_delay_ms),
            backlight_timeout: Duration::from_secs(raw.backlight_timeout_secs),
            menu_debounce_ms: raw.menu_debounce_ms,
            value_debounce_ms: raw.value_debounce_ms,
            button_debounce_ms: raw.button_debounce_ms,
            link_retries: raw.link_retries,
            hostname: raw.hostname,
            wifi_ssid: raw.wifi_ssid,
            wifi_passwd: raw.wifi_passwd,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DstRuleFile {
    Off,
    #[default]
    Literal,
    Bounded,
}

impl From<DstRuleFile> for DstRule {
    fn from(value: DstRuleFile) -> Self {
        match value {
            DstRuleFile::Off => DstRule::Off,
            DstRuleFile::Literal => DstRule::Literal,
            DstRuleFile::Bounded => DstRule::Bounded,
        }
    }
}

fn default_utc_offset_secs() -> i64 {
    3_600
}

fn default_ntp_server() -> String {
    "europe.pool.ntp.org:123".to_string()
}

fn default_ntp_timeout_ms() -> u64 {
    2_000
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_sync_retry_delay_ms() -> u64 {
    50
}

fn default_backlight_timeout_secs() -> u64 {
    10
}

fn default_menu_debounce_ms() -> u64 {
    100
}

fn default_value_debounce_ms() -> u64 {
    50
}

fn default_button_debounce_ms() -> u64 {
    200
}

fn default_link_retries() -> u32 {
    10
}

fn default_hostname() -> String {
    "dialclock".to_string()
}
