use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow};
use thiserror::Error;

use crate::sntp::SntpSource;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimingSourceKind {
    Auto,
    System,
    Sntp,
}

#[derive(Debug, Error)]
pub enum TimeSyncError {
    #[error("unable to resolve time server {server}")]
    Resolve {
        server: String,
        #[source]
        source: Option<std::io::Error>,
    },
    #[error("time server socket error")]
    Socket(#[from] std::io::Error),
    #[error("no reply from {server} within {timeout_ms} ms")]
    Timeout { server: SocketAddr, timeout_ms: u128 },
    #[error("short SNTP reply: {len} bytes")]
    ShortResponse { len: usize },
    #[error("unusable stratum {stratum} in SNTP reply")]
    Stratum { stratum: u8 },
    #[error("clock reads before the unix epoch")]
    BeforeEpoch,
}

/// Wall-clock source consulted on every sync. One call, no internal retry.
pub trait NetworkTime {
    fn fetch_epoch_seconds(&mut self) -> Result<i64, TimeSyncError>;
    fn label(&self) -> &'static str;
}

/// Monotonic millisecond counter, the host stand-in for `millis()`.
pub trait TickSource {
    fn now_ms(&self) -> u64;
}

pub struct MonotonicTicks {
    anchor: Instant,
}

impl MonotonicTicks {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl TickSource for MonotonicTicks {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl<T: TickSource + ?Sized> TickSource for Arc<T> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Host clock, used when no time server is reachable.
pub struct SystemClockSource;

impl NetworkTime for SystemClockSource {
    fn fetch_epoch_seconds(&mut self) -> Result<i64, TimeSyncError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TimeSyncError::BeforeEpoch)?;
        i64::try_from(elapsed.as_secs()).map_err(|_| TimeSyncError::BeforeEpoch)
    }

    fn label(&self) -> &'static str {
        "SYSTEM_CLOCK"
    }
}

pub struct SelectedTimeSource {
    pub source: Box<dyn NetworkTime>,
    pub label: &'static str,
    pub fallback_reason: Option<String>,
}

pub struct SntpSettings {
    pub server: String,
    pub timeout: Duration,
}

pub fn select_source(kind: TimingSourceKind, sntp: &SntpSettings) -> Result<SelectedTimeSource> {
    match kind {
        TimingSourceKind::System => Ok(system_source(None)),
        TimingSourceKind::Sntp => {
            let source = SntpSource::try_new(&sntp.server, sntp.timeout)
                .map_err(|err| anyhow!("sntp time source unavailable: {err}"))?;
            Ok(SelectedTimeSource {
                label: source.label(),
                source: Box::new(source),
                fallback_reason: None,
            })
        }
        TimingSourceKind::Auto => match SntpSource::try_new(&sntp.server, sntp.timeout) {
            Ok(source) => Ok(SelectedTimeSource {
                label: source.label(),
                source: Box::new(source),
                fallback_reason: None,
            }),
            Err(err) => Ok(system_source(Some(format!(
                "time server {} not reachable, using system clock: {err}",
                sntp.server
            )))),
        },
    }
}

fn system_source(fallback_reason: Option<String>) -> SelectedTimeSource {
    let source = SystemClockSource;
    SelectedTimeSource {
        label: source.label(),
        source: Box::new(source),
        fallback_reason,
    }
}
