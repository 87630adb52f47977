//! Wall time derived from the last sync and the local tick counter.
//!
//! Nothing here advances on its own: every reading is recomputed as
//! `last_synced_epoch + (tick - synced_at_tick) / 1000`, shifted by the
//! configured UTC offset and the summer-time adjustment decided at sync.

use std::fmt;
use std::thread;
use std::time::Duration;

use chrono::Weekday;
use log::{info, warn};

use crate::alarm::model::{TimeOfDay, WEEK};
use crate::dst::{self, DstRule};
use crate::time_provider::{NetworkTime, TickSource};

const SECONDS_PER_DAY: i64 = 86_400;
/// 1970-01-01 was a Thursday.
const EPOCH_WEEKDAY_INDEX: i64 = 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WallTime {
    pub time: TimeOfDay,
    second: u8,
    pub weekday: Weekday,
}

impl WallTime {
    pub fn new(hour: u8, minute: u8, second: u8, weekday: Weekday) -> Option<Self> {
        if second >= 60 {
            return None;
        }
        Some(Self {
            time: TimeOfDay::new(hour, minute)?,
            second,
            weekday,
        })
    }

    pub fn from_local_seconds(local_secs: i64) -> Self {
        let day = local_secs.div_euclid(SECONDS_PER_DAY);
        let second_of_day = local_secs.rem_euclid(SECONDS_PER_DAY);
        let weekday = WEEK[(day + EPOCH_WEEKDAY_INDEX).rem_euclid(7) as usize];
        Self {
            time: TimeOfDay::from_minute_of_day((second_of_day / 60) as u32),
            second: (second_of_day % 60) as u8,
            weekday,
        }
    }

    pub fn hour(&self) -> u8 {
        self.time.hour()
    }

    pub fn minute(&self) -> u8 {
        self.time.minute()
    }

    pub fn second(&self) -> u8 {
        self.second
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.time, self.second())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ClockState {
    /// UTC seconds at the last successful sync.
    pub last_synced_epoch: i64,
    pub synced_at_tick: u64,
}

/// Boundaries crossed since the previous `tick`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct Rollover {
    pub second: bool,
    pub minute: bool,
    pub hour: bool,
    pub day: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ClockSettings {
    pub utc_offset_secs: i64,
    pub dst_rule: DstRule,
}

pub struct ClockModel {
    settings: ClockSettings,
    state: ClockState,
    summer_offset_secs: i64,
    synced: bool,
    /// Local seconds seen by the last `tick`.
    previous: Option<i64>,
    current: WallTime,
}

impl ClockModel {
    pub fn new(settings: ClockSettings) -> Self {
        Self {
            settings,
            state: ClockState::default(),
            summer_offset_secs: 0,
            synced: false,
            previous: None,
            current: WallTime::from_local_seconds(settings.utc_offset_secs),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn summer_offset_secs(&self) -> i64 {
        self.summer_offset_secs
    }

    /// Wall time as of the last `tick`.
    pub fn now(&self) -> WallTime {
        self.current
    }

    pub fn local_seconds_at(&self, tick_ms: u64) -> i64 {
        let elapsed_ms = tick_ms.saturating_sub(self.state.synced_at_tick);
        self.state.last_synced_epoch
            + self.settings.utc_offset_secs
            + self.summer_offset_secs
            + (elapsed_ms / 1_000) as i64
    }

    /// Recomputes wall time and reports every boundary crossed since the
    /// previous call, however long ago that was.
    pub fn tick(&mut self, tick_ms: u64) -> Rollover {
        let local = self.local_seconds_at(tick_ms);
        self.current = WallTime::from_local_seconds(local);
        let Some(previous) = self.previous else {
            self.previous = Some(local);
            return Rollover::default();
        };
        if local <= previous {
            return Rollover::default();
        }
        self.previous = Some(local);
        Rollover {
            second: true,
            minute: local.div_euclid(60) != previous.div_euclid(60),
            hour: local.div_euclid(3_600) != previous.div_euclid(3_600),
            day: local.div_euclid(SECONDS_PER_DAY) != previous.div_euclid(SECONDS_PER_DAY),
        }
    }

    /// Replaces the sync baseline and re-evaluates the summer-time rule.
    pub fn apply_sync(&mut self, utc_epoch: i64, tick_ms: u64) {
        let standard = utc_epoch + self.settings.utc_offset_secs;
        self.summer_offset_secs = dst::summer_offset_secs(self.settings.dst_rule, standard);
        self.state = ClockState {
            last_synced_epoch: utc_epoch,
            synced_at_tick: tick_ms,
        };
        self.synced = true;

        let local = self.local_seconds_at(tick_ms);
        // A sync that steps time back re-baselines so later crossings are
        // still reported once the clock moves forward again.
        if self.previous.is_some_and(|previous| local < previous) {
            self.previous = Some(local);
        }
        let synced = WallTime::from_local_seconds(local);
        info!(
            "clock synced: {synced} {:?} (dst rule {}, summer offset {}s)",
            synced.weekday,
            self.settings.dst_rule.label(),
            self.summer_offset_secs
        );
    }

    /// Fetches until the source answers. There is no attempt ceiling.
    pub fn sync_blocking(
        &mut self,
        source: &mut dyn NetworkTime,
        ticks: &dyn TickSource,
        retry_delay: Duration,
    ) -> u32 {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match source.fetch_epoch_seconds() {
                Ok(epoch) => {
                    self.apply_sync(epoch, ticks.now_ms());
                    return attempts;
                }
                Err(err) => {
                    warn!(
                        "time sync attempt {attempts} via {} failed: {err}",
                        source.label()
                    );
                    thread::sleep(retry_delay);
                }
            }
        }
    }

    pub fn resync_due(&self, tick_ms: u64, interval: Duration) -> bool {
        if !self.synced {
            return true;
        }
        let elapsed = tick_ms.saturating_sub(self.state.synced_at_tick);
        u128::from(elapsed) >= interval.as_millis()
    }

    /// True when the minute shown by the last `tick` no longer matches the
    /// minute derived from the tick counter, e.g. after a long modal flow.
    pub fn minute_diverged(&self, tick_ms: u64) -> bool {
        let derived = WallTime::from_local_seconds(self.local_seconds_at(tick_ms));
        derived.minute() != self.current.minute()
    }
}
