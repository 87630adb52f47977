use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::alarm::model::weekday_name;
use crate::alarm::scheduler::AlarmSchedule;
use crate::alarm::sounds::AlarmSoundLibrary;
use crate::alarm::storage::LoadOutcome;
use crate::clock::{ClockModel, ClockSettings};
use crate::time_provider::SelectedTimeSource;
use crate::ui::render::next_alarm_line;

pub struct DiagnosticsInput<'a> {
    pub storage_path: &'a Path,
    pub outcome: LoadOutcome,
    pub schedule: &'a AlarmSchedule,
    pub sounds: &'a AlarmSoundLibrary,
    pub clock: ClockSettings,
}

pub fn run_diagnostics(input: &DiagnosticsInput<'_>, selected: &mut SelectedTimeSource) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_report(&mut stdout, input, selected)
}

/// Prints the persisted state, the time source choice and one synced sample.
pub fn write_report(
    out: &mut dyn Write,
    input: &DiagnosticsInput<'_>,
    selected: &mut SelectedTimeSource,
) -> Result<()> {
    let schedule = input.schedule;
    writeln!(out, "dialclock diagnostics")?;
    let state = match input.outcome {
        LoadOutcome::Loaded => "initialized",
        LoadOutcome::Uninitialized => "blank, defaults in use",
    };
    writeln!(out, "Storage: {} ({state})", input.storage_path.display())?;

    writeln!(out, "Weekly alarms:")?;
    for (day, slot) in schedule.weekly().iter() {
        let time = slot.map_or_else(|| "--".to_string(), |time| time.to_string());
        writeln!(out, "  {:<10}{time}", weekday_name(day))?;
    }
    match schedule.override_alarm() {
        Some(alarm) => writeln!(
            out,
            "One-off alarm: {} {}",
            weekday_name(alarm.day),
            alarm.time
        )?,
        None => writeln!(out, "One-off alarm: none")?,
    }
    writeln!(out, "Alarm sound: {}", input.sounds.get(schedule.sound()).name)?;

    writeln!(out, "Selected timing source: {}", selected.label)?;
    if let Some(reason) = selected.fallback_reason.as_deref() {
        writeln!(out, "Fallback reason: {reason}")?;
    }

    let epoch = selected
        .source
        .fetch_epoch_seconds()
        .with_context(|| format!("failed to read a sample from {}", selected.label))?;
    let mut clock = ClockModel::new(input.clock);
    clock.apply_sync(epoch, 0);
    clock.tick(0);
    let now = clock.now();
    writeln!(out, "Sample epoch: {epoch}")?;
    writeln!(out, "Local time: {now} {}", weekday_name(now.weekday))?;
    writeln!(
        out,
        "DST rule: {} (summer offset {}s)",
        input.clock.dst_rule.label(),
        clock.summer_offset_secs()
    )?;
    match schedule.next_firing(&now) {
        Some(next) => writeln!(
            out,
            "Next alarm: {}",
            next_alarm_line(next, schedule.dismiss_pending()).trim_end()
        )?,
        None => writeln!(out, "Next alarm: none")?,
    }
    Ok(())
}
