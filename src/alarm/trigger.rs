use chrono::Weekday;
use log::{error, info};

use crate::alarm::model::{AlarmSource, TimeOfDay};
use crate::alarm::scheduler::AlarmSchedule;
use crate::alarm::sounds::SoundId;
use crate::clock::WallTime;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TriggerState {
    Idle,
    Ringing(AlarmSource),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TriggerDecision {
    /// Nothing matches the current minute.
    Quiet,
    /// This minute's alarm was already rung or suppressed.
    Handled,
    /// The dismiss flag swallowed this firing.
    Suppressed(AlarmSource),
    /// Start playing `sound` and call [`AlarmTrigger::confirm`] once the
    /// user stops it.
    Ring { source: AlarmSource, sound: SoundId },
    /// Still waiting for confirmation.
    Ringing,
}

/// Decides once per tick whether the schedule wants to ring.
pub struct AlarmTrigger {
    state: TriggerState,
    /// The matching minute that was already rung or suppressed.
    latched: Option<(Weekday, TimeOfDay)>,
}

impl AlarmTrigger {
    pub fn new() -> Self {
        Self {
            state: TriggerState::Idle,
            latched: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn evaluate(&mut self, now: &WallTime, schedule: &mut AlarmSchedule) -> TriggerDecision {
        if matches!(self.state, TriggerState::Ringing(_)) {
            return TriggerDecision::Ringing;
        }
        let Some(source) = schedule.due_at(now) else {
            self.latched = None;
            return TriggerDecision::Quiet;
        };

        let minute = (now.weekday, now.time);
        if self.latched == Some(minute) {
            consume_override(schedule);
            return TriggerDecision::Handled;
        }
        self.latched = Some(minute);

        if schedule.take_dismiss() {
            info!("{source:?} alarm at {} suppressed by dismiss", now.time);
            consume_override(schedule);
            return TriggerDecision::Suppressed(source);
        }

        info!("{source:?} alarm firing at {now}");
        self.state = TriggerState::Ringing(source);
        TriggerDecision::Ring {
            source,
            sound: schedule.sound(),
        }
    }

    /// The user stopped the alarm.
    pub fn confirm(&mut self, schedule: &mut AlarmSchedule) {
        if let TriggerState::Ringing(source) = self.state {
            info!("{source:?} alarm confirmed");
            self.state = TriggerState::Idle;
            consume_override(schedule);
        }
    }
}

/// Any pending one-off alarm is spent by a handled firing.
fn consume_override(schedule: &mut AlarmSchedule) {
    if schedule.override_alarm().is_none() {
        return;
    }
    match schedule.clear_override() {
        Ok(()) => info!("one-off alarm consumed"),
        Err(err) => error!("unable to persist consumed one-off alarm: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::alarm::model::{DayGroup, TimeOfDay};
    use crate::alarm::sounds::AlarmSoundLibrary;
    use crate::alarm::storage::tests::SharedStorage;

    fn at(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).expect("valid time")
    }

    fn now(weekday: Weekday, hour: u8, minute: u8, second: u8) -> WallTime {
        WallTime::new(hour, minute, second, weekday).expect("valid wall time")
    }

    fn schedule() -> (AlarmSchedule, SharedStorage) {
        let storage = SharedStorage::blank();
        let (schedule, _) =
            AlarmSchedule::load(Box::new(storage.clone()), &AlarmSoundLibrary::standard())
                .expect("load");
        (schedule, storage)
    }

    #[test]
    fn rings_once_per_matching_minute() {
        let (mut schedule, _) = schedule();
        schedule
            .set_days(DayGroup::Single(Weekday::Mon), at(7, 0))
            .expect("set");
        let mut trigger = AlarmTrigger::new();

        assert_eq!(
            trigger.evaluate(&now(Weekday::Mon, 6, 59, 59), &mut schedule),
            TriggerDecision::Quiet
        );
        let decision = trigger.evaluate(&now(Weekday::Mon, 7, 0, 0), &mut schedule);
        assert_eq!(
            decision,
            TriggerDecision::Ring {
                source: AlarmSource::Recurring,
                sound: SoundId::default()
            }
        );
        assert_eq!(trigger.state(), TriggerState::Ringing(AlarmSource::Recurring));
        assert_eq!(
            trigger.evaluate(&now(Weekday::Mon, 7, 0, 5), &mut schedule),
            TriggerDecision::Ringing
        );

        trigger.confirm(&mut schedule);
        assert_eq!(trigger.state(), TriggerState::Idle);
        assert_eq!(
            trigger.evaluate(&now(Weekday::Mon, 7, 0, 30), &mut schedule),
            TriggerDecision::Handled
        );
        assert_eq!(
            trigger.evaluate(&now(Weekday::Mon, 7, 1, 0), &mut schedule),
            TriggerDecision::Quiet
        );
    }

    #[test]
    fn dismiss_suppresses_exactly_one_firing() {
        let (mut schedule, _) = schedule();
        schedule
            .set_days(DayGroup::Weekdays, at(7, 0))
            .expect("set");
        schedule.toggle_dismiss();
        let mut trigger = AlarmTrigger::new();

        assert_eq!(
            trigger.evaluate(&now(Weekday::Tue, 7, 0, 0), &mut schedule),
            TriggerDecision::Suppressed(AlarmSource::Recurring)
        );
        assert!(!schedule.dismiss_pending());
        assert_eq!(
            trigger.evaluate(&now(Weekday::Tue, 7, 0, 1), &mut schedule),
            TriggerDecision::Handled
        );
        assert_eq!(trigger.state(), TriggerState::Idle);

        trigger.evaluate(&now(Weekday::Tue, 7, 1, 0), &mut schedule);
        assert!(matches!(
            trigger.evaluate(&now(Weekday::Wed, 7, 0, 0), &mut schedule),
            TriggerDecision::Ring { .. }
        ));
    }

    #[test]
    fn latch_holds_across_gaps_between_evaluations() {
        let (mut schedule, _) = schedule();
        schedule
            .set_days(DayGroup::Weekdays, at(7, 0))
            .expect("set");
        schedule.toggle_dismiss();
        let mut trigger = AlarmTrigger::new();

        assert_eq!(
            trigger.evaluate(&now(Weekday::Mon, 7, 0, 5), &mut schedule),
            TriggerDecision::Suppressed(AlarmSource::Recurring)
        );
        // No evaluation for twenty seconds, as while the clock was resyncing.
        assert_eq!(
            trigger.evaluate(&now(Weekday::Mon, 7, 0, 25), &mut schedule),
            TriggerDecision::Handled
        );
    }

    #[test]
    fn latch_releases_for_a_different_matching_minute() {
        let (mut schedule, _) = schedule();
        schedule
            .set_days(DayGroup::Single(Weekday::Thu), at(7, 0))
            .expect("set");
        let mut trigger = AlarmTrigger::new();

        assert!(matches!(
            trigger.evaluate(&now(Weekday::Thu, 7, 0, 0), &mut schedule),
            TriggerDecision::Ring { .. }
        ));
        trigger.confirm(&mut schedule);
        schedule
            .set_days(DayGroup::Single(Weekday::Thu), at(7, 1))
            .expect("reset");
        assert!(matches!(
            trigger.evaluate(&now(Weekday::Thu, 7, 1, 0), &mut schedule),
            TriggerDecision::Ring { .. }
        ));
    }

    #[test]
    fn confirmed_one_off_alarm_is_cleared_and_persisted() {
        let (mut schedule, storage) = schedule();
        schedule
            .set_override(Weekday::Fri, at(5, 30))
            .expect("set override");
        let mut trigger = AlarmTrigger::new();

        let decision = trigger.evaluate(&now(Weekday::Fri, 5, 30, 0), &mut schedule);
        assert!(matches!(
            decision,
            TriggerDecision::Ring {
                source: AlarmSource::Override,
                ..
            }
        ));
        assert!(schedule.override_alarm().is_some());
        trigger.confirm(&mut schedule);

        assert_eq!(schedule.override_alarm(), None);
        storage.0.borrow_mut().power_cycle();
        let (reloaded, _) =
            AlarmSchedule::load(Box::new(storage.clone()), &AlarmSoundLibrary::standard())
                .expect("reload");
        assert_eq!(reloaded.override_alarm(), None);
    }

    #[test]
    fn weekly_firing_spends_a_pending_one_off_alarm() {
        let (mut schedule, _) = schedule();
        schedule
            .set_days(DayGroup::Single(Weekday::Sat), at(9, 0))
            .expect("set");
        schedule
            .set_override(Weekday::Sun, at(10, 0))
            .expect("set override");
        schedule.toggle_dismiss();
        let mut trigger = AlarmTrigger::new();

        assert_eq!(
            trigger.evaluate(&now(Weekday::Sat, 9, 0, 0), &mut schedule),
            TriggerDecision::Suppressed(AlarmSource::Recurring)
        );
        assert_eq!(schedule.override_alarm(), None);
    }

    #[test]
    fn confirm_while_idle_does_nothing() {
        let (mut schedule, _) = schedule();
        schedule
            .set_override(Weekday::Fri, at(5, 30))
            .expect("set override");
        let mut trigger = AlarmTrigger::new();
        trigger.confirm(&mut schedule);
        assert!(schedule.override_alarm().is_some());
    }
}
