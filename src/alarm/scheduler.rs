use chrono::Weekday;
use log::{info, warn};

use crate::alarm::model::{
    AlarmSource, DayGroup, NextAlarm, OverrideAlarm, TimeOfDay, WEEK, WeeklySchedule,
    weekday_index,
};
use crate::alarm::sounds::{AlarmSoundLibrary, SoundId};
use crate::alarm::storage::{
    LoadOutcome, Storage, StorageError, load_schedule, save_alarms, save_sound, stage_alarms,
    stage_sound,
};
use crate::clock::WallTime;

/// Weekly alarms, the one-off alarm and the selected theme, kept in step
/// with the backing store. A mutation only lands in memory once its
/// commit succeeded.
pub struct AlarmSchedule {
    weekly: WeeklySchedule,
    override_alarm: Option<OverrideAlarm>,
    sound: SoundId,
    dismiss_next: bool,
    storage: Box<dyn Storage>,
}

impl AlarmSchedule {
    pub fn load(
        storage: Box<dyn Storage>,
        sounds: &AlarmSoundLibrary,
    ) -> Result<(Self, LoadOutcome), StorageError> {
        let (stored, outcome) = load_schedule(storage.as_ref(), sounds)?;
        for (day, slot) in stored.weekly.iter() {
            match slot {
                Some(time) => info!("{day:?}: alarm at {time}"),
                None => info!("{day:?}: no alarm"),
            }
        }
        if let Some(alarm) = stored.override_alarm {
            info!("one-off alarm: {:?} at {}", alarm.day, alarm.time);
        }
        Ok((
            Self {
                weekly: stored.weekly,
                override_alarm: stored.override_alarm,
                sound: stored.sound,
                dismiss_next: false,
                storage,
            },
            outcome,
        ))
    }

    pub fn weekly(&self) -> &WeeklySchedule {
        &self.weekly
    }

    pub fn override_alarm(&self) -> Option<OverrideAlarm> {
        self.override_alarm
    }

    pub fn sound(&self) -> SoundId {
        self.sound
    }

    pub fn dismiss_pending(&self) -> bool {
        self.dismiss_next
    }

    pub fn set_days(&mut self, group: DayGroup, time: TimeOfDay) -> Result<(), StorageError> {
        let mut weekly = self.weekly;
        weekly.apply(group, Some(time));
        self.persist_alarms(weekly, self.override_alarm)?;
        info!("alarm set for {} at {time}", group.label());
        Ok(())
    }

    pub fn clear_days(&mut self, group: DayGroup) -> Result<(), StorageError> {
        let mut weekly = self.weekly;
        weekly.apply(group, None);
        self.persist_alarms(weekly, self.override_alarm)?;
        info!("alarm removed for {}", group.label());
        Ok(())
    }

    pub fn set_override(&mut self, day: Weekday, time: TimeOfDay) -> Result<(), StorageError> {
        self.persist_alarms(self.weekly, Some(OverrideAlarm { day, time }))?;
        info!("one-off alarm set for {day:?} at {time}");
        Ok(())
    }

    pub fn clear_override(&mut self) -> Result<(), StorageError> {
        self.persist_alarms(self.weekly, None)?;
        info!("one-off alarm cleared");
        Ok(())
    }

    pub fn set_sound(&mut self, sound: SoundId) -> Result<(), StorageError> {
        if let Err(err) = save_sound(self.storage.as_mut(), sound) {
            self.restage(|storage, schedule| stage_sound(storage, schedule.sound));
            return Err(err);
        }
        self.sound = sound;
        info!("alarm sound set to #{}", sound.index());
        Ok(())
    }

    /// Returns the new state of the flag.
    pub fn toggle_dismiss(&mut self) -> bool {
        self.dismiss_next = !self.dismiss_next;
        info!(
            "next alarm {}",
            if self.dismiss_next { "dismissed" } else { "resumed" }
        );
        self.dismiss_next
    }

    /// Clears the flag and reports whether it was set.
    pub fn take_dismiss(&mut self) -> bool {
        std::mem::take(&mut self.dismiss_next)
    }

    /// The one-off alarm if set, else the nearest weekly slot. Today's slot
    /// only counts while it is still ahead of `now`; a week ahead is the
    /// furthest the scan looks.
    pub fn next_firing(&self, now: &WallTime) -> Option<NextAlarm> {
        if let Some(alarm) = self.override_alarm {
            return Some(NextAlarm {
                day: alarm.day,
                time: alarm.time,
                source: AlarmSource::Override,
            });
        }
        let today = weekday_index(now.weekday);
        (0..=WEEK.len()).find_map(|offset| {
            let day = WEEK[(today + offset) % WEEK.len()];
            let time = self.weekly.get(day)?;
            (offset > 0 || time > now.time).then_some(NextAlarm {
                day,
                time,
                source: AlarmSource::Recurring,
            })
        })
    }

    /// Which alarm, if any, is due at `now`. A one-off alarm set for today
    /// shadows today's weekly slot, even at a different time.
    pub fn due_at(&self, now: &WallTime) -> Option<AlarmSource> {
        let claimed_today = self
            .override_alarm
            .filter(|alarm| alarm.day == now.weekday);
        match claimed_today {
            Some(alarm) => (alarm.time == now.time).then_some(AlarmSource::Override),
            None => (self.weekly.get(now.weekday) == Some(now.time))
                .then_some(AlarmSource::Recurring),
        }
    }

    fn persist_alarms(
        &mut self,
        weekly: WeeklySchedule,
        override_alarm: Option<OverrideAlarm>,
    ) -> Result<(), StorageError> {
        if let Err(err) = save_alarms(self.storage.as_mut(), &weekly, override_alarm) {
            self.restage(|storage, schedule| {
                stage_alarms(storage, &schedule.weekly, schedule.override_alarm)
            });
            return Err(err);
        }
        self.weekly = weekly;
        self.override_alarm = override_alarm;
        Ok(())
    }

    /// Puts the in-memory values back over bytes a failed commit left
    /// behind, so a later commit of another range cannot publish them.
    fn restage(
        &mut self,
        stage: impl FnOnce(&mut dyn Storage, &Snapshot) -> Result<(), StorageError>,
    ) {
        let snapshot = Snapshot {
            weekly: self.weekly,
            override_alarm: self.override_alarm,
            sound: self.sound,
        };
        if let Err(err) = stage(self.storage.as_mut(), &snapshot) {
            warn!("unable to restore staged storage bytes: {err}");
        }
    }
}

struct Snapshot {
    weekly: WeeklySchedule,
    override_alarm: Option<OverrideAlarm>,
    sound: SoundId,
}
