use std::fmt;

use chrono::Weekday;

pub const DAYS_PER_WEEK: usize = 7;

/// Schedule table order, index 0 is Sunday.
pub const WEEK: [Weekday; DAYS_PER_WEEK] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

pub fn weekday_index(day: Weekday) -> usize {
    day.num_days_from_sunday() as usize
}

pub fn weekday_from_index(index: usize) -> Option<Weekday> {
    WEEK.get(index).copied()
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

/// Hour and minute of an alarm. Only constructible in range.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Wraps modulo one day.
    pub fn from_minute_of_day(minutes: u32) -> Self {
        let minutes = minutes % (24 * 60);
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// One recurring slot per weekday; `None` means no alarm that day.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct WeeklySchedule {
    slots: [Option<TimeOfDay>; DAYS_PER_WEEK],
}

impl WeeklySchedule {
    pub fn get(&self, day: Weekday) -> Option<TimeOfDay> {
        self.slots[weekday_index(day)]
    }

    pub fn set(&mut self, day: Weekday, time: Option<TimeOfDay>) {
        self.slots[weekday_index(day)] = time;
    }

    pub fn apply(&mut self, group: DayGroup, time: Option<TimeOfDay>) {
        for day in group.days() {
            self.set(day, time);
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, Option<TimeOfDay>)> + '_ {
        WEEK.iter().map(|day| (*day, self.get(*day)))
    }
}

/// Bulk targets offered by the setup and remove menus.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DayGroup {
    /// Monday to Friday.
    Weekdays,
    /// Saturday and Sunday.
    Weekend,
    Single(Weekday),
}

impl DayGroup {
    pub fn contains(self, day: Weekday) -> bool {
        match self {
            DayGroup::Weekdays => !matches!(day, Weekday::Sat | Weekday::Sun),
            DayGroup::Weekend => matches!(day, Weekday::Sat | Weekday::Sun),
            DayGroup::Single(single) => single == day,
        }
    }

    pub fn days(self) -> impl Iterator<Item = Weekday> {
        WEEK.into_iter().filter(move |day| self.contains(*day))
    }

    pub fn label(self) -> &'static str {
        match self {
            DayGroup::Weekdays => "Weekdays",
            DayGroup::Weekend => "Weekend",
            DayGroup::Single(day) => weekday_name(day),
        }
    }
}

/// One-shot alarm that replaces the recurring slot of its day.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct OverrideAlarm {
    pub day: Weekday,
    pub time: TimeOfDay,
}

/// Which table produced a firing or a "next alarm" answer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AlarmSource {
    Recurring,
    Override,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct NextAlarm {
    pub day: Weekday,
    pub time: TimeOfDay,
    pub source: AlarmSource,
}
