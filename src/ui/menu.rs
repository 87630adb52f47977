use chrono::Weekday;

use crate::alarm::model::DayGroup;
use crate::alarm::sounds::{AlarmSoundLibrary, SoundId};
use crate::ui::display::{COLUMNS, DOWN_ARROW_SLOT, Display, ROWS};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MenuId {
    Main,
    SetupDays,
    RemoveDays,
    Sounds,
    SoundConfirm,
    OverrideDay,
}

/// What a menu item does when confirmed. Bound when the list is built.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MenuAction {
    Close,
    Open(MenuId),
    ToggleDismiss,
    PickOverrideTime,
    RemoveOverride,
    UpdateTime,
    TestAlarm,
    SetupWifi,
    PickDayTime(DayGroup),
    RemoveDays(DayGroup),
    ChooseSound(SoundId),
    ConfirmSound,
    CancelSound,
    TestChosenSound,
    OverrideToday,
    OverrideTomorrow,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MenuItem {
    pub label: &'static str,
    pub action: MenuAction,
}

const fn item(label: &'static str, action: MenuAction) -> MenuItem {
    MenuItem { label, action }
}

/// Monday first, the order the day lists are shown in.
const DAY_LIST: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn menu_items(menu: MenuId, sounds: &AlarmSoundLibrary) -> Vec<MenuItem> {
    match menu {
        MenuId::Main => vec![
            item("Back", MenuAction::Close),
            item("Setup alarm", MenuAction::Open(MenuId::SetupDays)),
            item("Toggle next alarm", MenuAction::ToggleDismiss),
            item("Set one-off alarm", MenuAction::PickOverrideTime),
            item("Remove one-off alarm", MenuAction::RemoveOverride),
            item("Remove alarm", MenuAction::Open(MenuId::RemoveDays)),
            item("Change alarm sound", MenuAction::Open(MenuId::Sounds)),
            item("Update time", MenuAction::UpdateTime),
            item("Test alarm", MenuAction::TestAlarm),
            item("Setup wifi", MenuAction::SetupWifi),
        ],
        MenuId::SetupDays => day_list(MenuAction::PickDayTime),
        MenuId::RemoveDays => day_list(MenuAction::RemoveDays),
        MenuId::Sounds => std::iter::once(item("Back", MenuAction::Open(MenuId::Main)))
            .chain(
                sounds
                    .iter()
                    .map(|(id, sound)| item(sound.name, MenuAction::ChooseSound(id))),
            )
            .collect(),
        MenuId::SoundConfirm => vec![
            item("Set", MenuAction::ConfirmSound),
            item("Cancel", MenuAction::CancelSound),
            item("Test", MenuAction::TestChosenSound),
        ],
        MenuId::OverrideDay => vec![
            item("Today", MenuAction::OverrideToday),
            item("Tomorrow", MenuAction::OverrideTomorrow),
        ],
    }
}

fn day_list(action: fn(DayGroup) -> MenuAction) -> Vec<MenuItem> {
    let mut items = vec![
        item("Back", MenuAction::Open(MenuId::Main)),
        item(DayGroup::Weekdays.label(), action(DayGroup::Weekdays)),
        item(DayGroup::Weekend.label(), action(DayGroup::Weekend)),
    ];
    items.extend(DAY_LIST.into_iter().map(|day| {
        let group = DayGroup::Single(day);
        item(group.label(), action(group))
    }));
    items
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MenuState {
    Closed,
    Open {
        menu: MenuId,
        cursor: usize,
        window_start: usize,
    },
}

pub struct MenuController {
    state: MenuState,
    items: Vec<MenuItem>,
}

impl MenuController {
    pub fn new() -> Self {
        Self {
            state: MenuState::Closed,
            items: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> MenuState {
        self.state
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        matches!(self.state, MenuState::Open { .. })
    }

    #[cfg(test)]
    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    /// Shows `menu` with the cursor on its first item.
    pub fn open(&mut self, menu: MenuId, sounds: &AlarmSoundLibrary, display: &mut dyn Display) {
        self.items = menu_items(menu, sounds);
        self.state = MenuState::Open {
            menu,
            cursor: 0,
            window_start: 0,
        };
        self.render(display);
    }

    pub fn close(&mut self) {
        self.state = MenuState::Closed;
        self.items.clear();
    }

    /// Moves one item per unit of `delta`, clamped to the list. The window
    /// scrolls by one row whenever the cursor leaves it.
    pub fn move_cursor(&mut self, delta: i32, display: &mut dyn Display) {
        let MenuState::Open {
            menu,
            mut cursor,
            mut window_start,
        } = self.state
        else {
            return;
        };
        let len = self.items.len();
        let mut scrolled = false;
        for _ in 0..delta.unsigned_abs() {
            if delta > 0 {
                if cursor + 1 < len {
                    cursor += 1;
                }
            } else {
                cursor = cursor.saturating_sub(1);
            }
            if cursor >= window_start + ROWS {
                window_start += 1;
                scrolled = true;
            } else if cursor < window_start {
                window_start -= 1;
                scrolled = true;
            }
        }
        self.state = MenuState::Open {
            menu,
            cursor,
            window_start,
        };
        if scrolled {
            self.render(display);
        } else {
            display.set_cursor(0, cursor - window_start);
        }
    }

    /// The action bound to the highlighted item.
    pub fn confirm(&self) -> Option<MenuAction> {
        match self.state {
            MenuState::Open { cursor, .. } => self.items.get(cursor).map(|entry| entry.action),
            MenuState::Closed => None,
        }
    }

    pub fn render(&self, display: &mut dyn Display) {
        let MenuState::Open {
            cursor,
            window_start,
            ..
        } = self.state
        else {
            return;
        };
        display.clear();
        let scrollable = self.items.len() > ROWS;
        let visible = self.items.iter().skip(window_start).take(ROWS);
        for (row, entry) in visible.enumerate() {
            display.set_cursor(0, row);
            display.print(entry.label);
            if scrollable && row == ROWS - 1 {
                display.set_cursor(COLUMNS - 1, row);
                display.write_glyph(DOWN_ARROW_SLOT);
            }
        }
        display.show_cursor(true);
        display.set_cursor(0, cursor - window_start);
    }
}
