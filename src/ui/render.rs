//! Fixed screens drawn outside the menu.

use crate::alarm::model::{NextAlarm, weekday_name};
use crate::clock::WallTime;
use crate::ui::display::{Display, center_print};

pub fn draw_main_screen(
    display: &mut dyn Display,
    now: &WallTime,
    next: Option<NextAlarm>,
    dismissed: bool,
) {
    display.clear();
    display.show_cursor(false);
    center_print(display, &now.to_string(), 0);
    if let Some(next) = next {
        center_print(display, "Next alarm:", 2);
        center_print(display, &next_alarm_line(next, dismissed), 3);
    }
}

/// `HH:MM Dayname [D]`, the marker left empty when not dismissed.
pub fn next_alarm_line(next: NextAlarm, dismissed: bool) -> String {
    let marker = if dismissed { "[D]" } else { "" };
    format!("{} {} {marker}", next.time, weekday_name(next.day))
}

/// Single centered line on row 1, used for short confirmations.
pub fn draw_message(display: &mut dyn Display, text: &str) {
    display.clear();
    display.show_cursor(false);
    center_print(display, text, 1);
}

pub fn draw_wake_up(display: &mut dyn Display) {
    display.set_backlight(true);
    draw_message(display, "WAKE UP!");
}

pub fn draw_updating_time(display: &mut dyn Display) {
    draw_message(display, "Updating time...");
}

pub fn draw_link_retry(display: &mut dyn Display, remaining: u32) {
    center_print(display, &format!("Retries: {remaining}"), 2);
}

pub fn draw_connecting(display: &mut dyn Display, network: &str) {
    display.clear();
    display.show_cursor(false);
    center_print(display, "Connecting to:", 0);
    center_print(display, network, 1);
}

/// Offline mode: only the portal address is shown.
pub fn draw_portal(display: &mut dyn Display, address: &str) {
    display.clear();
    display.show_cursor(false);
    center_print(display, &format!("IP: {address}"), 1);
}
