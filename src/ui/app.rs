//! The device main loop: clock, alarm trigger, menu and offline portal.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Weekday;
use log::{debug, error, info, trace, warn};

use crate::alarm::model::{DayGroup, TimeOfDay, weekday_name};
use crate::alarm::scheduler::AlarmSchedule;
use crate::alarm::sounds::{AbortableWait, AlarmSoundLibrary, Buzzer, SoundId};
use crate::alarm::storage::StorageError;
use crate::alarm::trigger::{AlarmTrigger, TriggerDecision};
use crate::api::{ConfigPortal, PortalConfig, PortalHandler, PortalStatus};
use crate::clock::{ClockModel, Rollover, WallTime};
use crate::input::{ConfirmButton, EncoderInput, EncoderMode};
use crate::link::{NetworkLink, WifiCredentials};
use crate::time_provider::{NetworkTime, TickSource};
use crate::ui::display::{DOWN_ARROW, DOWN_ARROW_SLOT, Display, center_print};
use crate::ui::menu::{MenuAction, MenuController, MenuId};
use crate::ui::picker::TimePicker;
use crate::ui::render;

const LOOP_PERIOD: Duration = Duration::from_millis(20);
const PORTAL_POLL: Duration = Duration::from_millis(200);
const REMOVED_MESSAGE_MS: u64 = 1_000;
const DISMISS_MESSAGE_MS: u64 = 1_500;
const PRESS_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub resync_interval: Duration,
    pub sync_retry_delay: Duration,
    pub backlight_timeout: Duration,
    pub hostname: String,
    pub credentials: WifiCredentials,
}

/// Hardware seams handed to the device at boot.
pub struct Peripherals {
    pub display: Box<dyn Display>,
    pub buzzer: Box<dyn Buzzer>,
    pub time_source: Box<dyn NetworkTime>,
    pub ticks: Box<dyn TickSource>,
    pub link: Box<dyn NetworkLink>,
    pub encoder: Arc<EncoderInput>,
    pub button: Arc<ConfirmButton>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum PickPurpose {
    Days(DayGroup),
    Override,
}

enum Screen {
    Main,
    Menu,
    Picker {
        picker: TimePicker,
        purpose: PickPurpose,
    },
    Message {
        until_ms: u64,
        then: MenuId,
    },
}

/// Stops playback when the knob is pressed.
struct ButtonWait<'a> {
    button: &'a ConfirmButton,
}

impl AbortableWait for ButtonWait<'_> {
    fn wait_ms(&mut self, duration_ms: u32) -> bool {
        let deadline = Instant::now() + Duration::from_millis(u64::from(duration_ms));
        loop {
            if self.button.take_press() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(PRESS_POLL));
        }
    }
}

pub struct DeviceApp {
    clock: ClockModel,
    schedule: AlarmSchedule,
    trigger: AlarmTrigger,
    sounds: AlarmSoundLibrary,
    menu: MenuController,
    screen: Screen,
    pending_sound: Option<SoundId>,
    pending_override: Option<TimeOfDay>,
    encoder: Arc<EncoderInput>,
    button: Arc<ConfirmButton>,
    display: Box<dyn Display>,
    buzzer: Box<dyn Buzzer>,
    time_source: Box<dyn NetworkTime>,
    ticks: Box<dyn TickSource>,
    link: Box<dyn NetworkLink>,
    settings: DeviceSettings,
    backlight_on: bool,
    backlight_since_ms: u64,
    offline: bool,
    portal_address: Option<String>,
}

impl DeviceApp {
    pub fn new(
        clock: ClockModel,
        schedule: AlarmSchedule,
        sounds: AlarmSoundLibrary,
        peripherals: Peripherals,
        settings: DeviceSettings,
    ) -> Self {
        Self {
            clock,
            schedule,
            trigger: AlarmTrigger::new(),
            sounds,
            menu: MenuController::new(),
            screen: Screen::Main,
            pending_sound: None,
            pending_override: None,
            encoder: peripherals.encoder,
            button: peripherals.button,
            display: peripherals.display,
            buzzer: peripherals.buzzer,
            time_source: peripherals.time_source,
            ticks: peripherals.ticks,
            link: peripherals.link,
            settings,
            backlight_on: false,
            backlight_since_ms: 0,
            offline: false,
            portal_address: None,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    #[cfg(test)]
    pub fn schedule(&self) -> &AlarmSchedule {
        &self.schedule
    }

    #[cfg(test)]
    pub fn menu(&self) -> &MenuController {
        &self.menu
    }

    pub fn backlight_on(&self) -> bool {
        self.backlight_on
    }

    /// Brings the link up and syncs, or falls back to offline mode.
    pub fn boot(&mut self) {
        let now_ms = self.ticks.now_ms();
        self.display.define_glyph(DOWN_ARROW_SLOT, DOWN_ARROW);
        self.set_backlight(true, now_ms);
        self.display.clear();
        center_print(self.display.as_mut(), "Connecting...", 1);
        self.flush_display();

        let credentials = self.settings.credentials.clone();
        if self.connect_link(&credentials) {
            self.sync_now();
            let now_ms = self.ticks.now_ms();
            self.advance_clock(now_ms);
            self.draw_main();
        } else {
            render::draw_message(self.display.as_mut(), "Connection failed!");
            self.flush_display();
            self.enter_offline();
        }
    }

    /// One pass of the normal loop.
    pub fn step(&mut self) {
        let now_ms = self.ticks.now_ms();

        if matches!(self.screen, Screen::Main)
            && self
                .clock
                .resync_due(now_ms, self.settings.resync_interval)
        {
            self.sync_now();
        }
        // The shown time only moves on the main screen; menus keep the
        // minute they were opened in.
        let rollover = if matches!(self.screen, Screen::Main) {
            self.advance_clock(now_ms)
        } else {
            Rollover::default()
        };

        if matches!(self.screen, Screen::Main | Screen::Menu) {
            let now = self.derived_now();
            match self.trigger.evaluate(&now, &mut self.schedule) {
                TriggerDecision::Ring { sound, .. } => self.ring(sound),
                TriggerDecision::Suppressed(source) => {
                    debug!("{source:?} alarm suppressed");
                    self.refresh_main();
                }
                TriggerDecision::Quiet | TriggerDecision::Handled | TriggerDecision::Ringing => {}
            }
        }

        match self.screen {
            Screen::Main => {
                if self.backlight_on
                    && u128::from(now_ms.saturating_sub(self.backlight_since_ms))
                        > self.settings.backlight_timeout.as_millis()
                {
                    self.set_backlight(false, now_ms);
                }
                if rollover.day {
                    info!("day rollover, now {}", weekday_name(self.clock.now().weekday));
                } else if rollover.hour {
                    debug!("hour rollover at {}", self.clock.now());
                } else if rollover.minute {
                    trace!("minute rollover at {}", self.clock.now());
                }
                if rollover.second {
                    self.draw_main();
                }
            }
            Screen::Menu => {
                self.backlight_since_ms = now_ms;
                let delta = self.encoder.take_menu_delta();
                if delta != 0 {
                    self.menu.move_cursor(delta, self.display.as_mut());
                }
            }
            Screen::Picker { ref mut picker, .. } => {
                self.backlight_since_ms = now_ms;
                picker.poll(&self.encoder, self.display.as_mut());
            }
            Screen::Message { until_ms, then } => {
                self.backlight_since_ms = now_ms;
                if now_ms >= until_ms {
                    self.open_menu(then);
                }
            }
        }

        if self.button.take_press() {
            self.handle_press(now_ms);
        }
        self.flush_display();
    }

    fn handle_press(&mut self, now_ms: u64) {
        if !self.backlight_on {
            self.set_backlight(true, now_ms);
            return;
        }
        match mem::replace(&mut self.screen, Screen::Main) {
            Screen::Main => self.open_menu(MenuId::Main),
            Screen::Menu => {
                self.screen = Screen::Menu;
                if let Some(action) = self.menu.confirm() {
                    self.execute(action, now_ms);
                }
            }
            Screen::Picker {
                mut picker,
                purpose,
            } => match picker.confirm(&self.encoder) {
                Some(time) => self.finish_pick(purpose, time, now_ms),
                None => self.screen = Screen::Picker { picker, purpose },
            },
            message @ Screen::Message { .. } => self.screen = message,
        }
    }

    fn execute(&mut self, action: MenuAction, now_ms: u64) {
        debug!("menu action {action:?}");
        match action {
            MenuAction::Close => self.close_menu(),
            MenuAction::Open(menu) => self.open_menu(menu),
            MenuAction::ToggleDismiss => {
                let text = if self.schedule.toggle_dismiss() {
                    "Next alarm dismissed"
                } else {
                    "Next alarm resumed"
                };
                self.show_message(text, DISMISS_MESSAGE_MS, MenuId::Main, now_ms);
            }
            MenuAction::PickOverrideTime => self.start_picker(PickPurpose::Override),
            MenuAction::RemoveOverride => {
                let result = self.schedule.clear_override();
                if self.saved(result, MenuId::Main, now_ms) {
                    self.show_message(
                        "Next alarm removed",
                        REMOVED_MESSAGE_MS,
                        MenuId::Main,
                        now_ms,
                    );
                }
            }
            MenuAction::UpdateTime => {
                self.menu.close();
                render::draw_updating_time(self.display.as_mut());
                self.flush_display();
                self.sync_now();
                self.advance_clock(self.ticks.now_ms());
                self.close_menu();
            }
            MenuAction::TestAlarm => {
                let sound = self.schedule.sound();
                self.play_until_pressed(sound);
                self.open_menu(MenuId::Main);
            }
            MenuAction::SetupWifi => {
                self.link.disconnect();
                self.enter_offline();
            }
            MenuAction::PickDayTime(group) => self.start_picker(PickPurpose::Days(group)),
            MenuAction::RemoveDays(group) => {
                let result = self.schedule.clear_days(group);
                if self.saved(result, MenuId::RemoveDays, now_ms) {
                    self.show_message(
                        "Alarm removed",
                        REMOVED_MESSAGE_MS,
                        MenuId::RemoveDays,
                        now_ms,
                    );
                }
            }
            MenuAction::ChooseSound(sound) => {
                self.pending_sound = Some(sound);
                self.open_menu(MenuId::SoundConfirm);
            }
            MenuAction::ConfirmSound => {
                if let Some(sound) = self.pending_sound.take() {
                    let result = self.schedule.set_sound(sound);
                    if !self.saved(result, MenuId::Sounds, now_ms) {
                        return;
                    }
                }
                self.open_menu(MenuId::Sounds);
            }
            MenuAction::CancelSound => {
                self.pending_sound = None;
                self.open_menu(MenuId::Sounds);
            }
            MenuAction::TestChosenSound => {
                let sound = self.pending_sound.unwrap_or(self.schedule.sound());
                self.play_until_pressed(sound);
                self.open_menu(MenuId::SoundConfirm);
            }
            MenuAction::OverrideToday | MenuAction::OverrideTomorrow => {
                let today = self.derived_now().weekday;
                let day: Weekday = if action == MenuAction::OverrideToday {
                    today
                } else {
                    today.succ()
                };
                if let Some(time) = self.pending_override.take() {
                    let result = self.schedule.set_override(day, time);
                    if !self.saved(result, MenuId::Main, now_ms) {
                        return;
                    }
                }
                self.open_menu(MenuId::Main);
            }
        }
    }

    fn finish_pick(&mut self, purpose: PickPurpose, time: TimeOfDay, now_ms: u64) {
        match purpose {
            PickPurpose::Days(group) => {
                let result = self.schedule.set_days(group, time);
                if self.saved(result, MenuId::SetupDays, now_ms) {
                    self.open_menu(MenuId::SetupDays);
                }
            }
            PickPurpose::Override => {
                self.pending_override = Some(time);
                self.open_menu(MenuId::OverrideDay);
            }
        }
    }

    /// Reports a failed save on screen. The schedule already kept its
    /// previous values.
    fn saved(&mut self, result: Result<(), StorageError>, then: MenuId, now_ms: u64) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                error!("alarm settings not saved: {err}");
                self.show_message("Save failed", DISMISS_MESSAGE_MS, then, now_ms);
                false
            }
        }
    }

    fn open_menu(&mut self, menu: MenuId) {
        self.screen = Screen::Menu;
        self.encoder.set_mode(EncoderMode::Menu);
        self.menu.open(menu, &self.sounds, self.display.as_mut());
    }

    /// Leaves the menu. Time spent in menus can leave the shown minute
    /// behind the tick counter, which forces a resync.
    fn close_menu(&mut self) {
        self.menu.close();
        self.encoder.set_mode(EncoderMode::Idle);
        self.screen = Screen::Main;
        let now_ms = self.ticks.now_ms();
        if self.clock.minute_diverged(now_ms) {
            info!("minute drifted while in menus, resyncing");
            self.sync_now();
        }
        self.advance_clock(self.ticks.now_ms());
        self.backlight_since_ms = now_ms;
        self.draw_main();
    }

    fn start_picker(&mut self, purpose: PickPurpose) {
        self.menu.close();
        let picker = TimePicker::start(&self.encoder, self.display.as_mut());
        self.screen = Screen::Picker { picker, purpose };
    }

    fn show_message(&mut self, text: &str, duration_ms: u64, then: MenuId, now_ms: u64) {
        self.menu.close();
        self.encoder.set_mode(EncoderMode::Idle);
        render::draw_message(self.display.as_mut(), text);
        self.screen = Screen::Message {
            until_ms: now_ms + duration_ms,
            then,
        };
    }

    fn ring(&mut self, sound: SoundId) {
        let now_ms = self.ticks.now_ms();
        self.set_backlight(true, now_ms);
        render::draw_wake_up(self.display.as_mut());
        self.flush_display();
        let mut wait = ButtonWait {
            button: &self.button,
        };
        let passes = self
            .sounds
            .play_until_aborted(sound, self.buzzer.as_mut(), &mut wait);
        info!("alarm stopped after {passes} pass(es)");
        self.trigger.confirm(&mut self.schedule);
        self.restore_screen();
    }

    fn play_until_pressed(&mut self, sound: SoundId) {
        self.set_backlight(true, self.ticks.now_ms());
        render::draw_wake_up(self.display.as_mut());
        self.flush_display();
        let mut wait = ButtonWait {
            button: &self.button,
        };
        self.sounds
            .play_until_aborted(sound, self.buzzer.as_mut(), &mut wait);
    }

    fn restore_screen(&mut self) {
        let now_ms = self.ticks.now_ms();
        self.backlight_since_ms = now_ms;
        match self.screen {
            Screen::Menu => self.menu.render(self.display.as_mut()),
            _ => {
                self.advance_clock(now_ms);
                self.draw_main();
            }
        }
    }

    fn refresh_main(&mut self) {
        if matches!(self.screen, Screen::Main) {
            self.draw_main();
        }
    }

    fn advance_clock(&mut self, now_ms: u64) -> Rollover {
        self.clock.tick(now_ms)
    }

    fn derived_now(&self) -> WallTime {
        WallTime::from_local_seconds(self.clock.local_seconds_at(self.ticks.now_ms()))
    }

    fn sync_now(&mut self) {
        let attempts = self.clock.sync_blocking(
            self.time_source.as_mut(),
            self.ticks.as_ref(),
            self.settings.sync_retry_delay,
        );
        debug!("time synced after {attempts} attempt(s)");
    }

    fn draw_main(&mut self) {
        let now = self.clock.now();
        let next = self.schedule.next_firing(&now);
        render::draw_main_screen(
            self.display.as_mut(),
            &now,
            next,
            self.schedule.dismiss_pending(),
        );
    }

    fn set_backlight(&mut self, on: bool, now_ms: u64) {
        self.backlight_on = on;
        self.backlight_since_ms = now_ms;
        self.display.set_backlight(on);
    }

    fn connect_link(&mut self, credentials: &WifiCredentials) -> bool {
        let display = &mut self.display;
        let result = self.link.connect(credentials, &mut |remaining| {
            render::draw_link_retry(display.as_mut(), remaining);
            if let Err(err) = display.flush() {
                warn!("display update failed: {err}");
            }
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("{err}");
                false
            }
        }
    }

    fn enter_offline(&mut self) {
        info!("entering offline mode");
        self.menu.close();
        self.encoder.set_mode(EncoderMode::Idle);
        self.screen = Screen::Main;
        self.offline = true;
    }

    pub fn show_portal(&mut self, address: &str) {
        self.portal_address = Some(address.to_string());
        self.set_backlight(true, self.ticks.now_ms());
        render::draw_portal(self.display.as_mut(), address);
        self.flush_display();
    }

    fn flush_display(&mut self) {
        if let Err(err) = self.display.flush() {
            warn!("display update failed: {err}");
        }
    }
}

impl PortalHandler for DeviceApp {
    fn status(&self) -> PortalStatus {
        let now = self.clock.now();
        PortalStatus {
            hostname: self.settings.hostname.clone(),
            offline: self.offline,
            time: now.to_string(),
            next_alarm: self
                .schedule
                .next_firing(&now)
                .map(|next| render::next_alarm_line(next, self.schedule.dismiss_pending())),
            dismiss_pending: self.schedule.dismiss_pending(),
            sound: self.sounds.get(self.schedule.sound()).name.to_string(),
        }
    }

    fn set_wifi(&mut self, credentials: WifiCredentials) -> bool {
        info!("portal requested network '{}'", credentials.ssid);
        self.set_backlight(true, self.ticks.now_ms());
        render::draw_connecting(self.display.as_mut(), &credentials.ssid);
        self.flush_display();
        if self.link.is_connected() {
            self.link.disconnect();
        }

        if !self.connect_link(&credentials) {
            if let Some(address) = self.portal_address.clone() {
                self.show_portal(&address);
            }
            return false;
        }
        self.settings.credentials = credentials;
        self.offline = false;
        self.sync_now();
        self.advance_clock(self.ticks.now_ms());
        self.draw_main();
        self.flush_display();
        true
    }
}

/// Runs until `quit` is raised. Offline periods serve the portal instead of
/// the normal loop.
pub fn run(mut app: DeviceApp, portal_config: PortalConfig, quit: &AtomicBool) -> Result<()> {
    app.boot();
    let mut portal: Option<ConfigPortal> = None;
    while !quit.load(Ordering::Acquire) {
        if app.is_offline() {
            if portal.is_none() {
                let started = ConfigPortal::start(&portal_config).with_context(|| {
                    format!(
                        "failed to start configuration portal at {}:{}",
                        portal_config.bind_addr, portal_config.port
                    )
                })?;
                app.show_portal(&started.display_address());
                portal = Some(started);
            }
            if let Some(active) = &portal {
                active.poll(PORTAL_POLL, &mut app);
            }
            continue;
        }
        if portal.take().is_some() {
            info!("back online, configuration portal stopped");
        }
        app.step();
        thread::sleep(LOOP_PERIOD);
    }
    info!("powering off");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use chrono::NaiveDate;

    use super::*;
    use crate::alarm::model::AlarmSource;
    use crate::alarm::sounds::tests::RecordingBuzzer;
    use crate::alarm::storage::tests::SharedStorage;
    use crate::clock::ClockSettings;
    use crate::dst::DstRule;
    use crate::input::DebounceSettings;
    use crate::link::tests::ScriptedLink;
    use crate::time_provider::tests::{FixedTime, ManualTicks, TickingTime};
    use crate::ui::display::tests::SharedGrid;
    use crate::ui::menu::MenuState;

    struct Harness {
        app: DeviceApp,
        grid: SharedGrid,
        ticks: Rc<ManualTicks>,
        storage: SharedStorage,
        encoder: Arc<EncoderInput>,
        button: Arc<ConfirmButton>,
        syncs: Rc<Cell<u32>>,
        input_ms: u64,
    }

    /// Monday 2025-06-02 at the given UTC time.
    fn monday(hour: u32, minute: u32, second: u32) -> i64 {
        NaiveDate::from_ymd_opt(2025, 6, 2)
            .expect("valid date")
            .and_hms_opt(hour, minute, second)
            .expect("valid time")
            .and_utc()
            .timestamp()
    }

    fn at(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).expect("valid time")
    }

    fn harness_with(epoch: i64, link_outcomes: Vec<bool>, storage: SharedStorage) -> Harness {
        build_harness(link_outcomes, storage, |_, calls| {
            Box::new(FixedTime { epoch, calls })
        })
    }

    /// Harness whose time server keeps counting with the tick counter, so a
    /// resync lands on the same second the ticks derive.
    fn ticking_harness(epoch: i64, storage: SharedStorage) -> Harness {
        build_harness(Vec::new(), storage, |ticks, calls| {
            Box::new(TickingTime {
                epoch_at_zero: epoch - (ticks.now_ms() / 1_000) as i64,
                ticks: Rc::clone(ticks),
                calls,
            })
        })
    }

    fn build_harness(
        link_outcomes: Vec<bool>,
        storage: SharedStorage,
        time_source: impl FnOnce(&Rc<ManualTicks>, Rc<Cell<u32>>) -> Box<dyn NetworkTime>,
    ) -> Harness {
        let grid = SharedGrid::default();
        let ticks = Rc::new(ManualTicks::default());
        ticks.advance(1_000);
        let encoder = Arc::new(EncoderInput::new(DebounceSettings {
            menu_ms: 100,
            value_ms: 50,
        }));
        let button = Arc::new(ConfirmButton::new(200));
        let syncs = Rc::new(Cell::new(0));
        let sounds = AlarmSoundLibrary::standard();
        let (schedule, _) =
            AlarmSchedule::load(Box::new(storage.clone()), &sounds).expect("load schedule");
        let clock = ClockModel::new(ClockSettings {
            utc_offset_secs: 0,
            dst_rule: DstRule::Off,
        });
        let app = DeviceApp::new(
            clock,
            schedule,
            sounds,
            Peripherals {
                display: Box::new(grid.clone()),
                buzzer: Box::new(RecordingBuzzer::default()),
                time_source: time_source(&ticks, Rc::clone(&syncs)),
                ticks: Box::new(Rc::clone(&ticks)),
                link: Box::new(ScriptedLink {
                    outcomes: VecDeque::from(link_outcomes),
                    ..ScriptedLink::default()
                }),
                encoder: Arc::clone(&encoder),
                button: Arc::clone(&button),
            },
            DeviceSettings {
                resync_interval: Duration::from_secs(300),
                sync_retry_delay: Duration::ZERO,
                backlight_timeout: Duration::from_secs(10),
                hostname: "dialclock".to_string(),
                credentials: WifiCredentials::default(),
            },
        );
        Harness {
            app,
            grid,
            ticks,
            storage,
            encoder,
            button,
            syncs,
            input_ms: 0,
        }
    }

    fn booted(epoch: i64) -> Harness {
        let mut harness = harness_with(epoch, Vec::new(), SharedStorage::blank());
        harness.app.boot();
        harness
    }

    impl Harness {
        fn press(&mut self) {
            self.input_ms += 1_000;
            assert!(self.button.on_press(self.input_ms));
            self.app.step();
        }

        fn turn(&mut self, steps: i32) {
            for _ in 0..steps.unsigned_abs() {
                self.input_ms += 1_000;
                self.encoder.on_edge(steps < 0, self.input_ms);
            }
            self.app.step();
        }

        fn cursor(&self) -> usize {
            match self.app.menu().state() {
                MenuState::Open { cursor, .. } => cursor,
                MenuState::Closed => panic!("menu closed"),
            }
        }

        fn open_menu_item(&mut self, steps: i32) {
            self.press();
            self.turn(steps);
            self.press();
        }
    }

    #[test]
    fn boot_syncs_and_draws_main_screen() {
        let harness = booted(monday(6, 30, 15));
        assert!(!harness.app.is_offline());
        assert!(harness.app.backlight_on());
        assert_eq!(harness.syncs.get(), 1);
        assert_eq!(harness.grid.row(0).trim(), "06:30:15");
        assert_eq!(harness.grid.row(2).trim(), "");
    }

    #[test]
    fn setting_a_day_alarm_through_the_menu_persists_it() {
        let mut harness = booted(monday(6, 0, 0));

        harness.open_menu_item(1);
        assert_eq!(
            harness.app.menu().state(),
            MenuState::Open {
                menu: MenuId::SetupDays,
                cursor: 0,
                window_start: 0
            }
        );
        // Tuesday
        harness.turn(4);
        harness.press();
        assert_eq!(harness.grid.row(0).trim(), "Alarm time");
        assert_eq!(harness.encoder.mode(), EncoderMode::Value);

        harness.turn(7);
        assert_eq!(harness.grid.row(1).trim(), "07:00");
        harness.press();
        harness.turn(-1);
        assert_eq!(harness.grid.row(1).trim(), "07:59");
        harness.press();

        assert_eq!(
            harness.app.schedule().weekly().get(Weekday::Tue),
            Some(at(7, 59))
        );
        assert_eq!(harness.encoder.mode(), EncoderMode::Menu);
        assert!(harness.grid.row(0).starts_with("Back"));

        harness.storage.0.borrow_mut().power_cycle();
        let (reloaded, _) = AlarmSchedule::load(
            Box::new(harness.storage.clone()),
            &AlarmSoundLibrary::standard(),
        )
        .expect("reload");
        assert_eq!(reloaded.weekly().get(Weekday::Tue), Some(at(7, 59)));
    }

    #[test]
    fn back_item_closes_menu_and_shows_next_alarm() {
        let storage = SharedStorage::blank();
        {
            let (mut schedule, _) =
                AlarmSchedule::load(Box::new(storage.clone()), &AlarmSoundLibrary::standard())
                    .expect("load");
            schedule
                .set_days(DayGroup::Single(Weekday::Tue), at(7, 0))
                .expect("set");
        }
        let mut harness = harness_with(monday(8, 0, 0), Vec::new(), storage);
        harness.app.boot();
        assert_eq!(harness.grid.row(2).trim(), "Next alarm:");
        assert_eq!(harness.grid.row(3).trim(), "07:00 Tuesday");

        harness.press();
        assert!(harness.app.menu().is_open());
        harness.press();
        assert!(!harness.app.menu().is_open());
        assert_eq!(harness.encoder.mode(), EncoderMode::Idle);
        assert_eq!(harness.grid.row(0).trim(), "08:00:00");
    }

    #[test]
    fn menu_cursor_follows_the_encoder() {
        let mut harness = booted(monday(6, 0, 0));
        harness.press();
        harness.turn(5);
        assert_eq!(harness.cursor(), 5);
        harness.turn(-2);
        assert_eq!(harness.cursor(), 3);
        harness.turn(40);
        assert_eq!(harness.cursor(), 9);
    }

    #[test]
    fn dismiss_toggle_shows_message_then_returns_to_menu() {
        let mut harness = booted(monday(6, 0, 0));
        harness.open_menu_item(2);
        assert!(harness.app.schedule().dismiss_pending());
        assert_eq!(harness.grid.row(1).trim(), "Next alarm dismissed");
        assert!(!harness.app.menu().is_open());

        harness.ticks.advance(1_000);
        harness.app.step();
        assert!(!harness.app.menu().is_open());
        harness.ticks.advance(600);
        harness.app.step();
        assert_eq!(
            harness.app.menu().state(),
            MenuState::Open {
                menu: MenuId::Main,
                cursor: 0,
                window_start: 0
            }
        );
    }

    #[test]
    fn one_off_alarm_for_tomorrow() {
        let mut harness = booted(monday(6, 0, 0));
        harness.open_menu_item(3);
        harness.turn(5);
        harness.press();
        harness.turn(15);
        harness.press();
        assert_eq!(
            harness.app.menu().state(),
            MenuState::Open {
                menu: MenuId::OverrideDay,
                cursor: 0,
                window_start: 0
            }
        );
        harness.turn(1);
        harness.press();

        let alarm = harness.app.schedule().override_alarm().expect("one-off alarm");
        assert_eq!(alarm.day, Weekday::Tue);
        assert_eq!(alarm.time, at(5, 15));
    }

    #[test]
    fn removing_weekend_alarms_confirms_on_screen() {
        let mut harness = booted(monday(6, 0, 0));
        harness.open_menu_item(5);
        harness.turn(2);
        harness.press();
        assert_eq!(harness.grid.row(1).trim(), "Alarm removed");
        harness.ticks.advance(1_000);
        harness.app.step();
        assert_eq!(
            harness.app.menu().state(),
            MenuState::Open {
                menu: MenuId::RemoveDays,
                cursor: 0,
                window_start: 0
            }
        );
    }

    #[test]
    fn sound_choice_is_saved_only_on_set() {
        let mut harness = booted(monday(6, 0, 0));
        harness.open_menu_item(6);
        harness.turn(3);
        harness.press();
        // Cancel
        harness.turn(1);
        harness.press();
        assert_eq!(harness.app.schedule().sound(), SoundId::default());

        harness.turn(3);
        harness.press();
        harness.press();
        assert_eq!(harness.app.schedule().sound().index(), 2);
    }

    #[test]
    fn due_alarm_rings_until_pressed() {
        let storage = SharedStorage::blank();
        {
            let (mut schedule, _) =
                AlarmSchedule::load(Box::new(storage.clone()), &AlarmSoundLibrary::standard())
                    .expect("load");
            schedule
                .set_override(Weekday::Mon, at(7, 0))
                .expect("set override");
        }
        let mut harness = harness_with(monday(6, 59, 59), Vec::new(), storage);
        harness.app.boot();
        harness.app.step();
        assert_eq!(
            harness.app.trigger.state(),
            crate::alarm::trigger::TriggerState::Idle
        );

        harness.ticks.advance(1_000);
        harness.input_ms += 1_000;
        harness.button.on_press(harness.input_ms);
        harness.app.step();

        assert_eq!(harness.app.schedule().override_alarm(), None);
        assert!(harness.app.backlight_on());
        assert_eq!(harness.grid.row(0).trim(), "07:00:00");

        harness.ticks.advance(1_000);
        harness.app.step();
        assert!(!harness.app.menu().is_open());
        assert_eq!(harness.grid.row(0).trim(), "07:00:01");
    }

    #[test]
    fn dismissed_alarm_does_not_ring() {
        let storage = SharedStorage::blank();
        {
            let (mut schedule, _) =
                AlarmSchedule::load(Box::new(storage.clone()), &AlarmSoundLibrary::standard())
                    .expect("load");
            schedule
                .set_days(DayGroup::Weekdays, at(7, 0))
                .expect("set");
        }
        let mut harness = harness_with(monday(6, 59, 59), Vec::new(), storage);
        harness.app.boot();
        harness.app.schedule.toggle_dismiss();

        harness.ticks.advance(1_000);
        harness.app.step();
        assert!(!harness.app.schedule().dismiss_pending());
        let now = harness.app.clock.now();
        assert_eq!(
            harness.app.trigger.evaluate(&now, &mut harness.app.schedule),
            TriggerDecision::Handled
        );
        let next = harness
            .app
            .schedule()
            .next_firing(&harness.app.clock.now())
            .expect("next alarm");
        assert_eq!((next.day, next.source), (Weekday::Tue, AlarmSource::Recurring));
    }

    fn weekday_alarm_storage() -> SharedStorage {
        let storage = SharedStorage::blank();
        let (mut schedule, _) =
            AlarmSchedule::load(Box::new(storage.clone()), &AlarmSoundLibrary::standard())
                .expect("load");
        schedule
            .set_days(DayGroup::Weekdays, at(7, 0))
            .expect("set");
        storage
    }

    impl Harness {
        /// Evaluates the trigger against the time the ticks derive.
        fn decision_now(&mut self) -> TriggerDecision {
            let now = self.app.derived_now();
            self.app.trigger.evaluate(&now, &mut self.app.schedule)
        }
    }

    #[test]
    fn alarm_dismissed_inside_menu_stays_handled_after_close() {
        let mut harness = ticking_harness(monday(6, 59, 50), weekday_alarm_storage());
        harness.app.boot();
        harness.app.schedule.toggle_dismiss();
        harness.press();
        assert!(harness.app.menu().is_open());

        harness.ticks.advance(15_000);
        harness.app.step();
        assert!(!harness.app.schedule().dismiss_pending());
        assert!(harness.app.menu().is_open());

        harness.ticks.advance(20_000);
        // Back; the shown clock still reads 06:59 so closing resyncs.
        harness.press();
        assert!(!harness.app.menu().is_open());
        assert_eq!(harness.syncs.get(), 2);
        assert_eq!(harness.grid.row(0).trim(), "07:00:25");
        assert_eq!(harness.decision_now(), TriggerDecision::Handled);
    }

    #[test]
    fn alarm_rung_inside_menu_stays_handled_after_close() {
        let mut harness = ticking_harness(monday(6, 59, 50), weekday_alarm_storage());
        harness.app.boot();
        harness.press();

        harness.ticks.advance(15_000);
        harness.input_ms += 1_000;
        harness.button.on_press(harness.input_ms);
        harness.app.step();
        assert_eq!(
            harness.app.trigger.state(),
            crate::alarm::trigger::TriggerState::Idle
        );
        assert!(harness.app.menu().is_open());

        harness.ticks.advance(20_000);
        harness.press();
        assert!(!harness.app.menu().is_open());
        assert_eq!(harness.decision_now(), TriggerDecision::Handled);
    }

    #[test]
    fn alarm_handled_inside_menu_stays_handled_after_time_update() {
        let mut harness = ticking_harness(monday(6, 59, 50), weekday_alarm_storage());
        harness.app.boot();
        harness.app.schedule.toggle_dismiss();
        harness.press();
        harness.turn(7);

        harness.ticks.advance(15_000);
        harness.app.step();
        assert!(!harness.app.schedule().dismiss_pending());

        harness.ticks.advance(20_000);
        // Update time
        harness.press();
        assert!(!harness.app.menu().is_open());
        assert_eq!(harness.grid.row(0).trim(), "07:00:25");
        assert_eq!(harness.decision_now(), TriggerDecision::Handled);
    }

    #[test]
    fn test_alarm_plays_until_a_later_press() {
        let mut harness = booted(monday(6, 0, 0));
        harness.press();
        harness.turn(8);
        let button = Arc::clone(&harness.button);
        let presser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            button.on_press(1_000_000);
        });
        harness.press();
        presser.join().expect("presser thread");
        assert_eq!(
            harness.app.menu().state(),
            MenuState::Open {
                menu: MenuId::Main,
                cursor: 0,
                window_start: 0
            }
        );
    }

    #[test]
    fn backlight_times_out_and_first_press_only_wakes() {
        let mut harness = booted(monday(6, 0, 0));
        harness.ticks.advance(10_500);
        harness.app.step();
        assert!(!harness.app.backlight_on());
        assert!(!harness.grid.0.borrow().backlight());

        harness.press();
        assert!(harness.app.backlight_on());
        assert!(!harness.app.menu().is_open());
        harness.press();
        assert!(harness.app.menu().is_open());
    }

    #[test]
    fn periodic_resync_runs_only_with_menu_closed() {
        let mut harness = booted(monday(6, 0, 0));
        harness.press();
        harness.ticks.advance(301_000);
        harness.app.step();
        assert_eq!(harness.syncs.get(), 1);

        harness.press();
        // Back closes the menu; the tick counter moved past the shown minute.
        assert_eq!(harness.syncs.get(), 2);
        harness.app.step();
        assert_eq!(harness.syncs.get(), 2);
    }

    #[test]
    fn failed_link_enters_offline_mode_until_portal_credentials_work() {
        let mut harness = harness_with(
            monday(6, 0, 0),
            vec![false, false, true],
            SharedStorage::blank(),
        );
        harness.app.boot();
        assert!(harness.app.is_offline());
        assert_eq!(harness.syncs.get(), 0);
        harness.app.show_portal("192.168.4.1:80");
        assert_eq!(harness.grid.row(1).trim(), "IP: 192.168.4.1:80");

        let credentials = WifiCredentials {
            ssid: "home".to_string(),
            passwd: "pw".to_string(),
        };
        assert!(!harness.app.set_wifi(credentials.clone()));
        assert!(harness.app.is_offline());
        assert_eq!(harness.grid.row(1).trim(), "IP: 192.168.4.1:80");

        assert!(harness.app.set_wifi(credentials));
        assert!(!harness.app.is_offline());
        assert_eq!(harness.syncs.get(), 1);
        assert_eq!(harness.grid.row(0).trim(), "06:00:00");
        assert!(harness.app.status().time.starts_with("06:00"));
    }

    #[test]
    fn setup_wifi_item_switches_to_offline_mode() {
        let mut harness = booted(monday(6, 0, 0));
        harness.open_menu_item(9);
        assert!(harness.app.is_offline());
        assert!(!harness.app.menu().is_open());
        assert_eq!(harness.encoder.mode(), EncoderMode::Idle);
    }
}
