//! Stdin stand-in for the rotary encoder and its push switch.
//!
//! `+` turns one detent clockwise, `-` one detent back, an empty line or
//! `p` presses the knob and `q` powers the device off. Several steps can
//! share one line (`+++`).

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::input::{ConfirmButton, EncoderInput};
use crate::time_provider::TickSource;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConsoleEvent {
    Clockwise,
    CounterClockwise,
    Press,
    Quit,
}

pub fn parse_line(line: &str) -> Vec<ConsoleEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return vec![ConsoleEvent::Press];
    }
    trimmed
        .chars()
        .filter_map(|ch| match ch {
            '+' => Some(ConsoleEvent::Clockwise),
            '-' => Some(ConsoleEvent::CounterClockwise),
            'p' | 'P' => Some(ConsoleEvent::Press),
            'q' | 'Q' => Some(ConsoleEvent::Quit),
            _ => None,
        })
        .collect()
}

/// Feeds one event into the shared input state, the way the pin
/// interrupts would.
pub fn dispatch(
    event: ConsoleEvent,
    encoder: &EncoderInput,
    button: &ConfirmButton,
    now_ms: u64,
    quit: &AtomicBool,
) {
    match event {
        ConsoleEvent::Clockwise => {
            encoder.on_edge(false, now_ms);
        }
        ConsoleEvent::CounterClockwise => {
            encoder.on_edge(true, now_ms);
        }
        ConsoleEvent::Press => {
            button.on_press(now_ms);
        }
        ConsoleEvent::Quit => quit.store(true, Ordering::Release),
    }
}

pub struct ConsoleInput {
    pub encoder: Arc<EncoderInput>,
    pub button: Arc<ConfirmButton>,
    pub ticks: Arc<dyn TickSource + Send + Sync>,
    pub quit: Arc<AtomicBool>,
    /// Pause between steps typed on one line so each clears the debounce
    /// window.
    pub step_gap: Duration,
}

impl ConsoleInput {
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || {
            info!("console input ready: '+' / '-' turn, enter presses, 'q' quits");
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("console input failed: {err}");
                        break;
                    }
                };
                for event in parse_line(&line) {
                    debug!("console event {event:?}");
                    dispatch(
                        event,
                        &self.encoder,
                        &self.button,
                        self.ticks.now_ms(),
                        &self.quit,
                    );
                    thread::sleep(self.step_gap);
                }
                if self.quit.load(Ordering::Acquire) {
                    break;
                }
            }
            debug!("console input closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{DebounceSettings, EncoderMode};

    #[test]
    fn lines_map_to_encoder_events() {
        assert_eq!(parse_line(""), vec![ConsoleEvent::Press]);
        assert_eq!(parse_line("  \n"), vec![ConsoleEvent::Press]);
        assert_eq!(
            parse_line("++-"),
            vec![
                ConsoleEvent::Clockwise,
                ConsoleEvent::Clockwise,
                ConsoleEvent::CounterClockwise
            ]
        );
        assert_eq!(parse_line("p"), vec![ConsoleEvent::Press]);
        assert_eq!(parse_line("q"), vec![ConsoleEvent::Quit]);
        assert!(parse_line("xyz").is_empty());
    }

    #[test]
    fn dispatch_reaches_shared_state() {
        let encoder = EncoderInput::new(DebounceSettings {
            menu_ms: 100,
            value_ms: 50,
        });
        let button = ConfirmButton::new(200);
        let quit = AtomicBool::new(false);
        encoder.set_mode(EncoderMode::Menu);

        dispatch(ConsoleEvent::CounterClockwise, &encoder, &button, 0, &quit);
        dispatch(ConsoleEvent::Press, &encoder, &button, 0, &quit);
        assert_eq!(encoder.take_menu_delta(), -1);
        assert!(button.take_press());
        assert!(!quit.load(Ordering::Acquire));

        dispatch(ConsoleEvent::Quit, &encoder, &button, 10, &quit);
        assert!(quit.load(Ordering::Acquire));
    }
}
