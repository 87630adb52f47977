//! Rotary encoder and push-button state shared between the edge handler
//! and the main loop.
//!
//! The edge handler only adds to counters and raises flags; the main loop
//! reads and resets them between iterations. No locks, no blocking work on
//! the producer side.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, Ordering};

const NO_EDGE: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EncoderMode {
    /// Edges are dropped.
    Idle,
    /// Edges adjust the numeric picker counter.
    Value,
    /// Edges move the menu cursor.
    Menu,
}

impl EncoderMode {
    fn to_raw(self) -> u8 {
        match self {
            EncoderMode::Idle => 0,
            EncoderMode::Value => 1,
            EncoderMode::Menu => 2,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => EncoderMode::Value,
            2 => EncoderMode::Menu,
            _ => EncoderMode::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DebounceSettings {
    pub menu_ms: u64,
    pub value_ms: u64,
}

pub struct EncoderInput {
    mode: AtomicU8,
    value: AtomicI32,
    menu_delta: AtomicI32,
    dirty: AtomicBool,
    last_edge_ms: AtomicU64,
    debounce: DebounceSettings,
}

impl EncoderInput {
    pub fn new(debounce: DebounceSettings) -> Self {
        Self {
            mode: AtomicU8::new(EncoderMode::Idle.to_raw()),
            value: AtomicI32::new(0),
            menu_delta: AtomicI32::new(0),
            dirty: AtomicBool::new(false),
            last_edge_ms: AtomicU64::new(NO_EDGE),
            debounce,
        }
    }

    pub fn mode(&self) -> EncoderMode {
        EncoderMode::from_raw(self.mode.load(Ordering::Acquire))
    }

    /// Switches consumer. Pending menu movement is discarded.
    pub fn set_mode(&self, mode: EncoderMode) {
        self.menu_delta.store(0, Ordering::Release);
        self.mode.store(mode.to_raw(), Ordering::Release);
    }

    /// One falling edge on the clock pin. A high direction pin means a step
    /// down. Returns whether the edge was counted.
    pub fn on_edge(&self, direction_high: bool, now_ms: u64) -> bool {
        let mode = self.mode();
        let window = match mode {
            EncoderMode::Idle => return false,
            EncoderMode::Value => self.debounce.value_ms,
            EncoderMode::Menu => self.debounce.menu_ms,
        };
        let last = self.last_edge_ms.load(Ordering::Acquire);
        if last != NO_EDGE && now_ms.saturating_sub(last) < window {
            return false;
        }
        self.last_edge_ms.store(now_ms, Ordering::Release);

        let step = if direction_high { -1 } else { 1 };
        match mode {
            EncoderMode::Value => self.value.fetch_add(step, Ordering::AcqRel),
            EncoderMode::Menu => self.menu_delta.fetch_add(step, Ordering::AcqRel),
            EncoderMode::Idle => unreachable!("idle edges return early"),
        };
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Menu steps accumulated since the last call.
    pub fn take_menu_delta(&self) -> i32 {
        self.menu_delta.swap(0, Ordering::AcqRel)
    }

    pub fn value(&self) -> i32 {
        self.value.load(Ordering::Acquire)
    }

    pub fn set_value(&self, value: i32) {
        self.value.store(value, Ordering::Release);
    }

    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }
}

/// The encoder's push switch.
pub struct ConfirmButton {
    pressed: AtomicBool,
    last_press_ms: AtomicU64,
    debounce_ms: u64,
}

impl ConfirmButton {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pressed: AtomicBool::new(false),
            last_press_ms: AtomicU64::new(NO_EDGE),
            debounce_ms,
        }
    }

    /// Returns whether the press was registered.
    pub fn on_press(&self, now_ms: u64) -> bool {
        let last = self.last_press_ms.load(Ordering::Acquire);
        if last != NO_EDGE && now_ms.saturating_sub(last) < self.debounce_ms {
            return false;
        }
        self.last_press_ms.store(now_ms, Ordering::Release);
        self.pressed.store(true, Ordering::Release);
        true
    }

    pub fn take_press(&self) -> bool {
        self.pressed.swap(false, Ordering::AcqRel)
    }
}
