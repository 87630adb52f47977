use crate::alarm::model::TimeOfDay;
use crate::input::{EncoderInput, EncoderMode};
use crate::ui::display::{Display, center_print};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PickerStage {
    Hour,
    Minute,
}

/// Modal hour-then-minute picker driven by the encoder in value mode.
pub struct TimePicker {
    stage: PickerStage,
    hour: u8,
    minute: u8,
}

impl TimePicker {
    /// Takes over the encoder and draws the picker at 00:00.
    pub fn start(encoder: &EncoderInput, display: &mut dyn Display) -> Self {
        encoder.set_mode(EncoderMode::Value);
        encoder.set_value(0);
        let picker = Self {
            stage: PickerStage::Hour,
            hour: 0,
            minute: 0,
        };
        display.show_cursor(false);
        display.clear();
        center_print(display, "Alarm time", 0);
        picker.render(display);
        picker
    }

    #[cfg(test)]
    pub fn stage(&self) -> PickerStage {
        self.stage
    }

    /// Folds the encoder counter into the active field. Turning below zero
    /// wraps to the top of the range.
    pub fn poll(&mut self, encoder: &EncoderInput, display: &mut dyn Display) {
        if !encoder.take_dirty() {
            return;
        }
        let modulus = match self.stage {
            PickerStage::Hour => 24,
            PickerStage::Minute => 60,
        };
        let mut raw = encoder.value();
        if raw < 0 {
            raw = modulus - 1;
            encoder.set_value(raw);
        }
        let value = (raw % modulus) as u8;
        match self.stage {
            PickerStage::Hour => self.hour = value,
            PickerStage::Minute => self.minute = value,
        }
        self.render(display);
    }

    /// Locks the current field. Returns the time once both are chosen and
    /// hands the encoder back as idle.
    pub fn confirm(&mut self, encoder: &EncoderInput) -> Option<TimeOfDay> {
        match self.stage {
            PickerStage::Hour => {
                self.stage = PickerStage::Minute;
                encoder.set_value(0);
                None
            }
            PickerStage::Minute => {
                encoder.set_mode(EncoderMode::Idle);
                Some(TimeOfDay::from_minute_of_day(
                    u32::from(self.hour) * 60 + u32::from(self.minute),
                ))
            }
        }
    }

    fn render(&self, display: &mut dyn Display) {
        center_print(display, &format!("{:02}:{:02}", self.hour, self.minute), 1);
    }
}
