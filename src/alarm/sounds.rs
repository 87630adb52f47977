use log::debug;

/// Base frequency for the melodic themes; each note step adds 500 Hz.
const NOTE_BASE_HZ: i32 = 4_000;
const NOTE_STEP_HZ: i32 = 500;

/// Index into the sound library, validated on construction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct SoundId(usize);

impl SoundId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A tone followed by a wait. Frequency 0 is a rest.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ToneStep {
    pub frequency_hz: u32,
    pub tone_ms: u32,
    pub wait_ms: u32,
}

#[derive(Debug, Clone)]
pub struct AlarmSound {
    pub name: &'static str,
    pub steps: Vec<ToneStep>,
}

/// Audio backend: starts a tone and returns without blocking.
pub trait Buzzer {
    fn tone(&mut self, frequency_hz: u32, duration_ms: u32);
}

/// Host buzzer: tones only reach the log.
pub struct LogBuzzer;

impl Buzzer for LogBuzzer {
    fn tone(&mut self, frequency_hz: u32, duration_ms: u32) {
        if frequency_hz == 0 {
            debug!("buzzer rest {duration_ms} ms");
        } else {
            debug!("buzzer {frequency_hz} Hz for {duration_ms} ms");
        }
    }
}

/// Blocking wait that stops early when the confirm control is pressed.
pub trait AbortableWait {
    /// Returns `true` if the wait was cut short.
    fn wait_ms(&mut self, duration_ms: u32) -> bool;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Playback {
    Completed,
    Aborted,
}

pub struct AlarmSoundLibrary {
    sounds: Vec<AlarmSound>,
}

impl AlarmSoundLibrary {
    pub fn standard() -> Self {
        Self {
            sounds: vec![
                AlarmSound {
                    name: "Default alarm",
                    steps: vec![step(5_000, 1_000, 1_200)],
                },
                AlarmSound {
                    name: "Rapid fire alarm",
                    steps: vec![step(5_000, 90, 100)],
                },
                AlarmSound {
                    name: "Uneven alarm",
                    steps: vec![step(5_000, 300, 400), step(500, 700, 800)],
                },
                AlarmSound {
                    name: "Scale alarm",
                    steps: scale_steps(),
                },
                AlarmSound {
                    name: "Double tone alarm",
                    steps: vec![step(5_000, 200, 240), step(5_000, 200, 500)],
                },
                AlarmSound {
                    name: "Complex presents",
                    steps: complex_presents_steps(),
                },
            ],
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn id(&self, index: usize) -> Option<SoundId> {
        (index < self.sounds.len()).then_some(SoundId(index))
    }

    pub fn get(&self, id: SoundId) -> &AlarmSound {
        // SoundId values only come from `id`, so the index is in range.
        &self.sounds[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SoundId, &AlarmSound)> {
        self.sounds
            .iter()
            .enumerate()
            .map(|(index, sound)| (SoundId(index), sound))
    }

    /// Plays one pass of the theme. Stops at the first aborted wait.
    pub fn play_once(
        &self,
        id: SoundId,
        buzzer: &mut dyn Buzzer,
        wait: &mut dyn AbortableWait,
    ) -> Playback {
        for tone in &self.get(id).steps {
            buzzer.tone(tone.frequency_hz, tone.tone_ms);
            if wait.wait_ms(tone.wait_ms) {
                return Playback::Aborted;
            }
        }
        Playback::Completed
    }

    /// Repeats the theme until the wait reports an abort.
    pub fn play_until_aborted(
        &self,
        id: SoundId,
        buzzer: &mut dyn Buzzer,
        wait: &mut dyn AbortableWait,
    ) -> u32 {
        let mut passes = 0;
        loop {
            passes += 1;
            if self.play_once(id, buzzer, wait) == Playback::Aborted {
                debug!("alarm theme '{}' stopped after {passes} passes", self.get(id).name);
                return passes;
            }
        }
    }
}

fn step(frequency_hz: u32, tone_ms: u32, wait_ms: u32) -> ToneStep {
    ToneStep {
        frequency_hz,
        tone_ms,
        wait_ms,
    }
}

fn note(offset: i32, duration_ms: u32, pause_ms: u32) -> ToneStep {
    let frequency = (NOTE_BASE_HZ + NOTE_STEP_HZ * offset).max(0) as u32;
    step(frequency, duration_ms, duration_ms + pause_ms)
}

fn scale_steps() -> Vec<ToneStep> {
    let rising = (0..10).map(|i| step(500 * i, 200, 220));
    let falling = (0..10).rev().map(|i| step(500 * i, 200, 220));
    rising.chain(falling).collect()
}

fn complex_presents_steps() -> Vec<ToneStep> {
    [
        (-3, 20),
        (0, 40),
        (0, 20),
        (1, 20),
        (2, 20),
        (0, 20),
        (2, 20),
        (3, 20),
        (4, 40),
        (4, 20),
        (3, 20),
        (2, 20),
    ]
    .into_iter()
    .map(|(offset, pause)| note(offset, 200, pause))
    .collect()
}
