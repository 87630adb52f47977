//! Byte-addressed persistence for the alarm table.
//!
//! Layout of the 64-byte store:
//!
//! | offset  | size | content                                   |
//! |---------|------|-------------------------------------------|
//! | 0       | 1    | init marker (`INIT_MARKER`)               |
//! | 1..=14  | 14   | weekly table, `[hour, minute]` per day    |
//! | 17..=18 | 2    | one-off alarm `[hour, minute]`            |
//! | 20..=23 | 4    | one-off day, little-endian i32, -1 = none |
//! | 24..=27 | 4    | selected sound index, little-endian i32   |
//!
//! Unset hours and minutes are stored as 255. Each logical group lives in
//! its own range so a partial write never touches a neighbour.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Weekday;
use log::{info, warn};
use thiserror::Error;

use crate::alarm::model::{
    DAYS_PER_WEEK, OverrideAlarm, TimeOfDay, WEEK, WeeklySchedule, weekday_from_index,
    weekday_index,
};
use crate::alarm::sounds::{AlarmSoundLibrary, SoundId};

pub const STORAGE_SIZE: usize = 64;
pub const INIT_MARKER: u8 = 79;
pub const UNSET: u8 = 255;
pub const NO_DAY: i32 = -1;

pub const MARKER_OFFSET: usize = 0;
pub const WEEKLY_OFFSET: usize = 1;
pub const OVERRIDE_TIME_OFFSET: usize = 17;
pub const OVERRIDE_DAY_OFFSET: usize = 20;
pub const SOUND_OFFSET: usize = 24;

/// Value of a blank (erased) cell.
const BLANK: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage access out of range: offset {offset}, length {len}")]
    OutOfRange { offset: usize, len: usize },
    #[error("unable to read storage image {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to commit storage image {}", path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Byte-addressable store with an explicit commit step.
pub trait Storage {
    fn get(&self, offset: usize, size: usize) -> Result<Vec<u8>, StorageError>;
    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError>;
    fn commit(&mut self) -> Result<(), StorageError>;
}

fn check_range(offset: usize, len: usize) -> Result<(), StorageError> {
    match offset.checked_add(len) {
        Some(end) if end <= STORAGE_SIZE => Ok(()),
        _ => Err(StorageError::OutOfRange { offset, len }),
    }
}

/// Store backed by an image file, rewritten on every commit.
pub struct FileStorage {
    path: PathBuf,
    image: [u8; STORAGE_SIZE],
}

impl FileStorage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut image = [BLANK; STORAGE_SIZE];
        match fs::read(path) {
            Ok(bytes) => {
                let len = bytes.len().min(STORAGE_SIZE);
                image[..len].copy_from_slice(&bytes[..len]);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("storage image {} not found, starting blank", path.display());
            }
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            image,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get(&self, offset: usize, size: usize) -> Result<Vec<u8>, StorageError> {
        check_range(offset, size)?;
        Ok(self.image[offset..offset + size].to_vec())
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        check_range(offset, bytes.len())?;
        self.image[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        fs::write(&self.path, self.image).map_err(|source| StorageError::Commit {
            path: self.path.clone(),
            source,
        })
    }
}

/// Everything the store holds, decoded.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct StoredSchedule {
    pub weekly: WeeklySchedule,
    pub override_alarm: Option<OverrideAlarm>,
    pub sound: SoundId,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    /// Marker mismatch: factory blank store, defaults were used.
    Uninitialized,
}

pub fn load_schedule(
    storage: &dyn Storage,
    sounds: &AlarmSoundLibrary,
) -> Result<(StoredSchedule, LoadOutcome), StorageError> {
    let marker = storage.get(MARKER_OFFSET, 1)?;
    if marker[0] != INIT_MARKER {
        info!("storage not initialized yet, using empty schedule");
        return Ok((StoredSchedule::default(), LoadOutcome::Uninitialized));
    }

    let weekly = decode_weekly(&storage.get(WEEKLY_OFFSET, DAYS_PER_WEEK * 2)?);
    let override_alarm = decode_override(
        &storage.get(OVERRIDE_TIME_OFFSET, 2)?,
        read_i32(storage, OVERRIDE_DAY_OFFSET)?,
    );
    let raw_sound = read_i32(storage, SOUND_OFFSET)?;
    let sound = usize::try_from(raw_sound)
        .ok()
        .and_then(|index| sounds.id(index))
        .unwrap_or_else(|| {
            warn!("stored sound index {raw_sound} out of range, using default");
            SoundId::default()
        });

    info!("loaded alarms from storage");
    Ok((
        StoredSchedule {
            weekly,
            override_alarm,
            sound,
        },
        LoadOutcome::Loaded,
    ))
}

/// Writes the weekly table and the one-off alarm, then commits.
pub fn save_alarms(
    storage: &mut dyn Storage,
    weekly: &WeeklySchedule,
    override_alarm: Option<OverrideAlarm>,
) -> Result<(), StorageError> {
    stage_alarms(storage, weekly, override_alarm)?;
    storage.commit()
}

/// Writes the alarm ranges without committing.
pub fn stage_alarms(
    storage: &mut dyn Storage,
    weekly: &WeeklySchedule,
    override_alarm: Option<OverrideAlarm>,
) -> Result<(), StorageError> {
    write_marker(storage)?;
    storage.put(WEEKLY_OFFSET, &encode_weekly(weekly))?;
    let (time, day) = encode_override(override_alarm);
    storage.put(OVERRIDE_TIME_OFFSET, &time)?;
    storage.put(OVERRIDE_DAY_OFFSET, &day.to_le_bytes())
}

/// Writes the selected sound only, then commits.
pub fn save_sound(storage: &mut dyn Storage, sound: SoundId) -> Result<(), StorageError> {
    stage_sound(storage, sound)?;
    storage.commit()
}

pub fn stage_sound(storage: &mut dyn Storage, sound: SoundId) -> Result<(), StorageError> {
    write_marker(storage)?;
    let index = i32::try_from(sound.index()).unwrap_or(0);
    storage.put(SOUND_OFFSET, &index.to_le_bytes())
}

fn write_marker(storage: &mut dyn Storage) -> Result<(), StorageError> {
    if storage.get(MARKER_OFFSET, 1)?[0] != INIT_MARKER {
        storage.put(MARKER_OFFSET, &[INIT_MARKER])?;
    }
    Ok(())
}

fn read_i32(storage: &dyn Storage, offset: usize) -> Result<i32, StorageError> {
    let bytes = storage.get(offset, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn encode_slot(slot: Option<TimeOfDay>) -> [u8; 2] {
    match slot {
        Some(time) => [time.hour(), time.minute()],
        None => [UNSET, UNSET],
    }
}

fn decode_slot(bytes: [u8; 2]) -> Option<TimeOfDay> {
    if bytes == [UNSET, UNSET] {
        return None;
    }
    let slot = TimeOfDay::new(bytes[0], bytes[1]);
    if slot.is_none() {
        warn!("discarding corrupt alarm slot {:?}", bytes);
    }
    slot
}

pub fn encode_weekly(weekly: &WeeklySchedule) -> [u8; DAYS_PER_WEEK * 2] {
    let mut out = [UNSET; DAYS_PER_WEEK * 2];
    for day in WEEK {
        let index = weekday_index(day);
        out[index * 2..index * 2 + 2].copy_from_slice(&encode_slot(weekly.get(day)));
    }
    out
}

pub fn decode_weekly(bytes: &[u8]) -> WeeklySchedule {
    let mut weekly = WeeklySchedule::default();
    for (index, pair) in bytes.chunks_exact(2).take(DAYS_PER_WEEK).enumerate() {
        if let Some(day) = weekday_from_index(index) {
            weekly.set(day, decode_slot([pair[0], pair[1]]));
        }
    }
    weekly
}

fn encode_override(override_alarm: Option<OverrideAlarm>) -> ([u8; 2], i32) {
    match override_alarm {
        Some(alarm) => (
            encode_slot(Some(alarm.time)),
            weekday_index(alarm.day) as i32,
        ),
        None => ([UNSET, UNSET], NO_DAY),
    }
}

fn decode_override(time: &[u8], day: i32) -> Option<OverrideAlarm> {
    let day: Weekday = usize::try_from(day).ok().and_then(weekday_from_index)?;
    let time = decode_slot([time[0], time[1]])?;
    Some(OverrideAlarm { day, time })
}
