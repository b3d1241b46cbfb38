//! The pattern-based music player.
//!
//! A music resource starts with a u16 row delay, fifteen instrument
//! references (resource id + volume, four bytes each), a u16 order
//! count at 0x3E and a 128-byte order table at 0x40; pattern data
//! follows from 0xC0 in 1024-byte blocks of 64 rows x 4 channels x 4
//! bytes. Rows advance on a fixed cadence derived from the delay; each
//! note word either publishes a mark to the bytecode, stops its
//! channel, or starts an instrument at an Amiga period.

use super::mixer::{Mixer, Sample, MAX_VOLUME};
use super::AudioError;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use std::sync::Arc;

const INSTRUMENT_COUNT: usize = 15;
const ORDER_TABLE_OFFSET: usize = 0x40;
const PATTERN_DATA_OFFSET: usize = 0xC0;
const PATTERN_SIZE: usize = 1024;
const ROW_SIZE: usize = 4 * 4;

const NOTE_SET_MARK: u16 = 0xFFFD;
const NOTE_STOP_CHANNEL: u16 = 0xFFFE;

/// Amiga PAL clock used to convert note periods to Hz.
const PERIOD_CLOCK: u32 = 7_159_092;

struct Instrument {
    data: Arc<[u8]>,
    volume: u16,
}

pub struct MusicModule {
    data: Arc<[u8]>,
    delay: u16,
    order_count: u16,
    instruments: [Option<Instrument>; INSTRUMENT_COUNT],
}

impl MusicModule {
    /// Parse a music resource. Instrument sample resources are resolved
    /// through `lookup`; the first two sample words of each instrument
    /// are silenced before playback.
    pub fn load(
        data: &Arc<[u8]>,
        lookup: impl Fn(u8) -> Option<Arc<[u8]>>,
    ) -> Result<MusicModule, AudioError> {
        if data.len() < PATTERN_DATA_OFFSET {
            return Err(AudioError::InvalidMusicData);
        }

        let mut instruments: [Option<Instrument>; INSTRUMENT_COUNT] = Default::default();
        for (slot, raw) in instruments
            .iter_mut()
            .zip(data[2..2 + INSTRUMENT_COUNT * 4].chunks_exact(4))
        {
            let resource_id = BigEndian::read_u16(&raw[0..2]);
            if resource_id == 0 {
                continue;
            }
            let volume = BigEndian::read_u16(&raw[2..4]);
            match u8::try_from(resource_id).ok().and_then(&lookup) {
                Some(sample) => {
                    let mut patched = sample.to_vec();
                    if patched.len() >= 12 {
                        patched[8..12].fill(0);
                    }
                    *slot = Some(Instrument {
                        data: patched.into(),
                        volume,
                    });
                }
                None => warn!("music instrument {:#06x} not resident", resource_id),
            }
        }

        Ok(MusicModule {
            data: data.clone(),
            delay: BigEndian::read_u16(&data[0..2]),
            order_count: BigEndian::read_u16(&data[0x3E..0x40]),
            instruments,
        })
    }

    pub fn delay(&self) -> u16 {
        self.delay
    }
}

pub struct MusicPlayer {
    module: MusicModule,
    delay: u16,
    order: u8,
    /// Byte offset of the current row inside the pattern.
    row_offset: usize,
    samples_until_row: usize,
    finished: bool,
}

impl MusicPlayer {
    pub fn new(module: MusicModule, position: u8, delay_override: u16) -> MusicPlayer {
        let delay = if delay_override != 0 {
            delay_override
        } else {
            module.delay
        };
        debug!(
            "music: {} orders, starting at {}, delay {}",
            module.order_count, position, delay
        );
        MusicPlayer {
            module,
            delay,
            order: position,
            row_offset: 0,
            samples_until_row: 0,
            finished: false,
        }
    }

    pub fn set_delay(&mut self, delay: u16) {
        self.delay = delay;
    }

    pub fn delay(&self) -> u16 {
        self.delay
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Row cadence in output samples: the delay unit is worth
    /// `delay * 60 / 7050` milliseconds.
    fn samples_per_row(&self, sample_rate: u32) -> usize {
        let ms = self.delay as u64 * 60 / 7050;
        ((ms * sample_rate as u64 / 1000) as usize).max(1)
    }

    /// Output samples left before the next row is due.
    pub fn samples_until_row(&mut self, sample_rate: u32) -> usize {
        if self.samples_until_row == 0 {
            self.samples_until_row = self.samples_per_row(sample_rate);
        }
        self.samples_until_row
    }

    pub fn consume(&mut self, samples: usize) {
        self.samples_until_row = self.samples_until_row.saturating_sub(samples);
    }

    /// True when the cadence counter has run down and the next row
    /// should be played.
    pub fn row_pending(&self) -> bool {
        self.samples_until_row == 0
    }

    /// Play the next row onto the mixer. Returns a mark for the
    /// bytecode if the row published one.
    pub fn advance_row(&mut self, mixer: &mut Mixer) -> Option<i16> {
        if self.finished {
            return None;
        }
        let order = match self.module.data.get(ORDER_TABLE_OFFSET + self.order as usize) {
            Some(&order) => order as usize,
            None => {
                self.finished = true;
                return None;
            }
        };

        let row_start = PATTERN_DATA_OFFSET + order * PATTERN_SIZE + self.row_offset;
        let mut mark = None;
        for channel in 0..4 {
            let note_start = row_start + channel * 4;
            let note = match self.module.data.get(note_start..note_start + 4) {
                Some(note) => note,
                None => {
                    self.finished = true;
                    return mark;
                }
            };
            if let Some(m) = self.handle_note(channel, note, mixer) {
                mark = Some(m);
            }
        }

        self.row_offset += ROW_SIZE;
        if self.row_offset >= PATTERN_SIZE {
            self.row_offset = 0;
            self.order += 1;
            if self.order as u16 >= self.module.order_count {
                debug!("music: end of order table");
                self.finished = true;
            }
        }
        mark
    }

    fn handle_note(&self, channel: usize, note: &[u8], mixer: &mut Mixer) -> Option<i16> {
        let note_1 = BigEndian::read_u16(&note[0..2]);
        let note_2 = BigEndian::read_u16(&note[2..4]);

        if note_1 == NOTE_SET_MARK {
            return Some(note_2 as i16);
        }

        // Volume column: instrument select plus an optional slide.
        let mut volume = 0u16;
        let mut instrument = None;
        let sample_index = (note_2 >> 12) as usize;
        if sample_index != 0 {
            if let Some(ins) = &self.module.instruments[sample_index - 1] {
                volume = ins.volume;
                let effect = (note_2 >> 8) & 0xF;
                let amount = note_2 & 0xFF;
                if effect == 5 {
                    volume = (volume + amount).min(MAX_VOLUME as u16);
                } else if effect == 6 {
                    volume = volume.saturating_sub(amount);
                }
                mixer.set_volume(channel, volume as u8);
                instrument = Some(ins);
            }
        }

        if note_1 == NOTE_STOP_CHANNEL {
            mixer.stop(channel);
        } else if note_1 != 0 {
            if let Some(ins) = instrument {
                if ins.data.len() >= 8 {
                    let len = BigEndian::read_u16(&ins.data[0..2]) as usize * 2;
                    let loop_len = BigEndian::read_u16(&ins.data[2..4]) as usize * 2;
                    if len == 0 || 8 + len + loop_len > ins.data.len() {
                        warn!("instrument sample header inconsistent, note dropped");
                        return None;
                    }
                    let sample = Sample {
                        data: ins.data.clone(),
                        start: 8,
                        len,
                        loop_pos: if loop_len != 0 { len } else { 0 },
                        loop_len,
                    };
                    let frequency = PERIOD_CLOCK / (note_1 as u32 * 2);
                    mixer.play(channel, sample, frequency, volume as u8);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_with_rows(rows: &[[u8; 16]], delay: u16) -> Arc<[u8]> {
        let mut data = vec![0u8; PATTERN_DATA_OFFSET + PATTERN_SIZE];
        data[0..2].copy_from_slice(&delay.to_be_bytes());
        // instrument 1 -> resource 9, volume 0x20
        data[2..4].copy_from_slice(&9u16.to_be_bytes());
        data[4..6].copy_from_slice(&0x20u16.to_be_bytes());
        data[0x3E..0x40].copy_from_slice(&1u16.to_be_bytes());
        // order table: single entry, pattern 0
        data[ORDER_TABLE_OFFSET] = 0;
        for (i, row) in rows.iter().enumerate() {
            let start = PATTERN_DATA_OFFSET + i * ROW_SIZE;
            data[start..start + ROW_SIZE].copy_from_slice(row);
        }
        data.into()
    }

    fn instrument_resource() -> Arc<[u8]> {
        // 4 sample words, no loop, 8 header bytes then PCM
        let mut data = vec![0u8; 8 + 8];
        data[0..2].copy_from_slice(&4u16.to_be_bytes());
        data[8..].fill(50);
        data.into()
    }

    fn lookup(id: u8) -> Option<Arc<[u8]>> {
        (id == 9).then(instrument_resource)
    }

    #[test]
    fn delay_comes_from_the_module_unless_overridden() {
        let data = module_with_rows(&[], 0x50);
        let module = MusicModule::load(&data, lookup).unwrap();
        assert_eq!(module.delay(), 0x50);

        let player = MusicPlayer::new(MusicModule::load(&data, lookup).unwrap(), 0, 0);
        assert_eq!(player.delay(), 0x50);
        let player = MusicPlayer::new(module, 0, 0x99);
        assert_eq!(player.delay(), 0x99);
    }

    #[test]
    fn mark_rows_publish_their_value() {
        let mut row = [0u8; 16];
        row[0..2].copy_from_slice(&NOTE_SET_MARK.to_be_bytes());
        row[2..4].copy_from_slice(&42u16.to_be_bytes());
        let data = module_with_rows(&[row], 1);

        let mut mixer = Mixer::new();
        let mut player = MusicPlayer::new(MusicModule::load(&data, lookup).unwrap(), 0, 0);
        assert_eq!(player.advance_row(&mut mixer), Some(42));
    }

    #[test]
    fn note_rows_start_the_instrument() {
        let mut row = [0u8; 16];
        // channel 2: period 0x100, instrument 1
        row[8..10].copy_from_slice(&0x100u16.to_be_bytes());
        row[10..12].copy_from_slice(&0x1000u16.to_be_bytes());
        let data = module_with_rows(&[row], 1);

        let mut mixer = Mixer::new();
        let mut player = MusicPlayer::new(MusicModule::load(&data, lookup).unwrap(), 0, 0);
        assert_eq!(player.advance_row(&mut mixer), None);
        assert!(mixer.is_playing(2));
        assert!(!mixer.is_playing(0));
    }

    #[test]
    fn stop_note_silences_the_channel() {
        let mut start_row = [0u8; 16];
        start_row[0..2].copy_from_slice(&0x100u16.to_be_bytes());
        start_row[2..4].copy_from_slice(&0x1000u16.to_be_bytes());
        let mut stop_row = [0u8; 16];
        stop_row[0..2].copy_from_slice(&NOTE_STOP_CHANNEL.to_be_bytes());
        let data = module_with_rows(&[start_row, stop_row], 1);

        let mut mixer = Mixer::new();
        let mut player = MusicPlayer::new(MusicModule::load(&data, lookup).unwrap(), 0, 0);
        player.advance_row(&mut mixer);
        assert!(mixer.is_playing(0));
        player.advance_row(&mut mixer);
        assert!(!mixer.is_playing(0));
    }

    #[test]
    fn player_finishes_after_the_last_order() {
        let data = module_with_rows(&[], 1);
        let mut mixer = Mixer::new();
        let mut player = MusicPlayer::new(MusicModule::load(&data, lookup).unwrap(), 0, 0);
        for _ in 0..64 {
            assert!(!player.is_finished());
            player.advance_row(&mut mixer);
        }
        assert!(player.is_finished());
    }

    #[test]
    fn short_module_is_rejected() {
        let data: Arc<[u8]> = vec![0u8; 16].into();
        assert!(matches!(
            MusicModule::load(&data, lookup),
            Err(AudioError::InvalidMusicData)
        ));
    }
}
