//! The audio front-end shared between the machine and the host's audio
//! callback.
//!
//! All mutable state (mixer channels and the music player) lives behind
//! a single mutex. The scheduler thread takes the lock briefly for the
//! play/stop calls; the audio callback takes it for `mix`. Nothing else
//! crosses that boundary.

pub mod mixer;
pub mod music;

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::{error, fmt};

pub use mixer::{Mixer, Sample, CHANNEL_COUNT, MAX_VOLUME};
pub use music::{MusicModule, MusicPlayer};

/// Playback rates addressed by the frequency id of a sound instruction.
#[rustfmt::skip]
pub const FREQUENCY_TABLE: [u16; 40] = [
    0x0CFF, 0x0DC3, 0x0E91, 0x0F6F, 0x1056, 0x114E, 0x1259, 0x136C,
    0x149F, 0x15D9, 0x1726, 0x1888, 0x19FD, 0x1B86, 0x1D21, 0x1EDE,
    0x20AB, 0x2280, 0x2495, 0x26B1, 0x28DA, 0x2B20, 0x2D8D, 0x3000,
    0x3288, 0x354C, 0x3820, 0x3B30, 0x3E58, 0x4190, 0x4538, 0x48F0,
    0x4CE0, 0x5100, 0x5520, 0x5980, 0x5E00, 0x62E0, 0x6700, 0x6B98,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioError {
    InvalidChannelId(u8),
    VolumeOutOfRange(u8),
    InvalidFrequencyId(u8),
    InvalidMusicData,
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidChannelId(c) => write!(f, "invalid channel id {}", c),
            Self::VolumeOutOfRange(v) => write!(f, "volume {} out of range", v),
            Self::InvalidFrequencyId(id) => write!(f, "invalid frequency id {}", id),
            Self::InvalidMusicData => write!(f, "malformed music resource"),
        }
    }
}

impl error::Error for AudioError {}

struct AudioCore {
    mixer: Mixer,
    music: Option<MusicPlayer>,
    music_mark: Option<i16>,
}

/// Machine-side handle: play/stop calls issued by instructions.
pub struct Audio {
    shared: Arc<Mutex<AudioCore>>,
}

/// Host-side handle for the audio callback; cheap to clone and `Send`.
#[derive(Clone)]
pub struct AudioHandle {
    shared: Arc<Mutex<AudioCore>>,
}

impl Default for Audio {
    fn default() -> Self {
        Self::new()
    }
}

impl Audio {
    pub fn new() -> Audio {
        Audio {
            shared: Arc::new(Mutex::new(AudioCore {
                mixer: Mixer::new(),
                music: None,
                music_mark: None,
            })),
        }
    }

    pub fn handle(&self) -> AudioHandle {
        AudioHandle {
            shared: self.shared.clone(),
        }
    }

    fn check_channel(channel: u8) -> Result<usize, AudioError> {
        if channel as usize >= CHANNEL_COUNT {
            return Err(AudioError::InvalidChannelId(channel));
        }
        Ok(channel as usize)
    }

    /// Start a sound resource on a channel, replacing whatever played
    /// there. A volume of zero is a stop.
    pub fn play_sound(
        &self,
        channel: u8,
        resource: Arc<[u8]>,
        frequency_id: u8,
        volume: u8,
    ) -> Result<(), AudioError> {
        let channel = Self::check_channel(channel)?;
        if volume > MAX_VOLUME {
            return Err(AudioError::VolumeOutOfRange(volume));
        }
        if volume == 0 {
            self.shared.lock().mixer.stop(channel);
            return Ok(());
        }
        let frequency = *FREQUENCY_TABLE
            .get(frequency_id as usize)
            .ok_or(AudioError::InvalidFrequencyId(frequency_id))? as u32;

        if resource.len() < 8 {
            debug!("sound resource too short, ignoring");
            return Ok(());
        }
        let len = BigEndian::read_u16(&resource[0..2]) as usize * 2;
        let loop_len = BigEndian::read_u16(&resource[2..4]) as usize * 2;
        if len == 0 || 8 + len + loop_len > resource.len() {
            debug!("zero-length or truncated sound resource, ignoring");
            return Ok(());
        }

        let sample = Sample {
            data: resource,
            start: 8,
            len,
            loop_pos: if loop_len != 0 { len } else { 0 },
            loop_len,
        };
        self.shared.lock().mixer.play(channel, sample, frequency, volume);
        Ok(())
    }

    pub fn stop_channel(&self, channel: u8) -> Result<(), AudioError> {
        let channel = Self::check_channel(channel)?;
        self.shared.lock().mixer.stop(channel);
        Ok(())
    }

    /// Silence everything: channels and music.
    pub fn stop_all(&self) {
        let mut core = self.shared.lock();
        core.mixer.stop_all();
        core.music = None;
    }

    pub fn play_music(&self, module: MusicModule, position: u8, delay_override: u16) {
        let mut core = self.shared.lock();
        core.music = Some(MusicPlayer::new(module, position, delay_override));
    }

    pub fn set_music_delay(&self, delay: u16) {
        if let Some(music) = &mut self.shared.lock().music {
            music.set_delay(delay);
        }
    }

    pub fn stop_music(&self) {
        self.shared.lock().music = None;
    }

    /// The effective row delay of the current music, if any.
    pub fn music_delay(&self) -> Option<u16> {
        self.shared.lock().music.as_ref().map(|m| m.delay())
    }

    pub fn is_music_playing(&self) -> bool {
        self.shared.lock().music.is_some()
    }

    /// Take the most recent mark published by the music patterns.
    pub fn take_music_mark(&self) -> Option<i16> {
        self.shared.lock().music_mark.take()
    }

    pub fn is_channel_playing(&self, channel: u8) -> Result<bool, AudioError> {
        let channel = Self::check_channel(channel)?;
        Ok(self.shared.lock().mixer.is_playing(channel))
    }
}

impl AudioHandle {
    /// Fill `buf` with mono signed 8-bit PCM. Music rows are stepped in
    /// between mixing segments so note starts land on their cadence.
    pub fn mix(&self, buf: &mut [i8], sample_rate: u32) {
        let mut guard = self.shared.lock();
        let core = &mut *guard;
        buf.fill(0);
        if sample_rate == 0 {
            return;
        }

        let mut pos = 0;
        while pos < buf.len() {
            let segment = match &mut core.music {
                Some(music) => music.samples_until_row(sample_rate).min(buf.len() - pos),
                None => buf.len() - pos,
            };

            core.mixer.mix_into(&mut buf[pos..pos + segment], sample_rate);
            pos += segment;

            if let Some(music) = &mut core.music {
                music.consume(segment);
                if music.row_pending() {
                    if let Some(mark) = music.advance_row(&mut core.mixer) {
                        core.music_mark = Some(mark);
                    }
                    if music.is_finished() {
                        core.music = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound_resource(pcm: &[u8], loop_words: u16) -> Arc<[u8]> {
        let mut data = vec![0u8; 8 + pcm.len()];
        let words = (pcm.len() / 2) as u16 - loop_words;
        data[0..2].copy_from_slice(&words.to_be_bytes());
        data[2..4].copy_from_slice(&loop_words.to_be_bytes());
        data[8..].copy_from_slice(pcm);
        data.into()
    }

    #[test]
    fn play_then_mix_produces_sound() {
        let audio = Audio::new();
        audio
            .play_sound(0, sound_resource(&[64; 64], 0), 20, MAX_VOLUME)
            .unwrap();
        let mut buf = [0i8; 16];
        audio.handle().mix(&mut buf, 22050);
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn zero_volume_stops_the_channel() {
        let audio = Audio::new();
        audio
            .play_sound(1, sound_resource(&[64; 64], 0), 20, MAX_VOLUME)
            .unwrap();
        assert!(audio.is_channel_playing(1).unwrap());
        audio
            .play_sound(1, sound_resource(&[64; 64], 0), 20, 0)
            .unwrap();
        assert!(!audio.is_channel_playing(1).unwrap());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let audio = Audio::new();
        let resource = sound_resource(&[0; 8], 0);
        assert_eq!(
            audio.play_sound(4, resource.clone(), 0, 10),
            Err(AudioError::InvalidChannelId(4))
        );
        assert_eq!(
            audio.play_sound(0, resource.clone(), 0, 64),
            Err(AudioError::VolumeOutOfRange(64))
        );
        assert_eq!(
            audio.play_sound(0, resource, 40, 10),
            Err(AudioError::InvalidFrequencyId(40))
        );
    }

    #[test]
    fn zero_length_sound_is_reported_not_fatal() {
        let audio = Audio::new();
        let mut data = vec![0u8; 8];
        data[0] = 0;
        assert!(audio
            .play_sound(0, data.into(), 0, MAX_VOLUME)
            .is_ok());
        assert!(!audio.is_channel_playing(0).unwrap());
    }

    #[test]
    fn stop_all_clears_channels_and_music() {
        let audio = Audio::new();
        audio
            .play_sound(0, sound_resource(&[64; 64], 0), 20, MAX_VOLUME)
            .unwrap();
        audio.stop_all();
        assert!(!audio.is_channel_playing(0).unwrap());
        assert!(audio.music_delay().is_none());
    }
}
