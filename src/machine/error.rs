use crate::audio::AudioError;
use crate::resfile::ResourceError;
use crate::video::VideoError;
use std::{error, fmt};

/// The error surface of `run_tic`. The machine stays in a defined state
/// after any of these, but callers should treat them as fatal.
#[derive(Debug)]
pub enum MachineError {
    Resource(ResourceError),
    Video(VideoError),
    Audio(AudioError),
    InvalidOpcode { opcode: u8, offset: usize },
    EndOfProgram,
    InvalidAddress(u16),
    InvalidThreadId(u8),
    StackOverflow,
    StackUnderflow,
    /// A thread exceeded the per-tic instruction budget.
    ThreadStalled(u8),
    NoPartLoaded,
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Resource(e) => write!(f, "{}", e),
            Self::Video(e) => write!(f, "{}", e),
            Self::Audio(e) => write!(f, "{}", e),
            Self::InvalidOpcode { opcode, offset } => {
                write!(f, "invalid opcode {:#04x} at {:#06x}", opcode, offset)
            }
            Self::EndOfProgram => write!(f, "program cursor ran past the end"),
            Self::InvalidAddress(addr) => write!(f, "jump target {:#06x} out of range", addr),
            Self::InvalidThreadId(id) => write!(f, "invalid thread id {}", id),
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::ThreadStalled(id) => {
                write!(f, "thread {} exceeded the per-tic instruction budget", id)
            }
            Self::NoPartLoaded => write!(f, "no game part loaded"),
        }
    }
}

impl error::Error for MachineError {}

impl From<ResourceError> for MachineError {
    fn from(e: ResourceError) -> Self {
        MachineError::Resource(e)
    }
}

impl From<VideoError> for MachineError {
    fn from(e: VideoError) -> Self {
        MachineError::Video(e)
    }
}

impl From<AudioError> for MachineError {
    fn from(e: AudioError) -> Self {
        MachineError::Audio(e)
    }
}
