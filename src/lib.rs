//! # A virtual machine for Another World
//!
//! This crate reimplements the bytecode machine that drives Another
//! World (1991): a cooperative scheduler of 64 virtual threads, a ~30
//! opcode interpreter, a bank-file resource manager, a four-buffer
//! 16-color polygon renderer and a 4-channel PCM mixer with the
//! original's pattern-music player.
//!
//! The core is headless. A host drives it by calling
//! [`machine::Machine::run_tic`] once per frame with the current
//! [`machine::UserInput`], implements [`host::Host`] to learn when a
//! frame is ready and how long to pace it, and pulls PCM from
//! [`audio::AudioHandle::mix`] inside its audio callback. The game's
//! data files (`MEMLIST.BIN`, `BANK01`..`BANK0D`) are reached through
//! [`resfile::Repository`]; [`resfile::DiskRepository`] reads the
//! originals from disk.

pub mod audio;
pub mod definitions;
pub mod host;
pub mod keyboard;
pub mod machine;
pub mod resfile;
pub mod video;

pub use host::{Host, NullHost};
pub use machine::{GamePart, Machine, MachineError, UserInput};
pub use resfile::{DiskRepository, Repository};
