//! The outward-facing interface of the machine.
//!
//! The host owns the window, the pacing sleep and the audio device; the
//! machine only reports what to show and how long the bytecode asked to
//! wait. Audio is pulled by the host through
//! [`crate::audio::AudioHandle::mix`] rather than pushed.

pub trait Host {
    /// A frame is ready: present video buffer `buffer_index` and pace
    /// the loop by `delay_ms` milliseconds.
    fn on_frame_ready(&mut self, buffer_index: usize, delay_ms: u32);

    /// A draw operation touched `buffer_index`. Purely observational.
    fn on_buffer_changed(&mut self, _buffer_index: usize) {}
}

/// Host that discards every notification; useful headless.
pub struct NullHost;

impl Host for NullHost {
    fn on_frame_ready(&mut self, _buffer_index: usize, _delay_ms: u32) {}
}
