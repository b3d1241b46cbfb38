//! The machine: owner of every subsystem and home of `run_tic`.
//!
//! One tic applies a scheduled game part, folds the user input into the
//! well-known registers, applies deferred thread transitions, then runs
//! every active, unpaused thread in id order until it yields, dies or
//! trips the instruction budget.

pub mod cursor;
pub mod error;
pub mod instruction;
pub mod registers;
pub mod resources;
pub mod stack;
pub mod thread;

use crate::audio::{Audio, AudioHandle, MusicModule};
use crate::definitions::*;
use crate::host::Host;
use crate::resfile::Repository;
use crate::video::Video;
use cursor::ProgramCursor;
use instruction::{Action, Instruction, ThreadContext};
use log::{debug, warn};
use registers::Registers;
use resources::{LoadedPart, LoadedResource, ResourceMemory};
use thread::{Execution, ThreadTable};

pub use error::MachineError;
pub use instruction::{Condition, Operand, SpriteSource, ThreadOp, ZoomSource};
pub use resources::{GamePart, PartResources};

/// One frame of user input, already mapped from whatever device the
/// host drives.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub action: bool,
    /// Last typed character, consumed by the password screen.
    pub last_char: Option<char>,
    /// Request to bring up the password screen.
    pub show_password_screen: bool,
}

pub struct Machine<R: Repository, H: Host> {
    pub(crate) repository: R,
    pub(crate) resources: ResourceMemory,
    pub(crate) video: Video,
    pub(crate) audio: Audio,
    pub(crate) registers: Registers,
    pub(crate) threads: ThreadTable,
    pub(crate) part: Option<LoadedPart>,
    pub(crate) scheduled_part: Option<GamePart>,
    pub(crate) host: H,
    max_instructions_per_tic: usize,
}

impl<R: Repository, H: Host> Machine<R, H> {
    pub fn new(mut repository: R, host: H) -> Result<Machine<R, H>, MachineError> {
        let descriptors = repository.descriptors()?;
        let mut machine = Machine {
            repository,
            resources: ResourceMemory::new(descriptors),
            video: Video::new(),
            audio: Audio::new(),
            registers: Registers::new(),
            threads: ThreadTable::new(),
            part: None,
            scheduled_part: None,
            host,
            max_instructions_per_tic: DEFAULT_INSTRUCTION_BUDGET,
        };
        // Initial register state expected by the shipped bytecode.
        machine.registers.set(0x54, 0x81);
        machine.registers.set(REG_RANDOM_SEED, 0);
        Ok(machine)
    }

    pub fn set_random_seed(&mut self, seed: Word) {
        self.registers.set(REG_RANDOM_SEED, seed);
    }

    /// Preload the registers the copy-protection screen checks so the
    /// code wheel can be skipped.
    pub fn bypass_copy_protection(&mut self) {
        self.registers.set(0xBC, 0x10);
        self.registers.set(0xC6, 0x80);
        self.registers.set(0xF2, 4000);
        self.registers.set(0xDC, 33);
    }

    pub fn set_instruction_budget(&mut self, budget: usize) {
        self.max_instructions_per_tic = budget;
    }

    pub fn schedule_part(&mut self, part: GamePart) {
        self.scheduled_part = Some(part);
    }

    pub fn scheduled_part(&self) -> Option<GamePart> {
        self.scheduled_part
    }

    pub fn current_part(&self) -> Option<GamePart> {
        self.part.as_ref().map(|p| p.part)
    }

    pub fn video(&self) -> &Video {
        &self.video
    }

    pub fn audio_handle(&self) -> AudioHandle {
        self.audio.handle()
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn register(&self, id: u8) -> Word {
        self.registers.get(id)
    }

    pub(crate) fn loaded_part(&self) -> Result<&LoadedPart, MachineError> {
        self.part.as_ref().ok_or(MachineError::NoPartLoaded)
    }

    /// Run one tic of the machine against the given input.
    pub fn run_tic(&mut self, input: &UserInput) -> Result<(), MachineError> {
        if let Some(part) = self.scheduled_part.take() {
            self.load_part(part)?;
        }
        if self.part.is_none() {
            return Err(MachineError::NoPartLoaded);
        }

        self.apply_input(input);
        if let Some(mark) = self.audio.take_music_mark() {
            self.registers.set(REG_MUSIC_MARK, mark);
        }

        self.threads.apply_scheduled();

        for id in 0..THREAD_COUNT as u8 {
            let thread = self.threads.thread(id);
            if thread.paused {
                continue;
            }
            let address = match thread.execution {
                Execution::Active(address) => address,
                Execution::Inactive => continue,
            };
            self.run_thread(id, address)?;
        }
        Ok(())
    }

    fn run_thread(&mut self, id: u8, address: u16) -> Result<(), MachineError> {
        let code = self.loaded_part()?.bytecode.clone();
        let mut cursor = ProgramCursor::new(code);
        cursor.jump(address)?;
        let mut stack = std::mem::take(&mut self.threads.thread_mut(id).stack);

        let mut budget = self.max_instructions_per_tic;
        let outcome = loop {
            if budget == 0 {
                break Err(MachineError::ThreadStalled(id));
            }
            budget -= 1;

            let instruction = match Instruction::decode(&mut cursor) {
                Ok(instruction) => instruction,
                Err(e) => break Err(e),
            };
            let mut ctx = ThreadContext {
                id,
                cursor: &mut cursor,
                stack: &mut stack,
            };
            match instruction.execute(self, &mut ctx) {
                Ok(Action::Continue) => {}
                Ok(Action::Yield) => break Ok(Execution::Active(cursor.counter() as u16)),
                Ok(Action::Deactivate) => break Ok(Execution::Inactive),
                Err(e) => break Err(e),
            }
        };

        let thread = self.threads.thread_mut(id);
        thread.stack = stack;
        thread.execution = outcome?;
        Ok(())
    }

    /// Fold one frame of input into the well-known registers.
    fn apply_input(&mut self, input: &UserInput) {
        let mut mask: Word = 0;
        let mut left_right: Word = 0;
        let mut up_down: Word = 0;
        if input.right {
            left_right = 1;
            mask |= INPUT_MASK_RIGHT;
        }
        if input.left {
            left_right = -1;
            mask |= INPUT_MASK_LEFT;
        }
        if input.down {
            up_down = 1;
            mask |= INPUT_MASK_DOWN;
        }
        if input.up {
            up_down = -1;
            mask |= INPUT_MASK_UP;
        }
        self.registers.set(REG_HERO_POS_UP_DOWN, up_down);
        self.registers.set(REG_HERO_POS_JUMP_DOWN, up_down);
        self.registers.set(REG_HERO_POS_LEFT_RIGHT, left_right);
        self.registers.set(REG_HERO_POS_MASK, mask);
        if input.action {
            self.registers.set(REG_HERO_ACTION, 1);
            mask |= INPUT_MASK_ACTION;
        } else {
            self.registers.set(REG_HERO_ACTION, 0);
        }
        self.registers.set(REG_HERO_ACTION_POS_MASK, mask);

        let current = self.current_part();
        if current == Some(GamePart::PasswordEntry) {
            if let Some(c) = input.last_char {
                if c == '\u{8}' || c.is_ascii_alphabetic() {
                    self.registers
                        .set(REG_LAST_KEYCHAR, c.to_ascii_uppercase() as Word);
                }
            }
        }
        if input.show_password_screen
            && !matches!(
                current,
                Some(GamePart::CopyProtection) | Some(GamePart::PasswordEntry) | None
            )
        {
            self.scheduled_part = Some(GamePart::PasswordEntry);
        }
    }

    fn load_part(&mut self, part: GamePart) -> Result<(), MachineError> {
        debug!("switching to game part {:?}", part);
        self.audio.stop_all();

        let loaded = self.resources.load_part(&mut self.repository, part)?;
        self.video.set_palette_resource(loaded.palettes.clone());
        self.part = Some(loaded);

        self.registers.set(0xE4, 0x14);
        self.threads.reset_for_part();
        self.scheduled_part = None;
        Ok(())
    }

    /// `ControlResources` system call: unload everything, schedule a
    /// part, or pull in a single resource.
    pub(crate) fn control_resources(&mut self, id: u16) -> Result<(), MachineError> {
        if id == 0 {
            self.audio.stop_all();
            self.resources.unload_all();
            return Ok(());
        }
        if id >= GAME_PART_FIRST_ID {
            match GamePart::from_id(id) {
                Some(part) => self.scheduled_part = Some(part),
                None => warn!("request for unknown game part {:#06x}", id),
            }
            return Ok(());
        }
        let id = match u8::try_from(id) {
            Ok(id) => id,
            Err(_) => {
                warn!("resource id {:#06x} out of catalog range", id);
                return Ok(());
            }
        };
        match self.resources.load(&mut self.repository, id)? {
            LoadedResource::Bitmap(data) => {
                self.video.load_bitmap(&data)?;
                self.host.on_buffer_changed(0);
            }
            LoadedResource::Retained | LoadedResource::Empty => {}
        }
        Ok(())
    }

    /// `ControlSound` system call.
    pub(crate) fn play_sound(
        &mut self,
        id: u16,
        frequency_id: u8,
        volume: u8,
        channel: u8,
    ) -> Result<(), MachineError> {
        let resource = match u8::try_from(id).ok().and_then(|id| self.resources.resource(id)) {
            Some(resource) => resource,
            None => {
                debug!("sound {:#06x} not resident, ignoring", id);
                return Ok(());
            }
        };
        // Out-of-range volumes are clamped, not rejected; the shipped
        // bytecode relies on it.
        let volume = volume.min(0x3F);
        let channel = channel & 3;
        self.audio.play_sound(channel, resource, frequency_id, volume)?;
        Ok(())
    }

    /// `ControlMusic` system call: start, retime or stop the music.
    pub(crate) fn control_music(
        &mut self,
        id: u16,
        delay: u16,
        position: u8,
    ) -> Result<(), MachineError> {
        if id != 0 {
            let resource = match u8::try_from(id).ok().and_then(|id| self.resources.resource(id)) {
                Some(resource) => resource,
                None => {
                    warn!("music {:#06x} not resident, ignoring", id);
                    return Ok(());
                }
            };
            let module = MusicModule::load(&resource, |id| self.resources.resource(id))?;
            self.audio.play_music(module, position, delay);
        } else if delay != 0 {
            self.audio.set_music_delay(delay);
        } else {
            self.audio.stop_music();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use crate::resfile::{MemoryRepository, ResourceDescriptor, ResourceKind};

    /// Host that records frame notifications.
    #[derive(Default)]
    struct RecordingHost {
        frames: Vec<(usize, u32)>,
    }

    impl Host for RecordingHost {
        fn on_frame_ready(&mut self, buffer_index: usize, delay_ms: u32) {
            self.frames.push((buffer_index, delay_ms));
        }
    }

    /// Repository with the intro and copy-protection parts backed by
    /// the given bytecode, plus a sound resource at id 42.
    fn repository(bytecode: &[u8]) -> MemoryRepository {
        let empty = ResourceDescriptor {
            kind: ResourceKind::Sound,
            bank_id: 1,
            bank_offset: 0,
            packed_size: 0,
            size: 0,
        };
        let mut descriptors = vec![empty; 0x80];
        let mut bank: Vec<u8> = Vec::new();

        let mut place = |kind: ResourceKind, data: &[u8]| -> ResourceDescriptor {
            let descriptor = ResourceDescriptor {
                kind,
                bank_id: 1,
                bank_offset: bank.len() as u32,
                packed_size: data.len() as u16,
                size: data.len() as u16,
            };
            bank.extend_from_slice(data);
            descriptor
        };

        let palettes = vec![0u8; 2048];
        // A single dot polygon so draws have something to chew on.
        let polygons = [0xC0u8, 0, 1, 4, 0, 0, 0, 1, 0, 1, 0, 0];
        let mut sound = vec![0u8; 16];
        sound[1] = 4; // four sample words

        for part in [
            GamePart::CopyProtection,
            GamePart::IntroCinematic,
            GamePart::PasswordEntry,
        ] {
            let ids = part.resources();
            descriptors[ids.palettes as usize] = place(ResourceKind::Palettes, &palettes);
            descriptors[ids.bytecode as usize] = place(ResourceKind::Bytecode, bytecode);
            descriptors[ids.polygons as usize] = place(ResourceKind::Polygons, &polygons);
        }
        descriptors[42] = place(ResourceKind::Sound, &sound);

        MemoryRepository {
            descriptors,
            banks: vec![Vec::new(), bank],
        }
    }

    fn machine_with(bytecode: &[u8]) -> Machine<MemoryRepository, RecordingHost> {
        let mut machine =
            Machine::new(repository(bytecode), RecordingHost::default()).unwrap();
        machine.schedule_part(GamePart::IntroCinematic);
        machine
    }

    const YIELD: u8 = 0x06;
    const KILL: u8 = 0x11;
    /// Yield forever: `L: Yield; Jump(L)` starting at address 0.
    const IDLE: &[u8] = &[YIELD, 0x07, 0x00, 0x00];

    #[test]
    fn kill_is_immediate_and_control_threads_is_deferred() {
        // ControlThreads(1, 63, resume); Kill
        let mut machine = machine_with(&[0x0C, 1, 63, 0, KILL]);
        machine.run_tic(&UserInput::default()).unwrap();

        assert_eq!(machine.threads.thread(0).execution, Execution::Inactive);
        for id in 1..64u8 {
            // The resume is only scheduled during the first tic.
            assert_eq!(machine.threads.thread(id).scheduled_pause, Some(false));
            assert!(!machine.threads.thread(id).paused);
        }

        machine.run_tic(&UserInput::default()).unwrap();
        for id in 1..64u8 {
            assert_eq!(machine.threads.thread(id).scheduled_pause, None);
            assert!(!machine.threads.thread(id).paused);
        }
    }

    #[test]
    fn arithmetic_wraps_at_sixteen_bits() {
        // SetRegister(r0, 32767); AddConst(r0, 1); Yield
        let mut machine = machine_with(&[0x00, 0, 0x7F, 0xFF, 0x03, 0, 0x00, 0x01, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert_eq!(machine.register(0), i16::MIN);
    }

    #[test]
    fn decrement_jump_loops_until_zero() {
        // SetRegister(r0, 3); L: DecrementJumpNonZero(r0, L); Yield
        let mut machine = machine_with(&[0x00, 0, 0x00, 0x03, 0x09, 0, 0x00, 0x04, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert_eq!(machine.register(0), 0);
        // The thread yielded right after the loop.
        assert_eq!(machine.threads.thread(0).execution, Execution::Active(9));
    }

    #[test]
    fn activate_thread_takes_effect_next_tic() {
        // Thread 0: ActivateThread(1, 10), then parks on the yield at 4.
        // Thread 1 sets r7 and parks on the same yield.
        let bytecode = [
            0x08, 1, 0x00, 0x0A, // 0: activate thread 1 at 10
            YIELD, // 4
            0x07, 0x00, 0x04, // 5: jump back to the yield
            0, 0, // padding
            0x00, 7, 0x00, 0x01, // 10: r7 = 1
            0x07, 0x00, 0x04, // 14: jump to the yield
        ];
        let mut machine = machine_with(&bytecode);

        machine.run_tic(&UserInput::default()).unwrap();
        assert_eq!(machine.register(7), 0);
        assert_eq!(machine.threads.thread(1).execution, Execution::Inactive);
        assert_eq!(
            machine.threads.thread(1).scheduled_execution,
            Some(Execution::Active(10))
        );

        machine.run_tic(&UserInput::default()).unwrap();
        assert_eq!(machine.register(7), 1);
        assert_eq!(machine.threads.thread(1).scheduled_execution, None);
    }

    #[test]
    fn control_resources_dispatches_by_id() {
        // ControlResources(42); Yield
        let mut machine = machine_with(&[0x19, 0x00, 42, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert!(machine.resources.resource(42).is_some());

        // id 0 evicts individual resources
        machine.control_resources(0).unwrap();
        assert!(machine.resources.resource(42).is_none());

        // a game part id schedules the part
        machine.control_resources(0x3E82).unwrap();
        assert_eq!(machine.scheduled_part(), Some(GamePart::Water));
    }

    #[test]
    fn render_emits_one_frame_with_scaled_delay() {
        // SetRegister(PAUSE_SLICES, 5); Render(front); Yield
        let mut machine = machine_with(&[0x00, 0xFF, 0x00, 0x05, 0x10, 0xFE, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert_eq!(machine.host.frames, vec![(2, 100)]);
        // The scratch register is zeroed by the render.
        assert_eq!(machine.register(REG_FRAME_SCRATCH), 0);
    }

    #[test]
    fn password_screen_gate() {
        let mut machine = machine_with(IDLE);
        let request = UserInput {
            show_password_screen: true,
            ..UserInput::default()
        };

        // From the intro the password part gets scheduled.
        machine.run_tic(&UserInput::default()).unwrap();
        machine.run_tic(&request).unwrap();
        assert_eq!(machine.scheduled_part(), Some(GamePart::PasswordEntry));

        // From copy protection it does not.
        let mut machine = machine_with(IDLE);
        machine.schedule_part(GamePart::CopyProtection);
        machine.run_tic(&request).unwrap();
        assert_eq!(machine.scheduled_part(), None);
    }

    #[test]
    fn password_part_records_the_last_character() {
        let mut machine = machine_with(IDLE);
        machine.schedule_part(GamePart::PasswordEntry);
        let input = UserInput {
            last_char: Some('f'),
            ..UserInput::default()
        };
        machine.run_tic(&input).unwrap();
        assert_eq!(machine.register(REG_LAST_KEYCHAR), 'F' as i16);

        // Outside the password part the register stays untouched.
        machine.schedule_part(GamePart::IntroCinematic);
        machine.run_tic(&UserInput::default()).unwrap();
        let input = UserInput {
            last_char: Some('g'),
            ..UserInput::default()
        };
        machine.run_tic(&input).unwrap();
        assert_eq!(machine.register(REG_LAST_KEYCHAR), 'F' as i16);
    }

    #[test]
    fn input_is_folded_into_registers() {
        let mut machine = machine_with(IDLE);
        let input = UserInput {
            left: true,
            up: true,
            action: true,
            ..UserInput::default()
        };
        machine.run_tic(&input).unwrap();
        assert_eq!(machine.register(REG_HERO_POS_LEFT_RIGHT), -1);
        assert_eq!(machine.register(REG_HERO_POS_UP_DOWN), -1);
        assert_eq!(machine.register(REG_HERO_POS_JUMP_DOWN), -1);
        assert_eq!(machine.register(REG_HERO_ACTION), 1);
        assert_eq!(
            machine.register(REG_HERO_POS_MASK),
            INPUT_MASK_LEFT | INPUT_MASK_UP
        );
        assert_eq!(
            machine.register(REG_HERO_ACTION_POS_MASK),
            INPUT_MASK_LEFT | INPUT_MASK_UP | INPUT_MASK_ACTION
        );
    }

    #[test]
    fn part_load_resets_threads_registers_and_resources() {
        let mut machine = machine_with(&[0x19, 0x00, 42, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert!(machine.resources.resource(42).is_some());
        machine.registers.set(0xE4, 0);

        machine.load_part(GamePart::PasswordEntry).unwrap();
        // Individual resources were evicted by the part switch.
        assert!(machine.resources.resource(42).is_none());
        assert_eq!(machine.current_part(), Some(GamePart::PasswordEntry));
        assert_eq!(machine.register(0xE4), 0x14);
        assert_eq!(machine.threads.thread(0).execution, Execution::Active(0));
    }

    #[test]
    fn runaway_thread_reports_stalled() {
        // Jump(0) forever.
        let mut machine = machine_with(&[0x07, 0x00, 0x00]);
        machine.set_instruction_budget(1000);
        assert!(matches!(
            machine.run_tic(&UserInput::default()),
            Err(MachineError::ThreadStalled(0))
        ));
    }

    #[test]
    fn unbalanced_return_underflows() {
        let mut machine = machine_with(&[0x05]);
        assert!(matches!(
            machine.run_tic(&UserInput::default()),
            Err(MachineError::StackUnderflow)
        ));
    }

    #[test]
    fn recursive_calls_overflow_the_stack() {
        // Call(0) forever: 64 frames, then overflow.
        let mut machine = machine_with(&[0x04, 0x00, 0x00]);
        assert!(matches!(
            machine.run_tic(&UserInput::default()),
            Err(MachineError::StackOverflow)
        ));
    }

    #[test]
    fn call_and_return_round_trip() {
        // Call(5); Yield; then at 5: r3 = 9; Return.
        let bytecode = [
            0x04, 0x00, 0x05, // 0: call 5
            0x06, // 3: yield (after return)
            0x00, // padding
            0x00, 3, 0x00, 0x09, // 5: r3 = 9
            0x05, // 9: return
        ];
        let mut machine = machine_with(&bytecode);
        machine.run_tic(&UserInput::default()).unwrap();
        assert_eq!(machine.register(3), 9);
        assert_eq!(machine.threads.thread(0).execution, Execution::Active(4));
    }

    #[test]
    fn identical_runs_are_bit_identical() {
        let bytecode = [
            0x00, 0, 0x00, 0x10, // r0 = 16
            0x0E, 0x01, 0x05, // fill buffer 1 with color 5
            0x02, 1, 0, // r1 += r0
            YIELD, // 10
            0x07, 0x00, 0x0A, // park on the yield
        ];
        let mut a = machine_with(&bytecode);
        let mut b = machine_with(&bytecode);
        for _ in 0..5 {
            a.run_tic(&UserInput::default()).unwrap();
            b.run_tic(&UserInput::default()).unwrap();
        }
        for reg in 0..=255u8 {
            assert_eq!(a.register(reg), b.register(reg));
        }
        for page in 0..4 {
            assert_eq!(a.video().page(page), b.video().page(page));
        }
        assert_eq!(
            a.threads.thread(0).execution,
            b.threads.thread(0).execution
        );
    }

    #[test]
    fn tic_without_a_part_is_an_error() {
        let mut machine =
            Machine::new(repository(&[YIELD]), RecordingHost::default()).unwrap();
        assert!(matches!(
            machine.run_tic(&UserInput::default()),
            Err(MachineError::NoPartLoaded)
        ));
    }

    #[test]
    fn play_sound_requires_a_resident_resource() {
        // PlaySound(42, freq 10, vol 40, ch 1) without loading first:
        // silently ignored.
        let mut machine = machine_with(&[0x18, 0x00, 42, 10, 40, 1, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert!(!machine.audio.is_channel_playing(1).unwrap());

        // Load it, then play.
        let mut machine =
            machine_with(&[0x19, 0x00, 42, 0x18, 0x00, 42, 10, 40, 1, YIELD]);
        machine.run_tic(&UserInput::default()).unwrap();
        assert!(machine.audio.is_channel_playing(1).unwrap());
    }
}
