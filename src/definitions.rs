// Shared constants for the machine. Register addresses are the ones the
// shipped DOS bytecode expects; see the well-known register list below.

/// A register/operand value of the virtual machine.
pub type Word = i16;

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 200;
pub const SCREEN_PIXELS: usize = SCREEN_WIDTH * SCREEN_HEIGHT;

/// Number of indexed framebuffers.
pub const PAGE_COUNT: usize = 4;

pub const THREAD_COUNT: usize = 64;
pub const REGISTER_COUNT: usize = 256;
pub const MAX_STACK_DEPTH: usize = 64;

/// Watchdog against malformed bytecode: a single thread may not execute
/// more instructions than this within one tic.
pub const DEFAULT_INSTRUCTION_BUDGET: usize = 10_000;

/// Polygon zoom factor meaning 1:1 scale.
pub const DEFAULT_ZOOM: u16 = 64;

/// One unit of the frame-pause register, in milliseconds.
pub const FRAME_SLICE_MS: u32 = 20;

/// Resource ids at or above this value name a game part instead of a
/// bank resource.
pub const GAME_PART_FIRST_ID: u16 = 0x3E80;

/// Bank files are numbered BANK01 through BANK0D.
pub const BANK_COUNT: u8 = 13;

// Well-known registers.

pub const REG_RANDOM_SEED: u8 = 0x3C;
pub const REG_LAST_KEYCHAR: u8 = 0xDA;
pub const REG_HERO_POS_UP_DOWN: u8 = 0xE5;
pub const REG_MUSIC_MARK: u8 = 0xF4;
/// Reset to zero on every frame blit.
pub const REG_FRAME_SCRATCH: u8 = 0xF7;
pub const REG_SCROLL_Y: u8 = 0xF9;
pub const REG_HERO_ACTION: u8 = 0xFA;
pub const REG_HERO_POS_JUMP_DOWN: u8 = 0xFB;
pub const REG_HERO_POS_LEFT_RIGHT: u8 = 0xFC;
pub const REG_HERO_POS_MASK: u8 = 0xFD;
pub const REG_HERO_ACTION_POS_MASK: u8 = 0xFE;
pub const REG_PAUSE_SLICES: u8 = 0xFF;

// Input bit masks folded into REG_HERO_POS_MASK / REG_HERO_ACTION_POS_MASK.

pub const INPUT_MASK_RIGHT: Word = 1;
pub const INPUT_MASK_LEFT: Word = 2;
pub const INPUT_MASK_DOWN: Word = 4;
pub const INPUT_MASK_UP: Word = 8;
pub const INPUT_MASK_ACTION: Word = 0x80;
