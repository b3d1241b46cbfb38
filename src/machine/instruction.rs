//! Opcode decoding and execution.
//!
//! The instruction set is a tagged union: small opcodes 0x00..=0x1A have
//! fixed payloads, while the two top bits of the first byte select the
//! packed polygon draw forms. Execution mutates the machine and reports
//! back only how the running thread should proceed.

use super::cursor::ProgramCursor;
use super::error::MachineError;
use super::stack::CallStack;
use super::thread::Execution;
use super::Machine;
use crate::definitions::{
    DEFAULT_ZOOM, FRAME_SLICE_MS, REG_FRAME_SCRATCH, REG_PAUSE_SLICES, REG_SCROLL_Y, THREAD_COUNT,
};
use crate::host::Host;
use crate::resfile::Repository;
use crate::video::{BufferId, Point};
use log::warn;

/// Thread address operand of `ActivateThread`; this wire value parks
/// the target instead of starting it.
const ACTIVATE_TARGET_INACTIVE: u16 = 0xFFFE;

/// How the running thread proceeds after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Yield,
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Condition {
    fn holds(self, lhs: i16, rhs: i16) -> bool {
        match self {
            Condition::Equal => lhs == rhs,
            Condition::NotEqual => lhs != rhs,
            Condition::Greater => lhs > rhs,
            Condition::GreaterOrEqual => lhs >= rhs,
            Condition::Less => lhs < rhs,
            Condition::LessOrEqual => lhs <= rhs,
        }
    }
}

/// A value that is either immediate or read from a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Immediate(i16),
    Register(u8),
}

impl Operand {
    fn resolve<R: Repository, H: Host>(self, machine: &Machine<R, H>) -> i16 {
        match self {
            Operand::Immediate(value) => value,
            Operand::Register(id) => machine.registers.get(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomSource {
    Default,
    Immediate(u16),
    Register(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteSource {
    Polygons,
    Animations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOp {
    Resume,
    Pause,
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    SetRegister { dst: u8, value: i16 },
    CopyRegister { dst: u8, src: u8 },
    AddRegister { dst: u8, src: u8 },
    AddConst { dst: u8, value: i16 },
    Call { address: u16 },
    Return,
    Yield,
    Jump { address: u16 },
    ActivateThread { thread: u8, execution: Execution },
    DecrementJumpNonZero { reg: u8, address: u16 },
    ConditionalJump { condition: Condition, reg: u8, operand: Operand, address: u16 },
    SelectPalette { id: u8 },
    ControlThreads { first: u8, last: u8, op: ThreadOp },
    SelectVideoBuffer { buffer: BufferId },
    FillVideoBuffer { buffer: BufferId, color: u8 },
    CopyVideoBuffer { src: u8, dst: BufferId },
    RenderVideoBuffer { buffer: BufferId },
    Kill,
    DrawString { id: u16, x: u8, y: u8, color: u8 },
    SubRegister { dst: u8, src: u8 },
    AndConst { dst: u8, value: u16 },
    OrConst { dst: u8, value: u16 },
    ShiftLeft { dst: u8, amount: u16 },
    ShiftRight { dst: u8, amount: u16 },
    PlaySound { id: u16, frequency_id: u8, volume: u8, channel: u8 },
    ControlResources { id: u16 },
    PlayMusic { id: u16, delay: u16, position: u8 },
    DrawBackgroundPolygon { address: u16, x: i16, y: i16 },
    DrawSpritePolygon {
        address: u16,
        x: Operand,
        y: Operand,
        zoom: ZoomSource,
        source: SpriteSource,
    },
}

/// Mutable per-thread state handed to `execute`.
pub struct ThreadContext<'a> {
    pub id: u8,
    pub cursor: &'a mut ProgramCursor,
    pub stack: &'a mut CallStack,
}

impl Instruction {
    pub fn decode(cursor: &mut ProgramCursor) -> Result<Instruction, MachineError> {
        let offset = cursor.counter();
        let opcode = cursor.read_u8()?;

        if opcode & 0x80 != 0 {
            // Packed background draw: 15-bit polygon address from the
            // low opcode bits and the next byte, doubled; then packed
            // x/y where a y past the last row carries into x.
            let address = (((opcode as u16 & 0x7F) << 8) | cursor.read_u8()? as u16) << 1;
            let mut x = cursor.read_u8()? as i16;
            let mut y = cursor.read_u8()? as i16;
            let overflow = y - 199;
            if overflow > 0 {
                y = 199;
                x += overflow;
            }
            return Ok(Instruction::DrawBackgroundPolygon { address, x, y });
        }

        if opcode & 0x40 != 0 {
            return Self::decode_sprite_polygon(opcode, cursor);
        }

        let instruction = match opcode {
            0x00 => Instruction::SetRegister {
                dst: cursor.read_u8()?,
                value: cursor.read_i16()?,
            },
            0x01 => Instruction::CopyRegister {
                dst: cursor.read_u8()?,
                src: cursor.read_u8()?,
            },
            0x02 => Instruction::AddRegister {
                dst: cursor.read_u8()?,
                src: cursor.read_u8()?,
            },
            0x03 => Instruction::AddConst {
                dst: cursor.read_u8()?,
                value: cursor.read_i16()?,
            },
            0x04 => Instruction::Call {
                address: cursor.read_u16()?,
            },
            0x05 => Instruction::Return,
            0x06 => Instruction::Yield,
            0x07 => Instruction::Jump {
                address: cursor.read_u16()?,
            },
            0x08 => {
                let thread = cursor.read_u8()?;
                let address = cursor.read_u16()?;
                let execution = if address == ACTIVATE_TARGET_INACTIVE {
                    Execution::Inactive
                } else {
                    Execution::Active(address)
                };
                Instruction::ActivateThread { thread, execution }
            }
            0x09 => Instruction::DecrementJumpNonZero {
                reg: cursor.read_u8()?,
                address: cursor.read_u16()?,
            },
            0x0A => {
                let mode = cursor.read_u8()?;
                let reg = cursor.read_u8()?;
                let operand = if mode & 0x80 != 0 {
                    Operand::Register(cursor.read_u8()?)
                } else if mode & 0x40 != 0 {
                    Operand::Immediate(cursor.read_i16()?)
                } else {
                    Operand::Immediate(cursor.read_u8()? as i16)
                };
                let condition = match mode & 0x07 {
                    0 => Condition::Equal,
                    1 => Condition::NotEqual,
                    2 => Condition::Greater,
                    3 => Condition::GreaterOrEqual,
                    4 => Condition::Less,
                    5 => Condition::LessOrEqual,
                    _ => return Err(MachineError::InvalidOpcode { opcode, offset }),
                };
                Instruction::ConditionalJump {
                    condition,
                    reg,
                    operand,
                    address: cursor.read_u16()?,
                }
            }
            0x0B => Instruction::SelectPalette {
                id: (cursor.read_u16()? >> 8) as u8,
            },
            0x0C => {
                let first = cursor.read_u8()?;
                let last = cursor.read_u8()?;
                let op = match cursor.read_u8()? {
                    0 => ThreadOp::Resume,
                    1 => ThreadOp::Pause,
                    2 => ThreadOp::Deactivate,
                    _ => return Err(MachineError::InvalidOpcode { opcode, offset }),
                };
                Instruction::ControlThreads { first, last, op }
            }
            0x0D => Instruction::SelectVideoBuffer {
                buffer: BufferId::from_wire(cursor.read_u8()?)?,
            },
            0x0E => Instruction::FillVideoBuffer {
                buffer: BufferId::from_wire(cursor.read_u8()?)?,
                color: cursor.read_u8()?,
            },
            0x0F => Instruction::CopyVideoBuffer {
                src: cursor.read_u8()?,
                dst: BufferId::from_wire(cursor.read_u8()?)?,
            },
            0x10 => Instruction::RenderVideoBuffer {
                buffer: BufferId::from_wire(cursor.read_u8()?)?,
            },
            0x11 => Instruction::Kill,
            0x12 => Instruction::DrawString {
                id: cursor.read_u16()?,
                x: cursor.read_u8()?,
                y: cursor.read_u8()?,
                color: cursor.read_u8()?,
            },
            0x13 => Instruction::SubRegister {
                dst: cursor.read_u8()?,
                src: cursor.read_u8()?,
            },
            0x14 => Instruction::AndConst {
                dst: cursor.read_u8()?,
                value: cursor.read_u16()?,
            },
            0x15 => Instruction::OrConst {
                dst: cursor.read_u8()?,
                value: cursor.read_u16()?,
            },
            0x16 => Instruction::ShiftLeft {
                dst: cursor.read_u8()?,
                amount: cursor.read_u16()?,
            },
            0x17 => Instruction::ShiftRight {
                dst: cursor.read_u8()?,
                amount: cursor.read_u16()?,
            },
            0x18 => Instruction::PlaySound {
                id: cursor.read_u16()?,
                frequency_id: cursor.read_u8()?,
                volume: cursor.read_u8()?,
                channel: cursor.read_u8()?,
            },
            0x19 => Instruction::ControlResources {
                id: cursor.read_u16()?,
            },
            0x1A => Instruction::PlayMusic {
                id: cursor.read_u16()?,
                delay: cursor.read_u16()?,
                position: cursor.read_u8()?,
            },
            _ => return Err(MachineError::InvalidOpcode { opcode, offset }),
        };
        Ok(instruction)
    }

    fn decode_sprite_polygon(
        opcode: u8,
        cursor: &mut ProgramCursor,
    ) -> Result<Instruction, MachineError> {
        let address = cursor.read_u16()?.wrapping_mul(2);

        let x = match (opcode >> 4) & 0x03 {
            0 => Operand::Immediate(cursor.read_i16()?),
            1 => Operand::Register(cursor.read_u8()?),
            2 => Operand::Immediate(cursor.read_u8()? as i16),
            _ => Operand::Immediate(cursor.read_u8()? as i16 + 256),
        };
        let y = match (opcode >> 2) & 0x03 {
            0 => Operand::Immediate(cursor.read_i16()?),
            1 => Operand::Register(cursor.read_u8()?),
            _ => Operand::Immediate(cursor.read_u8()? as i16),
        };
        let (source, zoom) = match opcode & 0x03 {
            0 => (SpriteSource::Polygons, ZoomSource::Default),
            1 => (SpriteSource::Polygons, ZoomSource::Register(cursor.read_u8()?)),
            2 => (
                SpriteSource::Polygons,
                ZoomSource::Immediate(cursor.read_u8()? as u16),
            ),
            _ => (SpriteSource::Animations, ZoomSource::Default),
        };

        Ok(Instruction::DrawSpritePolygon {
            address,
            x,
            y,
            zoom,
            source,
        })
    }

    pub fn execute<R: Repository, H: Host>(
        self,
        machine: &mut Machine<R, H>,
        ctx: &mut ThreadContext,
    ) -> Result<Action, MachineError> {
        match self {
            Instruction::SetRegister { dst, value } => {
                machine.registers.set(dst, value);
            }
            Instruction::CopyRegister { dst, src } => {
                let value = machine.registers.get(src);
                machine.registers.set(dst, value);
            }
            Instruction::AddRegister { dst, src } => {
                let value = machine.registers.get(dst).wrapping_add(machine.registers.get(src));
                machine.registers.set(dst, value);
            }
            Instruction::AddConst { dst, value } => {
                let sum = machine.registers.get(dst).wrapping_add(value);
                machine.registers.set(dst, sum);
            }
            Instruction::Call { address } => {
                ctx.stack.push(ctx.cursor.counter() as u16)?;
                ctx.cursor.jump(address)?;
            }
            Instruction::Return => {
                let address = ctx.stack.pop()?;
                ctx.cursor.jump(address)?;
            }
            Instruction::Yield => return Ok(Action::Yield),
            Instruction::Kill => return Ok(Action::Deactivate),
            Instruction::Jump { address } => ctx.cursor.jump(address)?,
            Instruction::ActivateThread { thread, execution } => {
                if thread as usize >= THREAD_COUNT {
                    return Err(MachineError::InvalidThreadId(thread));
                }
                machine.threads.schedule_execution(thread, execution);
            }
            Instruction::DecrementJumpNonZero { reg, address } => {
                let value = machine.registers.get(reg).wrapping_sub(1);
                machine.registers.set(reg, value);
                if value != 0 {
                    ctx.cursor.jump(address)?;
                }
            }
            Instruction::ConditionalJump {
                condition,
                reg,
                operand,
                address,
            } => {
                let lhs = machine.registers.get(reg);
                let rhs = operand.resolve(machine);
                if condition.holds(lhs, rhs) {
                    ctx.cursor.jump(address)?;
                }
            }
            Instruction::SelectPalette { id } => {
                // The shipped bytecode occasionally selects palette 0x21;
                // such requests are dropped, not failed.
                crate::video::select_palette_lenient(&mut machine.video, id);
            }
            Instruction::ControlThreads { first, last, op } => {
                if first > last || last as usize >= THREAD_COUNT {
                    return Err(MachineError::InvalidThreadId(last));
                }
                for thread in first..=last {
                    match op {
                        ThreadOp::Resume => machine.threads.schedule_pause(thread, false),
                        ThreadOp::Pause => machine.threads.schedule_pause(thread, true),
                        ThreadOp::Deactivate => {
                            machine.threads.schedule_execution(thread, Execution::Inactive)
                        }
                    }
                }
            }
            Instruction::SelectVideoBuffer { buffer } => {
                machine.video.select_target(buffer)?;
            }
            Instruction::FillVideoBuffer { buffer, color } => {
                let index = machine.video.resolve(buffer)?;
                machine.video.fill(buffer, color)?;
                machine.host.on_buffer_changed(index);
            }
            Instruction::CopyVideoBuffer { src, dst } => {
                let index = machine.video.resolve(dst)?;
                let scroll = machine.registers.get(REG_SCROLL_Y);
                machine.video.copy(src, dst, scroll)?;
                machine.host.on_buffer_changed(index);
            }
            Instruction::RenderVideoBuffer { buffer } => {
                let delay =
                    machine.registers.get_unsigned(REG_PAUSE_SLICES) as u32 * FRAME_SLICE_MS;
                machine.registers.set(REG_FRAME_SCRATCH, 0);
                let shown = machine.video.render(buffer)?;
                machine.host.on_frame_ready(shown, delay);
            }
            Instruction::DrawString { id, x, y, color } => {
                machine.video.draw_string(id, x, y, color)?;
                machine.host.on_buffer_changed(machine.video.target_index());
            }
            Instruction::SubRegister { dst, src } => {
                let value = machine.registers.get(dst).wrapping_sub(machine.registers.get(src));
                machine.registers.set(dst, value);
            }
            Instruction::AndConst { dst, value } => {
                let bits = machine.registers.get_unsigned(dst) & value;
                machine.registers.set_unsigned(dst, bits);
            }
            Instruction::OrConst { dst, value } => {
                let bits = machine.registers.get_unsigned(dst) | value;
                machine.registers.set_unsigned(dst, bits);
            }
            Instruction::ShiftLeft { dst, amount } => {
                let bits = machine.registers.get_unsigned(dst) << (amount & 0xF);
                machine.registers.set_unsigned(dst, bits);
            }
            Instruction::ShiftRight { dst, amount } => {
                let bits = machine.registers.get_unsigned(dst) >> (amount & 0xF);
                machine.registers.set_unsigned(dst, bits);
            }
            Instruction::PlaySound {
                id,
                frequency_id,
                volume,
                channel,
            } => {
                machine.play_sound(id, frequency_id, volume, channel)?;
            }
            Instruction::ControlResources { id } => {
                machine.control_resources(id)?;
            }
            Instruction::PlayMusic { id, delay, position } => {
                machine.control_music(id, delay, position)?;
            }
            Instruction::DrawBackgroundPolygon { address, x, y } => {
                let polygons = machine.loaded_part()?.polygons.clone();
                machine
                    .video
                    .draw_polygon(&polygons, address, Point::new(x, y), DEFAULT_ZOOM)?;
                machine.host.on_buffer_changed(machine.video.target_index());
            }
            Instruction::DrawSpritePolygon {
                address,
                x,
                y,
                zoom,
                source,
            } => {
                let origin = Point::new(x.resolve(machine), y.resolve(machine));
                let zoom = match zoom {
                    ZoomSource::Default => DEFAULT_ZOOM,
                    ZoomSource::Immediate(value) => value,
                    ZoomSource::Register(reg) => machine.registers.get_unsigned(reg),
                };
                let part = machine.loaded_part()?;
                let data = match source {
                    SpriteSource::Polygons => part.polygons.clone(),
                    SpriteSource::Animations => match &part.animations {
                        Some(data) => data.clone(),
                        None => {
                            warn!("sprite draw from animation buffer, but the part has none");
                            return Ok(Action::Continue);
                        }
                    },
                };
                machine.video.draw_polygon(&data, address, origin, zoom)?;
                machine.host.on_buffer_changed(machine.video.target_index());
            }
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cursor(bytes: &[u8]) -> ProgramCursor {
        ProgramCursor::new(Arc::from(bytes))
    }

    #[test]
    fn fixed_payload_opcodes_decode() {
        let mut c = cursor(&[0x00, 0x07, 0x12, 0x34]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::SetRegister {
                dst: 7,
                value: 0x1234
            }
        );

        let mut c = cursor(&[0x0C, 1, 63, 0]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::ControlThreads {
                first: 1,
                last: 63,
                op: ThreadOp::Resume
            }
        );

        let mut c = cursor(&[0x11]);
        assert_eq!(Instruction::decode(&mut c).unwrap(), Instruction::Kill);
    }

    #[test]
    fn conditional_jump_operand_forms() {
        // Register operand (bit 7).
        let mut c = cursor(&[0x0A, 0x81, 5, 9, 0x00, 0x20]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::ConditionalJump {
                condition: Condition::NotEqual,
                reg: 5,
                operand: Operand::Register(9),
                address: 0x20
            }
        );

        // Wide immediate (bit 6).
        let mut c = cursor(&[0x0A, 0x44, 5, 0xFF, 0xFF, 0x00, 0x20]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::ConditionalJump {
                condition: Condition::Less,
                reg: 5,
                operand: Operand::Immediate(-1),
                address: 0x20
            }
        );

        // Narrow immediate is zero-extended.
        let mut c = cursor(&[0x0A, 0x00, 5, 0xC8, 0x00, 0x20]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::ConditionalJump {
                condition: Condition::Equal,
                reg: 5,
                operand: Operand::Immediate(200),
                address: 0x20
            }
        );
    }

    #[test]
    fn invalid_condition_is_an_invalid_opcode() {
        let mut c = cursor(&[0x0A, 0x07, 5, 1, 0x00, 0x20]);
        assert!(matches!(
            Instruction::decode(&mut c),
            Err(MachineError::InvalidOpcode { opcode: 0x0A, .. })
        ));
    }

    #[test]
    fn activate_thread_with_park_address_schedules_inactive() {
        let mut c = cursor(&[0x08, 12, 0xFF, 0xFE]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::ActivateThread {
                thread: 12,
                execution: Execution::Inactive
            }
        );

        let mut c = cursor(&[0x08, 12, 0x01, 0x00]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::ActivateThread {
                thread: 12,
                execution: Execution::Active(0x100)
            }
        );
    }

    #[test]
    fn background_polygon_packs_address_and_carries_y_overflow() {
        // Opcode 0x81, second address byte 0x23 -> address (0x0123) * 2.
        let mut c = cursor(&[0x81, 0x23, 10, 250]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::DrawBackgroundPolygon {
                address: 0x0123 << 1,
                x: 10 + (250 - 199),
                y: 199
            }
        );
    }

    #[test]
    fn sprite_polygon_selector_bits() {
        // 01 00 01 01: x = i16 imm, y = register, polygons + zoom register.
        let mut c = cursor(&[0x45, 0x00, 0x10, 0x01, 0x00, 60, 5]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::DrawSpritePolygon {
                address: 0x20,
                x: Operand::Immediate(0x100),
                y: Operand::Register(60),
                zoom: ZoomSource::Register(5),
                source: SpriteSource::Polygons,
            }
        );

        // 01 11 10 11: x = u8 + 256, y = u8, animations + default zoom.
        let mut c = cursor(&[0x7B, 0x00, 0x08, 40, 50]);
        assert_eq!(
            Instruction::decode(&mut c).unwrap(),
            Instruction::DrawSpritePolygon {
                address: 0x10,
                x: Operand::Immediate(40 + 256),
                y: Operand::Immediate(50),
                zoom: ZoomSource::Default,
                source: SpriteSource::Animations,
            }
        );
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut c = cursor(&[0x1B]);
        assert!(matches!(
            Instruction::decode(&mut c),
            Err(MachineError::InvalidOpcode { opcode: 0x1B, .. })
        ));
    }

    #[test]
    fn truncated_payload_is_end_of_program() {
        let mut c = cursor(&[0x00, 0x07]);
        assert!(matches!(
            Instruction::decode(&mut c),
            Err(MachineError::EndOfProgram)
        ));
    }
}
