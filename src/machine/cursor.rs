//! Byte cursor over the current bytecode program.

use super::error::MachineError;
use byteorder::{BigEndian, ReadBytesExt};
use std::sync::Arc;

pub struct ProgramCursor {
    code: Arc<[u8]>,
    counter: usize,
}

impl ProgramCursor {
    pub fn new(code: Arc<[u8]>) -> ProgramCursor {
        ProgramCursor { code, counter: 0 }
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn is_at_end(&self) -> bool {
        self.counter == self.code.len()
    }

    pub fn jump(&mut self, address: u16) -> Result<(), MachineError> {
        if address as usize >= self.code.len() {
            return Err(MachineError::InvalidAddress(address));
        }
        self.counter = address as usize;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, MachineError> {
        let value = (&self.code[self.counter..])
            .read_u8()
            .map_err(|_| MachineError::EndOfProgram)?;
        self.counter += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, MachineError> {
        let value = (&self.code[self.counter..])
            .read_u16::<BigEndian>()
            .map_err(|_| MachineError::EndOfProgram)?;
        self.counter += 2;
        Ok(value)
    }

    pub fn read_i16(&mut self) -> Result<i16, MachineError> {
        let value = (&self.code[self.counter..])
            .read_i16::<BigEndian>()
            .map_err(|_| MachineError::EndOfProgram)?;
        self.counter += 2;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(bytes: &[u8]) -> ProgramCursor {
        ProgramCursor::new(Arc::from(bytes))
    }

    #[test]
    fn typed_reads_advance_the_counter() {
        let mut c = cursor(&[0x12, 0x34, 0x56, 0xFF, 0xFE]);
        assert_eq!(c.read_u8().unwrap(), 0x12);
        assert_eq!(c.read_u16().unwrap(), 0x3456);
        assert_eq!(c.read_i16().unwrap(), -2);
        assert_eq!(c.counter(), 5);
        assert!(c.is_at_end());
    }

    #[test]
    fn reading_past_the_end_fails() {
        let mut c = cursor(&[0x12]);
        assert!(matches!(c.read_u16(), Err(MachineError::EndOfProgram)));
        c.read_u8().unwrap();
        assert!(matches!(c.read_u8(), Err(MachineError::EndOfProgram)));
    }

    #[test]
    fn jump_validates_the_target() {
        let mut c = cursor(&[0, 1, 2, 3]);
        c.jump(3).unwrap();
        assert_eq!(c.counter(), 3);
        assert!(matches!(c.jump(4), Err(MachineError::InvalidAddress(4))));
    }
}
