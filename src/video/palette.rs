//! Palette resource parsing.
//!
//! A palette resource holds 32 palettes of 16 colors, two bytes per
//! color, for the VGA half of the file; the second kilobyte is the
//! legacy EGA fallback and is never read. Each color is a 12-bit
//! R4G4B4 value widened to 8 bits per channel.

use super::VideoError;
use byteorder::{BigEndian, ByteOrder};

pub const PALETTE_COUNT: u8 = 32;
pub const COLORS_PER_PALETTE: usize = 16;
const PALETTE_BYTES: usize = COLORS_PER_PALETTE * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub colors: [Color; COLORS_PER_PALETTE],
}

impl Palette {
    /// Extract palette `id` from a palette resource.
    pub fn from_resource(data: &[u8], id: u8) -> Result<Palette, VideoError> {
        if id >= PALETTE_COUNT {
            return Err(VideoError::InvalidPaletteId(id));
        }
        let start = id as usize * PALETTE_BYTES;
        let slice = data
            .get(start..start + PALETTE_BYTES)
            .ok_or(VideoError::InvalidPaletteData)?;

        let mut colors = [Color::default(); COLORS_PER_PALETTE];
        for (color, raw) in colors.iter_mut().zip(slice.chunks_exact(2)) {
            let packed = BigEndian::read_u16(raw);
            let r = ((packed >> 8) & 0xF) as u8;
            let g = ((packed >> 4) & 0xF) as u8;
            let b = (packed & 0xF) as u8;
            *color = Color {
                r: (r << 4) | r,
                g: (g << 4) | g,
                b: (b << 4) | b,
            };
        }
        Ok(Palette { colors })
    }
}
