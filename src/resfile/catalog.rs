//! Parser for the resource manifest (MEMLIST.BIN).
//!
//! The manifest is a stream of fixed 20-byte big-endian records, one per
//! resource id, terminated by a record whose leading byte is 0xFF. Most
//! of each record is legacy loader state that only mattered to the
//! original executable; the fields kept here are the ones needed to find
//! and size the resource inside its bank file.

use super::{ResourceDescriptor, ResourceError, ResourceKind};
use crate::definitions::BANK_COUNT;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

const RECORD_END: u8 = 0xFF;

impl ResourceKind {
    pub fn from_wire(kind: u8) -> Option<ResourceKind> {
        match kind {
            0 => Some(ResourceKind::Sound),
            1 => Some(ResourceKind::Music),
            2 => Some(ResourceKind::Bitmap),
            3 => Some(ResourceKind::Palettes),
            4 => Some(ResourceKind::Bytecode),
            5 => Some(ResourceKind::Polygons),
            6 => Some(ResourceKind::SpritePolygons),
            _ => None,
        }
    }
}

struct RawRecord {
    kind: u8,
    bank_id: u8,
    bank_offset: u32,
    packed_size: u16,
    size: u16,
}

fn read_record(input: &mut &[u8]) -> std::io::Result<RawRecord> {
    let kind = input.read_u8()?;
    // Buffer pointer and rank fields of the original loader.
    let mut legacy = [0u8; 5];
    input.read_exact(&mut legacy)?;
    let bank_id = input.read_u8()?;
    let bank_offset = input.read_u32::<BigEndian>()?;
    input.read_u16::<BigEndian>()?;
    let packed_size = input.read_u16::<BigEndian>()?;
    input.read_u16::<BigEndian>()?;
    let size = input.read_u16::<BigEndian>()?;
    Ok(RawRecord {
        kind,
        bank_id,
        bank_offset,
        packed_size,
        size,
    })
}

/// Parse the manifest into a dense, id-ordered descriptor table.
pub fn parse_manifest(data: &[u8]) -> Result<Vec<ResourceDescriptor>, ResourceError> {
    let mut input = data;
    let mut descriptors = Vec::new();

    loop {
        let status = input
            .read_u8()
            .map_err(|_| ResourceError::InvalidManifest("missing terminator record"))?;
        if status == RECORD_END {
            break;
        }

        let RawRecord {
            kind: kind_byte,
            bank_id,
            bank_offset,
            packed_size,
            size,
        } = read_record(&mut input)
            .map_err(|_| ResourceError::InvalidManifest("truncated record"))?;

        let kind = ResourceKind::from_wire(kind_byte)
            .ok_or(ResourceError::InvalidManifest("unknown resource kind"))?;
        if packed_size > size {
            return Err(ResourceError::InvalidManifest(
                "compressed size exceeds uncompressed size",
            ));
        }
        if size > 0 && !(1..=BANK_COUNT).contains(&bank_id) {
            return Err(ResourceError::InvalidManifest("bank id out of range"));
        }

        descriptors.push(ResourceDescriptor {
            kind,
            bank_id,
            bank_offset,
            packed_size,
            size,
        });
    }

    Ok(descriptors)
}
