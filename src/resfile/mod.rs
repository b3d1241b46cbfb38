//! On-disk resource access: the manifest catalog, the bank files and the
//! run-length decoder that sits between them.
//!
//! The rest of the crate consumes this module through the [`Repository`]
//! trait so that tests can swap the bank files for in-memory fixtures.

pub mod catalog;
pub mod unpack;

use crate::definitions::BANK_COUNT;
use log::debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::{error, fmt, io};
use walkdir::WalkDir;

pub use unpack::UnpackError;

pub const MANIFEST_FILE: &str = "MEMLIST.BIN";

/// What a resource's bytes decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// PCM sample data; also the kind byte of empty catalog slots.
    Sound,
    /// A music module (patterns + instrument references).
    Music,
    /// A full-screen planar bitmap, blitted into buffer 0 on load.
    Bitmap,
    /// 32 palettes of 16 colors.
    Palettes,
    /// A bytecode program.
    Bytecode,
    /// The cinematic polygon set of a game part.
    Polygons,
    /// The shared sprite polygon set some parts use in addition.
    SpritePolygons,
}

/// Where a resource lives and how big it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub bank_id: u8,
    pub bank_offset: u32,
    pub packed_size: u16,
    pub size: u16,
}

impl ResourceDescriptor {
    /// Equal sizes mean the bytes are stored without compression.
    pub fn is_stored_flat(&self) -> bool {
        self.packed_size == self.size
    }

    /// Catalog slots with no backing data.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[derive(Debug)]
pub enum ResourceError {
    InvalidResourceId(u8),
    BufferTooSmall { needed: usize, got: usize },
    TruncatedData,
    InvalidCompressedData(UnpackError),
    InvalidManifest(&'static str),
    RepositoryFailure(io::Error),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidResourceId(id) => write!(f, "invalid resource id {}", id),
            Self::BufferTooSmall { needed, got } => {
                write!(f, "buffer of {} bytes too small for {} bytes", got, needed)
            }
            Self::TruncatedData => write!(f, "resource data ends early"),
            Self::InvalidCompressedData(e) => write!(f, "invalid compressed data: {}", e),
            Self::InvalidManifest(reason) => write!(f, "invalid manifest: {}", reason),
            Self::RepositoryFailure(e) => write!(f, "repository failure: {}", e),
        }
    }
}

impl error::Error for ResourceError {}

impl From<UnpackError> for ResourceError {
    fn from(e: UnpackError) -> Self {
        ResourceError::InvalidCompressedData(e)
    }
}

impl From<io::Error> for ResourceError {
    fn from(e: io::Error) -> Self {
        ResourceError::RepositoryFailure(e)
    }
}

/// Capability object for the packaged game data.
pub trait Repository {
    /// The full descriptor table, dense and ordered by resource id.
    fn descriptors(&mut self) -> Result<Vec<ResourceDescriptor>, ResourceError>;

    /// Read one resource, decompressed, into `dest`. `dest` must hold at
    /// least `descriptor.size` bytes; the filled prefix is returned.
    fn read<'d>(
        &mut self,
        descriptor: &ResourceDescriptor,
        dest: &'d mut [u8],
    ) -> Result<&'d [u8], ResourceError>;
}

/// Decode a resource out of raw bank bytes into `dest`.
///
/// Shared by every repository implementation: picks the packed slice at
/// the descriptor's offset and either copies it or unpacks it.
pub fn read_from_bank<'d>(
    bank: &[u8],
    descriptor: &ResourceDescriptor,
    dest: &'d mut [u8],
) -> Result<&'d [u8], ResourceError> {
    let size = descriptor.size as usize;
    let packed_size = descriptor.packed_size as usize;
    if dest.len() < size {
        return Err(ResourceError::BufferTooSmall {
            needed: size,
            got: dest.len(),
        });
    }

    let start = descriptor.bank_offset as usize;
    let packed = bank
        .get(start..start + packed_size)
        .ok_or(ResourceError::TruncatedData)?;

    let out = &mut dest[..size];
    if descriptor.is_stored_flat() {
        out.copy_from_slice(packed);
    } else {
        unpack::unpack(out, packed)?;
    }
    Ok(out)
}

/// Repository backed by the original data files on disk.
pub struct DiskRepository {
    manifest: PathBuf,
    banks: Vec<Option<PathBuf>>,
}

impl DiskRepository {
    /// Scan `dir` for MEMLIST.BIN and the BANK files, in any file-name
    /// case.
    pub fn open(dir: &Path) -> Result<DiskRepository, ResourceError> {
        let mut manifest = None;
        let mut banks: Vec<Option<PathBuf>> = vec![None; BANK_COUNT as usize + 1];

        for entry in WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| !e.file_type().is_dir())
        {
            let path = entry.into_path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_ascii_uppercase(),
                None => continue,
            };

            if name == MANIFEST_FILE {
                manifest = Some(path);
            } else if let Some(digits) = name.strip_prefix("BANK") {
                if let Ok(id) = u8::from_str_radix(digits, 16) {
                    if (1..=BANK_COUNT).contains(&id) {
                        banks[id as usize] = Some(path);
                    }
                }
            }
        }

        let manifest = manifest.ok_or_else(|| {
            ResourceError::RepositoryFailure(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} in {}", MANIFEST_FILE, dir.display()),
            ))
        })?;

        debug!(
            "data directory {}: {} bank files",
            dir.display(),
            banks.iter().filter(|b| b.is_some()).count()
        );
        Ok(DiskRepository { manifest, banks })
    }

    fn bank_path(&self, id: u8) -> Result<&Path, ResourceError> {
        self.banks
            .get(id as usize)
            .and_then(|b| b.as_deref())
            .ok_or_else(|| {
                ResourceError::RepositoryFailure(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("bank {:02X} not found", id),
                ))
            })
    }
}

impl Repository for DiskRepository {
    fn descriptors(&mut self) -> Result<Vec<ResourceDescriptor>, ResourceError> {
        let mut data = Vec::new();
        File::open(&self.manifest)?.read_to_end(&mut data)?;
        catalog::parse_manifest(&data)
    }

    fn read<'d>(
        &mut self,
        descriptor: &ResourceDescriptor,
        dest: &'d mut [u8],
    ) -> Result<&'d [u8], ResourceError> {
        let size = descriptor.size as usize;
        if dest.len() < size {
            return Err(ResourceError::BufferTooSmall {
                needed: size,
                got: dest.len(),
            });
        }

        let mut file = File::open(self.bank_path(descriptor.bank_id)?)?;
        file.seek(SeekFrom::Start(descriptor.bank_offset as u64))?;

        let mut packed = vec![0u8; descriptor.packed_size as usize];
        file.read_exact(&mut packed)
            .map_err(|_| ResourceError::TruncatedData)?;

        let out = &mut dest[..size];
        if descriptor.is_stored_flat() {
            out.copy_from_slice(&packed);
        } else {
            unpack::unpack(out, &packed)?;
        }
        Ok(out)
    }
}

/// In-memory repository for unit tests and tools.
pub struct MemoryRepository {
    pub descriptors: Vec<ResourceDescriptor>,
    /// Indexed by bank id.
    pub banks: Vec<Vec<u8>>,
}

impl Repository for MemoryRepository {
    fn descriptors(&mut self) -> Result<Vec<ResourceDescriptor>, ResourceError> {
        Ok(self.descriptors.clone())
    }

    fn read<'d>(
        &mut self,
        descriptor: &ResourceDescriptor,
        dest: &'d mut [u8],
    ) -> Result<&'d [u8], ResourceError> {
        let bank = self
            .banks
            .get(descriptor.bank_id as usize)
            .ok_or(ResourceError::TruncatedData)?;
        read_from_bank(bank, descriptor, dest)
    }
}
