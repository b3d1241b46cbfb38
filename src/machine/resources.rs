//! Resource memory: the buffers currently resident in the machine.
//!
//! Individually loaded resources (sounds, music) live in an id-keyed
//! map until the next `unload_all` or game-part switch. The four
//! resources of the current game part live in their own slots and are
//! shared with the interpreter and the video model as `Arc` clones, so
//! eviction never invalidates a running program mid-tic.

use crate::resfile::{Repository, ResourceDescriptor, ResourceError, ResourceKind};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// The nine chapters of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePart {
    CopyProtection,
    IntroCinematic,
    Water,
    Jail,
    City,
    Arena,
    Luxury,
    Final,
    PasswordEntry,
}

/// Resource ids making up one game part.
pub struct PartResources {
    pub palettes: u8,
    pub bytecode: u8,
    pub polygons: u8,
    pub animations: Option<u8>,
}

impl GamePart {
    pub fn from_id(id: u16) -> Option<GamePart> {
        match id {
            0x3E80 => Some(GamePart::CopyProtection),
            0x3E81 => Some(GamePart::IntroCinematic),
            0x3E82 => Some(GamePart::Water),
            0x3E83 => Some(GamePart::Jail),
            0x3E84 => Some(GamePart::City),
            0x3E85 => Some(GamePart::Arena),
            0x3E86 => Some(GamePart::Luxury),
            0x3E87 => Some(GamePart::Final),
            0x3E88 => Some(GamePart::PasswordEntry),
            _ => None,
        }
    }

    pub fn id(self) -> u16 {
        match self {
            GamePart::CopyProtection => 0x3E80,
            GamePart::IntroCinematic => 0x3E81,
            GamePart::Water => 0x3E82,
            GamePart::Jail => 0x3E83,
            GamePart::City => 0x3E84,
            GamePart::Arena => 0x3E85,
            GamePart::Luxury => 0x3E86,
            GamePart::Final => 0x3E87,
            GamePart::PasswordEntry => 0x3E88,
        }
    }

    pub fn resources(self) -> PartResources {
        let (palettes, bytecode, polygons, animations) = match self {
            GamePart::CopyProtection => (0x14, 0x15, 0x16, None),
            GamePart::IntroCinematic => (0x17, 0x18, 0x19, None),
            GamePart::Water => (0x1A, 0x1B, 0x1C, Some(0x11)),
            GamePart::Jail => (0x1D, 0x1E, 0x1F, Some(0x11)),
            GamePart::City => (0x20, 0x21, 0x22, Some(0x11)),
            GamePart::Arena => (0x23, 0x24, 0x25, None),
            GamePart::Luxury => (0x26, 0x27, 0x28, Some(0x11)),
            GamePart::Final => (0x29, 0x2A, 0x2B, Some(0x11)),
            GamePart::PasswordEntry => (0x7D, 0x7E, 0x7F, None),
        };
        PartResources {
            palettes,
            bytecode,
            polygons,
            animations,
        }
    }
}

/// Buffers of the game part currently driving the machine.
pub struct LoadedPart {
    pub part: GamePart,
    pub bytecode: Arc<[u8]>,
    pub palettes: Arc<[u8]>,
    pub polygons: Arc<[u8]>,
    pub animations: Option<Arc<[u8]>>,
}

/// What an individual resource load produced.
pub enum LoadedResource {
    /// The resource is now resident and addressable by id.
    Retained,
    /// Bitmaps are handed back for an immediate blit and not retained.
    Bitmap(Arc<[u8]>),
    /// The id names an empty catalog slot; nothing was loaded.
    Empty,
}

pub struct ResourceMemory {
    descriptors: Vec<ResourceDescriptor>,
    loaded: HashMap<u8, Arc<[u8]>>,
}

impl ResourceMemory {
    pub fn new(descriptors: Vec<ResourceDescriptor>) -> ResourceMemory {
        ResourceMemory {
            descriptors,
            loaded: HashMap::new(),
        }
    }

    pub fn descriptor(&self, id: u8) -> Result<&ResourceDescriptor, ResourceError> {
        self.descriptors
            .get(id as usize)
            .ok_or(ResourceError::InvalidResourceId(id))
    }

    fn fetch<R: Repository>(
        &self,
        repository: &mut R,
        id: u8,
    ) -> Result<Arc<[u8]>, ResourceError> {
        let descriptor = *self.descriptor(id)?;
        let mut buffer = vec![0u8; descriptor.size as usize];
        repository.read(&descriptor, &mut buffer)?;
        Ok(buffer.into())
    }

    /// Load a single resource by id.
    pub fn load<R: Repository>(
        &mut self,
        repository: &mut R,
        id: u8,
    ) -> Result<LoadedResource, ResourceError> {
        if self.loaded.contains_key(&id) {
            return Ok(LoadedResource::Retained);
        }
        let descriptor = *self.descriptor(id)?;
        if descriptor.is_empty() {
            debug!("resource {:#04x} is an empty slot", id);
            return Ok(LoadedResource::Empty);
        }

        let buffer = self.fetch(repository, id)?;
        if descriptor.kind == ResourceKind::Bitmap {
            return Ok(LoadedResource::Bitmap(buffer));
        }
        self.loaded.insert(id, buffer);
        Ok(LoadedResource::Retained)
    }

    /// Load the four resources of a game part, evicting everything the
    /// previous part left behind.
    pub fn load_part<R: Repository>(
        &mut self,
        repository: &mut R,
        part: GamePart,
    ) -> Result<LoadedPart, ResourceError> {
        self.loaded.clear();

        let ids = part.resources();
        let palettes = self.fetch(repository, ids.palettes)?;
        let bytecode = self.fetch(repository, ids.bytecode)?;
        let polygons = self.fetch(repository, ids.polygons)?;
        let animations = match ids.animations {
            Some(id) => Some(self.fetch(repository, id)?),
            None => None,
        };
        debug!("loaded game part {:?} ({:#06x})", part, part.id());

        Ok(LoadedPart {
            part,
            bytecode,
            palettes,
            polygons,
            animations,
        })
    }

    /// Evict the individually loaded resources; part slots are owned by
    /// the machine and unaffected.
    pub fn unload_all(&mut self) {
        self.loaded.clear();
    }

    /// Address of a loaded resource, if resident.
    pub fn resource(&self, id: u8) -> Option<Arc<[u8]>> {
        self.loaded.get(&id).cloned()
    }
}
