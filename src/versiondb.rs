//! Reader for Address Library for SKSE Plugins databases.
//!
//! Each database maps stable ids to module-relative offsets for one exact game version. Ids stay
//! the same across versions of the same edition, so a call site is described once by id and found
//! in whatever build is running.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use binrw::{binrw, BinReaderExt};

use super::address::{BuildVariant, RuntimeVersion};

const PLUGIN_DIR: &str = r"Data\SKSE\Plugins";

#[binrw]
#[brw(little)]
#[derive(Debug)]
struct Header {
    format: u32,
    version: [u32; 4],
    #[bw(calc = name.len() as u32)]
    name_len: u32,
    #[br(count = name_len)]
    name: Vec<u8>,
    pointer_size: u32,
    address_count: u32,
}

/// Id to offset map for a single game version
#[derive(Debug, Default)]
pub struct VersionDb {
    version: [u32; 4],
    offsets: HashMap<u64, usize>,
}

/// Database file name for the given runtime, relative to the game directory
pub fn file_name(runtime: RuntimeVersion) -> Result<PathBuf> {
    let prefix = match runtime.variant()? {
        BuildVariant::SpecialEdition => "version",
        BuildVariant::AnniversaryEdition => "versionlib",
        BuildVariant::VirtualReality => bail!("No address library database format for {}", runtime),
    };
    Ok(Path::new(PLUGIN_DIR).join(format!(
        "{}-{}-{}-{}-0.bin",
        prefix,
        runtime.major(),
        runtime.minor(),
        runtime.build()
    )))
}

impl VersionDb {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let buf = fs::read(path)
            .with_context(|| format!("Could not read address library {}", path.display()))?;
        Self::parse(&mut Cursor::new(buf))
            .with_context(|| format!("Address library {} is corrupt", path.display()))
    }

    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header: Header = reader.read_le()?;
        if !matches!(header.format, 1 | 2) {
            bail!("Unsupported database format {}", header.format);
        }
        if header.pointer_size == 0 {
            bail!("Database pointer size is zero");
        }

        let pointer_size = header.pointer_size as u64;
        let mut offsets = HashMap::with_capacity(header.address_count as usize);
        let mut prev_id = 0u64;
        let mut prev_offset = 0u64;
        for _ in 0..header.address_count {
            let kind: u8 = reader.read_le()?;
            let id_kind = kind & 0xF;
            let offset_kind = kind >> 4;

            let id = match id_kind {
                0 => reader.read_le::<u64>()?,
                1 => prev_id.wrapping_add(1),
                2 => prev_id.wrapping_add(reader.read_le::<u8>()? as u64),
                3 => prev_id.wrapping_sub(reader.read_le::<u8>()? as u64),
                4 => prev_id.wrapping_add(reader.read_le::<u16>()? as u64),
                5 => prev_id.wrapping_sub(reader.read_le::<u16>()? as u64),
                6 => reader.read_le::<u16>()? as u64,
                7 => reader.read_le::<u32>()? as u64,
                _ => bail!("Bad id encoding {:#x} after id {}", kind, prev_id),
            };

            // the high bit means offsets are stored in units of pointers
            let scaled = offset_kind & 8 != 0;
            let base = if scaled {
                prev_offset / pointer_size
            } else {
                prev_offset
            };
            let mut offset = match offset_kind & 7 {
                0 => reader.read_le::<u64>()?,
                1 => base.wrapping_add(1),
                2 => base.wrapping_add(reader.read_le::<u8>()? as u64),
                3 => base.wrapping_sub(reader.read_le::<u8>()? as u64),
                4 => base.wrapping_add(reader.read_le::<u16>()? as u64),
                5 => base.wrapping_sub(reader.read_le::<u16>()? as u64),
                6 => reader.read_le::<u16>()? as u64,
                _ => reader.read_le::<u32>()? as u64,
            };
            if scaled {
                offset = offset.wrapping_mul(pointer_size);
            }

            offsets.insert(id, offset as usize);
            prev_id = id;
            prev_offset = offset;
        }

        Ok(Self {
            version: header.version,
            offsets,
        })
    }

    /// The game version this database was built for
    pub fn version(&self) -> [u32; 4] {
        self.version
    }

    pub fn matches(&self, runtime: RuntimeVersion) -> bool {
        self.version[..3] == [runtime.major(), runtime.minor(), runtime.build()]
    }

    pub fn offset(&self, id: u64) -> Result<usize> {
        self.offsets
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("Id {} is not in the address library", id))
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
