//! RB-043: MBR partition table reader.

use crate::core::error::{Error, Result};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Partition type codes scripts can refer to by name.
pub const KNOWN_TYPES: &[(u8, &str)] = &[(0x0c, "FAT32-LBA"), (0x83, "Native Linux")];

pub fn type_name(code: u8) -> &'static str {
    KNOWN_TYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub index: usize,
    pub type_code: u8,
    pub bootable: bool,
    pub empty: bool,
    pub lba_start: u32,
    pub lba_length: u32,
}

impl PartitionEntry {
    pub fn type_name(&self) -> &'static str {
        type_name(self.type_code)
    }
}

pub trait PartitionReader {
    fn read_partitions(&self, image: &Path) -> Result<Vec<PartitionEntry>>;
}

/// Reads the four primary entries of a DOS partition table.
#[derive(Debug, Default, Clone, Copy)]
pub struct MbrReader;

const TABLE_OFFSET: usize = 446;
const ENTRY_SIZE: usize = 16;

/// Decode the first sector of an image.
pub fn parse_mbr(sector: &[u8; 512]) -> Result<Vec<PartitionEntry>> {
    if sector[510] != 0x55 || sector[511] != 0xaa {
        return Err(Error::eval("invalid MBR: missing boot signature"));
    }
    let mut out = Vec::with_capacity(4);
    for index in 0..4 {
        let e = &sector[TABLE_OFFSET + index * ENTRY_SIZE..TABLE_OFFSET + (index + 1) * ENTRY_SIZE];
        let word = |at: usize| u32::from_le_bytes([e[at], e[at + 1], e[at + 2], e[at + 3]]);
        out.push(PartitionEntry {
            index,
            type_code: e[4],
            bootable: e[0] == 0x80,
            empty: e[4] == 0,
            lba_start: word(8),
            lba_length: word(12),
        });
    }
    Ok(out)
}

impl PartitionReader for MbrReader {
    fn read_partitions(&self, image: &Path) -> Result<Vec<PartitionEntry>> {
        let ctx = || format!("read partitions of {}", image.display());
        let mut f = File::open(image).map_err(|e| Error::resource(ctx(), e))?;
        let mut sector = [0u8; 512];
        f.read_exact(&mut sector).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::resource(ctx(), io::Error::new(e.kind(), "image shorter than one sector"))
            } else {
                Error::resource(ctx(), e)
            }
        })?;
        parse_mbr(&sector)
    }
}
