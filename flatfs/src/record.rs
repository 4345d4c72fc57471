//! On-disk record layouts.
//!
//! The disk is partitioned on demand into two kinds of records, each
//! prefixed by a tag byte identifying its kind and liveness:
//!
//! **File header** ([`FILE_HEADER_SIZE`] bytes):
//!
//! | Offset | Width | Field                       |
//! |--------|-------|-----------------------------|
//! | 0      | 1     | tag                         |
//! | 1      | 32    | name, NUL-padded            |
//! | 33     | 8     | id (name hash)              |
//! | 41     | 8     | payload size in bytes       |
//! | 49     | 1     | kind (file / directory)     |
//! | 50     | 1     | open-mode bits              |
//! | 51     | 8     | first data block, 0 = empty |
//!
//! **Data block** ([`BLOCK_RECORD_SIZE`] bytes): tag(1), data(32),
//! bytes_used(4), next(8); see [`crate::block`] for the field accessors.
//!
//! A tag byte of 0 marks format-time free space that has never been
//! carved into a record.

use serde::Serialize;

use crate::disk::Disk;
use crate::error::{Error, Result};

/// Payload capacity of one data block.
pub const BLOCK_SIZE: u64 = 32;

/// Maximum stored length of a component name.
pub(crate) const NAME_SIZE: usize = 32;

/// Serialized size of a file header record.
pub(crate) const FILE_HEADER_SIZE: u64 = 59;

/// Serialized size of a data block record.
pub(crate) const BLOCK_RECORD_SIZE: u64 = 45;

/// Offset of a block's payload bytes within its record.
pub(crate) const BLOCK_DATA: u64 = 1;

/// Offset of a block's `bytes_used` field within its record.
pub(crate) const BLOCK_BYTES_USED: u64 = 33;

/// Offset of a block's `next` link within its record.
pub(crate) const BLOCK_NEXT: u64 = 37;

/// Record tag byte: kind and liveness in one discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Tag {
    /// A live data block.
    Used = 1,
    /// A tombstoned data block, reusable by the allocator.
    Free = 2,
    /// A live file header.
    FileHeader = 3,
    /// A tombstoned file header.
    FileHeaderFree = 4,
}

impl Tag {
    /// Decodes a tag byte; `None` for untagged (free) bytes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Used),
            2 => Some(Self::Free),
            3 => Some(Self::FileHeader),
            4 => Some(Self::FileHeaderFree),
            _ => None,
        }
    }

    /// The tombstone form of a live tag.
    pub fn freed(self) -> Self {
        match self {
            Self::Used | Self::Free => Self::Free,
            Self::FileHeader | Self::FileHeaderFree => Self::FileHeaderFree,
        }
    }
}

/// What a file header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory: a file whose payload is a slot array.
    Dir,
}

impl FileKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::File => 1,
            Self::Dir => 2,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::File),
            2 => Some(Self::Dir),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // pad() so callers can column-align listings.
        match self {
            Self::File => f.pad("file"),
            Self::Dir => f.pad("dir"),
        }
    }
}

/// Open-mode bits stored in a file header.
///
/// Exactly one bit is set while a file is open; `None` (all bits clear)
/// is the closed state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum OpenMode {
    /// Closed; no access.
    #[default]
    None,
    /// Opened for reading.
    Read,
    /// Opened for writing; truncates on open.
    Write,
    /// Opened for appending; preserves the existing chain.
    Append,
}

impl OpenMode {
    fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Read => 1,
            Self::Write => 2,
            Self::Append => 4,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            4 => Some(Self::Append),
            _ => None,
        }
    }

    /// Whether this mode permits writing through the public API.
    pub(crate) fn is_writable(self) -> bool {
        matches!(self, Self::Write | Self::Append)
    }
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.pad("none"),
            Self::Read => f.pad("read"),
            Self::Write => f.pad("write"),
            Self::Append => f.pad("append"),
        }
    }
}

/// A decoded file header record.
#[derive(Debug, Clone)]
pub(crate) struct FileHeader {
    /// Component name, NUL-padded to [`NAME_SIZE`].
    pub name: [u8; NAME_SIZE],
    /// Stable hash of the (untruncated) component name.
    pub id: u64,
    /// Payload size in bytes.
    pub size: u64,
    /// File or directory.
    pub kind: FileKind,
    /// Current open mode.
    pub mode: OpenMode,
    /// Offset of the first data block, 0 when the payload is empty.
    pub first_block: u64,
}

impl FileHeader {
    /// Builds a fresh header for a new file. Names longer than
    /// [`NAME_SIZE`] bytes are truncated in storage; `id` should cover
    /// the untruncated name.
    pub fn new(name: &str, id: u64, kind: FileKind) -> Self {
        let mut stored = [0u8; NAME_SIZE];
        let raw = name.as_bytes();
        let len = raw.len().min(NAME_SIZE);
        stored[..len].copy_from_slice(&raw[..len]);
        Self {
            name: stored,
            id,
            size: 0,
            kind,
            mode: OpenMode::None,
            first_block: 0,
        }
    }

    /// The stored name as a string, trimmed at the first NUL.
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Decodes the record at `offset`, verifying it is a live header.
    ///
    /// A tombstoned or never-written record fails with [`Error::BadTag`],
    /// which is also how stale handles surface after a removal.
    pub fn read_at(disk: &Disk, offset: u64) -> Result<Self> {
        disk.check_access(offset)?;
        let tag = disk.read_u8_at(offset)?;
        if Tag::from_byte(tag) != Some(Tag::FileHeader) {
            return Err(Error::BadTag {
                offset,
                found: tag,
                expected: Tag::FileHeader as u8,
            });
        }
        let mut name = [0u8; NAME_SIZE];
        name.copy_from_slice(disk.bytes(offset + 1, NAME_SIZE as u64)?);
        let id = disk.read_u64_at(offset + 33)?;
        let size = disk.read_u64_at(offset + 41)?;
        let kind_byte = disk.read_u8_at(offset + 49)?;
        let kind = FileKind::from_byte(kind_byte).ok_or(Error::BadTag {
            offset,
            found: kind_byte,
            expected: FileKind::File.to_byte(),
        })?;
        let mode_byte = disk.read_u8_at(offset + 50)?;
        let mode = OpenMode::from_byte(mode_byte).unwrap_or(OpenMode::None);
        let first_block = disk.read_u64_at(offset + 51)?;
        Ok(Self {
            name,
            id,
            size,
            kind,
            mode,
            first_block,
        })
    }

    /// Encodes the record at `offset`, tag byte included.
    pub fn write_at(&self, disk: &mut Disk, offset: u64) -> Result<()> {
        disk.check_access(offset)?;
        disk.write_u8_at(offset, Tag::FileHeader as u8)?;
        disk.write_bytes(offset + 1, &self.name)?;
        disk.write_u64_at(offset + 33, self.id)?;
        disk.write_u64_at(offset + 41, self.size)?;
        disk.write_u8_at(offset + 49, self.kind.to_byte())?;
        disk.write_u8_at(offset + 50, self.mode.to_byte())?;
        disk.write_u64_at(offset + 51, self.first_block)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut disk = Disk::format(256).unwrap();
        let mut hdr = FileHeader::new("notes.txt", 42, FileKind::File);
        hdr.size = 17;
        hdr.mode = OpenMode::Append;
        hdr.first_block = 100;
        hdr.write_at(&mut disk, 28).unwrap();

        let back = FileHeader::read_at(&disk, 28).unwrap();
        assert_eq!(back.name_str(), "notes.txt");
        assert_eq!(back.id, 42);
        assert_eq!(back.size, 17);
        assert_eq!(back.kind, FileKind::File);
        assert_eq!(back.mode, OpenMode::Append);
        assert_eq!(back.first_block, 100);
    }

    #[test]
    fn long_names_truncate_in_storage() {
        let long = "a".repeat(NAME_SIZE + 10);
        let hdr = FileHeader::new(&long, 1, FileKind::File);
        assert_eq!(hdr.name_str().len(), NAME_SIZE);
    }

    #[test]
    fn reading_untagged_bytes_is_bad_tag() {
        let disk = Disk::format(256).unwrap();
        assert!(matches!(
            FileHeader::read_at(&disk, 28),
            Err(Error::BadTag { .. })
        ));
    }

    #[test]
    fn freed_forms() {
        assert_eq!(Tag::Used.freed(), Tag::Free);
        assert_eq!(Tag::FileHeader.freed(), Tag::FileHeaderFree);
    }
}
