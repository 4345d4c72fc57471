//! The directory engine.
//!
//! A directory is a file whose payload is a packed array of 8-byte
//! offsets. Slot 0 is the directory's own offset, slot 1 its parent's
//! (the root points at itself). Every later slot holds either the offset
//! of a live file header or 0, a tombstone left by a removal. Slots are
//! written in whole 8-byte units and the block capacity is a multiple of
//! 8, so a slot never straddles two blocks.

use tracing::debug;

use crate::alloc;
use crate::block;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::hash::hash_name;
use crate::record::{BLOCK_DATA, FILE_HEADER_SIZE, FileHeader, FileKind, Tag};

/// Width of one directory slot.
const SLOT_SIZE: u64 = 8;

/// Index of the first user entry (after self and parent).
const FIRST_USER_SLOT: usize = 2;

/// One payload slot of a directory: where the 8-byte cell lives on disk
/// and the offset stored in it (0 for a tombstone).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    /// Disk offset of the cell itself.
    pub addr: u64,
    /// Offset stored in the cell.
    pub value: u64,
}

/// A located child: its header record and the parent slot that points
/// at it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Found {
    /// Offset of the child's file header.
    pub header: u64,
    /// Disk offset of the parent-directory cell holding `header`.
    pub slot: u64,
}

/// Collects every payload slot of `dir`, in slot order, tombstones
/// included.
pub(crate) fn slots(disk: &Disk, dir: u64) -> Result<Vec<Slot>> {
    let header = FileHeader::read_at(disk, dir)?;
    if header.kind != FileKind::Dir {
        return Err(Error::WrongType {
            name: header.name_str(),
            expected: "directory",
        });
    }
    let mut out = Vec::new();
    let mut offset = header.first_block;
    while disk.can_access(offset) {
        let used = block::bytes_used(disk, offset)?;
        let mut cell = 0;
        while cell + SLOT_SIZE <= used {
            let addr = offset + BLOCK_DATA + cell;
            out.push(Slot {
                addr,
                value: disk.read_u64_at(addr)?,
            });
            cell += SLOT_SIZE;
        }
        offset = block::next(disk, offset)?;
    }
    Ok(out)
}

/// Searches `dir` for a child whose header id equals `id`, skipping the
/// self and parent slots.
pub(crate) fn find_child(disk: &Disk, dir: u64, id: u64) -> Result<Option<Found>> {
    for slot in slots(disk, dir)?.iter().skip(FIRST_USER_SLOT) {
        if slot.value == 0 {
            continue;
        }
        let child = FileHeader::read_at(disk, slot.value)?;
        if child.id == id {
            return Ok(Some(Found {
                header: slot.value,
                slot: slot.addr,
            }));
        }
    }
    Ok(None)
}

/// Publishes `child` in `dir`: reuses the first tombstone slot if one
/// exists, otherwise appends a new slot through the block engine.
fn add_child(disk: &mut Disk, dir: u64, child: u64) -> Result<()> {
    let tombstone = slots(disk, dir)?
        .iter()
        .skip(FIRST_USER_SLOT)
        .find(|slot| slot.value == 0)
        .map(|slot| slot.addr);
    match tombstone {
        Some(addr) => disk.write_u64_at(addr, child),
        None => block::write_data(disk, dir, &child.to_le_bytes()),
    }
}

/// Whether `dir` holds no live user entries (tombstones don't count).
pub(crate) fn is_empty(disk: &Disk, dir: u64) -> Result<bool> {
    Ok(slots(disk, dir)?
        .iter()
        .skip(FIRST_USER_SLOT)
        .all(|slot| slot.value == 0))
}

/// The parent directory recorded in slot 1. The root is its own parent.
pub(crate) fn parent_of(disk: &Disk, dir: u64) -> Result<u64> {
    let all = slots(disk, dir)?;
    match all.get(1) {
        Some(slot) if disk.can_access(slot.value) => Ok(slot.value),
        _ => Err(Error::InvalidOffset { offset: dir }),
    }
}

/// Creates a file or directory named `name` inside `parent` and
/// publishes it there.
///
/// Nothing is visible until every step has succeeded: the header, a
/// directory's `[self, parent]` payload, and the parent slot either all
/// land or are rolled back together.
pub(crate) fn create_child(
    disk: &mut Disk,
    parent: u64,
    name: &str,
    kind: FileKind,
) -> Result<u64> {
    let id = hash_name(name);
    if find_child(disk, parent, id)?.is_some() {
        return Err(Error::AlreadyExists { name: name.into() });
    }

    let offset = alloc::allocate(disk, FILE_HEADER_SIZE)?;
    FileHeader::new(name, id, kind).write_at(disk, offset)?;

    if kind == FileKind::Dir {
        // Slot 0: self, slot 1: parent.
        if let Err(err) = block::write_data(disk, offset, &offset.to_le_bytes())
            .and_then(|()| block::write_data(disk, offset, &parent.to_le_bytes()))
        {
            rollback(disk, offset)?;
            return Err(err);
        }
    }

    if let Err(err) = add_child(disk, parent, offset) {
        rollback(disk, offset)?;
        return Err(err);
    }

    debug!(name, %kind, offset, "created entry");
    Ok(offset)
}

/// Undoes a half-built [`create_child`]: releases the payload chain and
/// tombstones the header.
fn rollback(disk: &mut Disk, offset: u64) -> Result<()> {
    block::truncate(disk, offset)?;
    alloc::free_record(disk, offset, FILE_HEADER_SIZE, Tag::FileHeader)
}

/// Unlinks the child at `found` from its parent and destroys it: chain
/// released, header tombstoned, parent slot zeroed.
pub(crate) fn remove_child(disk: &mut Disk, found: Found) -> Result<()> {
    let header = FileHeader::read_at(disk, found.header)?;
    block::truncate(disk, found.header)?;
    alloc::free_record(disk, found.header, FILE_HEADER_SIZE, Tag::FileHeader)?;
    disk.write_u64_at(found.slot, 0)?;
    debug!(name = %header.name_str(), offset = found.header, "removed entry");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A disk with a hand-rolled root directory, as `FileSystem::init`
    /// builds one.
    fn disk_with_root(size: u64) -> (Disk, u64) {
        let mut disk = Disk::format(size).unwrap();
        let root = alloc::allocate(&mut disk, FILE_HEADER_SIZE).unwrap();
        FileHeader::new("root", hash_name("root"), FileKind::Dir)
            .write_at(&mut disk, root)
            .unwrap();
        block::write_data(&mut disk, root, &root.to_le_bytes()).unwrap();
        block::write_data(&mut disk, root, &root.to_le_bytes()).unwrap();
        disk.set_root_directory(root).unwrap();
        disk.set_current_directory(root).unwrap();
        (disk, root)
    }

    #[test]
    fn root_slots_are_self_and_parent() {
        let (disk, root) = disk_with_root(4096);
        let all = slots(&disk, root).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].value, root);
        assert_eq!(all[1].value, root);
        assert_eq!(parent_of(&disk, root).unwrap(), root);
        assert!(is_empty(&disk, root).unwrap());
    }

    #[test]
    fn create_find_round_trip() {
        let (mut disk, root) = disk_with_root(8192);
        let child = create_child(&mut disk, root, "notes.txt", FileKind::File).unwrap();

        let found = find_child(&disk, root, hash_name("notes.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(found.header, child);
        assert!(find_child(&disk, root, hash_name("missing")).unwrap().is_none());
        assert!(!is_empty(&disk, root).unwrap());
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let (mut disk, root) = disk_with_root(8192);
        create_child(&mut disk, root, "a", FileKind::File).unwrap();
        assert!(matches!(
            create_child(&mut disk, root, "a", FileKind::File),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn subdirectory_points_back_at_parent() {
        let (mut disk, root) = disk_with_root(8192);
        let sub = create_child(&mut disk, root, "p", FileKind::Dir).unwrap();
        let all = slots(&disk, sub).unwrap();
        assert_eq!(all[0].value, sub);
        assert_eq!(all[1].value, root);
        assert_eq!(parent_of(&disk, sub).unwrap(), root);
    }

    #[test]
    fn removal_tombstones_the_slot_and_reuses_it() {
        let (mut disk, root) = disk_with_root(8192);
        create_child(&mut disk, root, "a", FileKind::File).unwrap();
        create_child(&mut disk, root, "b", FileKind::File).unwrap();

        let found = find_child(&disk, root, hash_name("a")).unwrap().unwrap();
        let slot_addr = found.slot;
        remove_child(&mut disk, found).unwrap();

        assert!(find_child(&disk, root, hash_name("a")).unwrap().is_none());
        assert_eq!(disk.read_u64_at(slot_addr).unwrap(), 0);

        // The payload does not grow back: the tombstone slot is reused.
        let before = slots(&disk, root).unwrap().len();
        let again = create_child(&mut disk, root, "c", FileKind::File).unwrap();
        assert_eq!(slots(&disk, root).unwrap().len(), before);
        assert_eq!(disk.read_u64_at(slot_addr).unwrap(), again);
    }

    #[test]
    fn many_children_extend_the_slot_chain() {
        let (mut disk, root) = disk_with_root(64 * 1024);
        for i in 0..20 {
            create_child(&mut disk, root, &format!("f{i}"), FileKind::File).unwrap();
        }
        for i in 0..20 {
            assert!(
                find_child(&disk, root, hash_name(&format!("f{i}")))
                    .unwrap()
                    .is_some()
            );
        }
        assert_eq!(slots(&disk, root).unwrap().len(), 22);
    }

    #[test]
    fn failed_create_publishes_nothing() {
        // Too small for a directory's header plus payload chain.
        let (mut disk, root) = disk_with_root(
            crate::disk::HEADER_SIZE + FILE_HEADER_SIZE + 2 * crate::record::BLOCK_RECORD_SIZE
                + FILE_HEADER_SIZE + 1,
        );
        assert!(matches!(
            create_child(&mut disk, root, "d", FileKind::Dir),
            Err(Error::OutOfSpace { .. })
        ));
        assert!(is_empty(&disk, root).unwrap());
        assert!(find_child(&disk, root, hash_name("d")).unwrap().is_none());
    }
}
