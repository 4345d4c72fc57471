//! The block-chain engine.
//!
//! A file's payload is a singly linked chain of fixed-capacity data
//! blocks. Reads walk the chain emitting `bytes_used` bytes per block;
//! writes fill the last block in place and splice a freshly allocated
//! chain behind it when it overflows. All walks are iterative; chains
//! can be as long as the disk allows.

use std::io::Write;

use tracing::debug;

use crate::alloc;
use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::record::{
    BLOCK_BYTES_USED, BLOCK_DATA, BLOCK_NEXT, BLOCK_RECORD_SIZE, BLOCK_SIZE, FileHeader, Tag,
};

/// Reads the `bytes_used` field of the block at `offset`.
pub(crate) fn bytes_used(disk: &Disk, offset: u64) -> Result<u64> {
    Ok(u64::from(disk.read_u32_at(offset + BLOCK_BYTES_USED)?))
}

/// Stores the `bytes_used` field of the block at `offset`.
fn set_bytes_used(disk: &mut Disk, offset: u64, used: u64) -> Result<()> {
    let used = u32::try_from(used).map_err(|_| Error::InvalidOffset { offset })?;
    disk.write_u32_at(offset + BLOCK_BYTES_USED, used)
}

/// Reads the `next` link of the block at `offset`.
pub(crate) fn next(disk: &Disk, offset: u64) -> Result<u64> {
    disk.read_u64_at(offset + BLOCK_NEXT)
}

/// Stores the `next` link of the block at `offset`.
fn set_next(disk: &mut Disk, offset: u64, link: u64) -> Result<()> {
    disk.write_u64_at(offset + BLOCK_NEXT, link)
}

/// Verifies the record at `offset` carries a live block tag.
fn expect_used(disk: &Disk, offset: u64) -> Result<()> {
    let found = disk.read_u8_at(offset)?;
    if Tag::from_byte(found) == Some(Tag::Used) {
        Ok(())
    } else {
        Err(Error::BadTag {
            offset,
            found,
            expected: Tag::Used as u8,
        })
    }
}

/// Walks to the terminal block of the chain starting at `first`.
pub(crate) fn last_block(disk: &Disk, first: u64) -> Result<u64> {
    disk.check_access(first)?;
    let mut offset = first;
    loop {
        expect_used(disk, offset)?;
        let link = next(disk, offset)?;
        if link == 0 {
            return Ok(offset);
        }
        disk.check_access(link)?;
        offset = link;
    }
}

/// Counts the blocks in the chain starting at `first` (0 for a null
/// chain).
pub(crate) fn chain_len(disk: &Disk, first: u64) -> Result<u64> {
    let mut count = 0;
    let mut offset = first;
    while disk.can_access(offset) {
        expect_used(disk, offset)?;
        count += 1;
        offset = next(disk, offset)?;
    }
    Ok(count)
}

/// Sums `bytes_used` over the chain starting at `first`.
pub(crate) fn chain_size(disk: &Disk, first: u64) -> Result<u64> {
    let mut total = 0;
    let mut offset = first;
    while disk.can_access(offset) {
        expect_used(disk, offset)?;
        total += bytes_used(disk, offset)?;
        offset = next(disk, offset)?;
    }
    Ok(total)
}

/// Emits the chain's payload to `sink`: `bytes_used` bytes per block, in
/// chain order.
pub(crate) fn read_contents(disk: &Disk, first: u64, sink: &mut dyn Write) -> Result<u64> {
    let mut total = 0;
    let mut offset = first;
    while disk.can_access(offset) {
        expect_used(disk, offset)?;
        let used = bytes_used(disk, offset)?;
        sink.write_all(disk.bytes(offset + BLOCK_DATA, used.min(BLOCK_SIZE))?)?;
        total += used;
        offset = next(disk, offset)?;
    }
    Ok(total)
}

/// Number of blocks to carve for `len` incoming bytes landing after
/// `already_used` bytes in the current tail block.
fn blocks_for(len: u64, already_used: u64) -> u64 {
    (len + already_used).div_ceil(BLOCK_SIZE) + 1
}

/// Copies `data` into the chain starting at `start`, filling each block
/// up to capacity before following `next`.
///
/// The chain must have enough spare capacity; running off its end means
/// the caller under-allocated and is reported as corruption.
fn fill_chain(disk: &mut Disk, start: u64, data: &[u8]) -> Result<()> {
    let mut offset = start;
    let mut written = 0usize;
    while written < data.len() {
        disk.check_access(offset)?;
        expect_used(disk, offset)?;
        let used = bytes_used(disk, offset)?;
        let avail = BLOCK_SIZE - used.min(BLOCK_SIZE);
        if avail == 0 {
            offset = next(disk, offset)?;
            continue;
        }
        let take = usize::try_from(avail)
            .unwrap_or(usize::MAX)
            .min(data.len() - written);
        disk.write_bytes(offset + BLOCK_DATA + used, &data[written..written + take])?;
        set_bytes_used(disk, offset, used + take as u64)?;
        written += take;
        if written < data.len() {
            offset = next(disk, offset)?;
        }
    }
    Ok(())
}

/// Appends `data` to the file whose header sits at `file`: fills the
/// last block in place when it fits, otherwise allocates a fresh chain
/// and splices it behind the tail. Updates the header's `size` (and
/// `first_block` for an empty file).
pub(crate) fn write_data(disk: &mut Disk, file: u64, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut header = FileHeader::read_at(disk, file)?;
    let len = data.len() as u64;

    if header.first_block == 0 {
        let first = alloc::allocate_chain(disk, blocks_for(len, 0))?;
        if let Err(err) = fill_chain(disk, first, data) {
            alloc::release_chain(disk, first)?;
            return Err(err);
        }
        header.first_block = first;
    } else {
        let last = last_block(disk, header.first_block)?;
        let used = bytes_used(disk, last)?;
        if BLOCK_SIZE - used.min(BLOCK_SIZE) >= len {
            fill_chain(disk, last, data)?;
        } else {
            let fresh = alloc::allocate_chain(disk, blocks_for(len, used))?;
            if let Err(err) = fill_chain(disk, fresh, data) {
                alloc::release_chain(disk, fresh)?;
                return Err(err);
            }
            set_next(disk, last, fresh)?;
        }
    }

    header.size += len;
    header.write_at(disk, file)?;
    debug!(file = %header.name_str(), bytes = len, "wrote data");
    Ok(())
}

/// Releases the file's whole chain and resets its header to an empty
/// payload. Used by truncate-on-open and by removal.
pub(crate) fn truncate(disk: &mut Disk, file: u64) -> Result<()> {
    let mut header = FileHeader::read_at(disk, file)?;
    if disk.can_access(header.first_block) {
        alloc::release_chain(disk, header.first_block)?;
    }
    header.first_block = 0;
    header.size = 0;
    header.write_at(disk, file)
}
