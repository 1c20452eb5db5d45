//! Partition entry array: layout, attribute bits, and validation
//!
//! An entry array is only meaningful relative to a header that has already
//! passed [`crate::header::check_header`]: the header supplies the entry
//! count, entry size, expected CRC, and the usable LBA window.

use zerocopy::{AsBytes, FromBytes, FromZeroes, Ref, Unaligned};

use crate::error::{GptError, Result};
use crate::guid::{Guid, TYPE_CHROMEOS_KERNEL};
use crate::header::GptHeader;
use crate::MAX_NUMBER_OF_ENTRIES;

/// Attribute bit field: lowest bit of the boot priority nibble.
const PRIORITY_SHIFT: u64 = 48;
const PRIORITY_MASK: u64 = 0xF << PRIORITY_SHIFT;

/// Attribute bit field: lowest bit of the tries-remaining nibble.
const TRIES_SHIFT: u64 = 52;
const TRIES_MASK: u64 = 0xF << TRIES_SHIFT;

/// Attribute bit marking a slot that has booted successfully.
const SUCCESSFUL_SHIFT: u64 = 56;
const SUCCESSFUL_MASK: u64 = 1 << SUCCESSFUL_SHIFT;

/// On-media partition entry (128 bytes).
///
/// The boot-selection state for kernel slots lives in the vendor-defined
/// high bits of `attributes`: a 4-bit priority, a 4-bit tries counter, and
/// a successful flag. All other attribute bits are preserved untouched.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct GptEntry {
    /// Partition type; the zero GUID marks the entry unused.
    pub type_guid: Guid,
    /// GUID unique to this partition on this disk.
    pub unique_guid: Guid,
    /// First LBA of the partition.
    pub starting_lba: u64,
    /// Last LBA of the partition (inclusive).
    pub ending_lba: u64,
    /// EFI attribute bits, including the boot-selection fields.
    pub attributes: u64,
    /// UTF-16LE partition name, not NUL-terminated.
    pub name: [u16; 36],
}

impl GptEntry {
    /// Whether the entry slot is unused (zero type GUID).
    pub fn is_unused(&self) -> bool {
        let t = self.type_guid;
        t.is_zero()
    }

    /// Whether the entry marks a bootable kernel slot.
    pub fn is_kernel(&self) -> bool {
        let t = self.type_guid;
        t == TYPE_CHROMEOS_KERNEL
    }

    /// Boot priority, 0 (never boot) to 15 (highest).
    pub fn priority(&self) -> u8 {
        (({ self.attributes } & PRIORITY_MASK) >> PRIORITY_SHIFT) as u8
    }

    /// Set the boot priority; only the low 4 bits of `priority` are used.
    pub fn set_priority(&mut self, priority: u8) {
        let attrs = self.attributes;
        self.attributes =
            (attrs & !PRIORITY_MASK) | (((priority as u64) & 0xF) << PRIORITY_SHIFT);
    }

    /// Remaining boot attempts for a not-yet-successful slot.
    pub fn tries(&self) -> u8 {
        (({ self.attributes } & TRIES_MASK) >> TRIES_SHIFT) as u8
    }

    /// Set the tries counter; only the low 4 bits of `tries` are used.
    pub fn set_tries(&mut self, tries: u8) {
        let attrs = self.attributes;
        self.attributes = (attrs & !TRIES_MASK) | (((tries as u64) & 0xF) << TRIES_SHIFT);
    }

    /// Whether the slot has booted successfully before.
    pub fn successful(&self) -> bool {
        let attrs = self.attributes;
        attrs & SUCCESSFUL_MASK != 0
    }

    /// Set or clear the successful flag.
    pub fn set_successful(&mut self, successful: bool) {
        let attrs = self.attributes;
        self.attributes = if successful {
            attrs | SUCCESSFUL_MASK
        } else {
            attrs & !SUCCESSFUL_MASK
        };
    }
}

/// View an entry-array buffer as a slice of entries.
///
/// `region` must be an exact multiple of the entry size.
pub fn entries_from_bytes(region: &[u8]) -> Option<&[GptEntry]> {
    Ref::<_, [GptEntry]>::new_slice(region).map(Ref::into_slice)
}

/// Mutable view of an entry-array buffer.
pub fn entries_from_bytes_mut(region: &mut [u8]) -> Option<&mut [GptEntry]> {
    Ref::<_, [GptEntry]>::new_slice(region).map(Ref::into_mut_slice)
}

/// Validate one entry-array copy against a trusted header.
///
/// Checks, in order: the array CRC32, that every active entry lies inside
/// the header's usable window, that no two active entries share a unique
/// GUID, and that no two active entries overlap. The first failing check
/// wins; unused entries are skipped throughout.
pub fn check_entries(entries: &[u8], h: &GptHeader) -> Result<()> {
    let count = h.number_of_entries as usize;
    let entry_size = h.size_of_entry as usize;
    let region_len = count
        .checked_mul(entry_size)
        .ok_or(GptError::CrcCorrupted)?;
    let region = entries.get(..region_len).ok_or(GptError::CrcCorrupted)?;
    if crc32fast::hash(region) != { h.entries_crc32 } {
        return Err(GptError::CrcCorrupted);
    }

    let parsed = entries_from_bytes(region).ok_or(GptError::InvalidEntries)?;

    let first_usable = h.first_usable_lba;
    let last_usable = h.last_usable_lba;
    for entry in parsed.iter().filter(|e| !e.is_unused()) {
        let start = entry.starting_lba;
        let end = entry.ending_lba;
        if start < first_usable || end > last_usable || start > end {
            return Err(GptError::OutOfRegion);
        }
    }

    for (i, a) in parsed.iter().enumerate().filter(|(_, e)| !e.is_unused()) {
        for b in parsed[i + 1..].iter().filter(|e| !e.is_unused()) {
            if { a.unique_guid } == { b.unique_guid } {
                return Err(GptError::DupGuid);
            }
        }
    }

    let mut ranges = [(0u64, 0u64); MAX_NUMBER_OF_ENTRIES];
    let mut used = 0;
    for entry in parsed.iter().filter(|e| !e.is_unused()) {
        // check_header caps the count at the array capacity
        ranges[used] = (entry.starting_lba, entry.ending_lba);
        used += 1;
    }
    scan_overlaps(&mut ranges[..used])
}

/// Check a set of inclusive ranges for overlap.
///
/// Sorts in place by start, then inspects each adjacent pair. A shared
/// start or a fully enclosed range reports [`GptError::StartLbaOverlap`];
/// any other touching or crossing pair reports [`GptError::EndLbaOverlap`].
pub(crate) fn scan_overlaps(ranges: &mut [(u64, u64)]) -> Result<()> {
    // Insertion sort; the array is small and no allocator is available.
    for i in 1..ranges.len() {
        let mut j = i;
        while j > 0 && ranges[j - 1].0 > ranges[j].0 {
            ranges.swap(j - 1, j);
            j -= 1;
        }
    }

    for pair in ranges.windows(2) {
        let (prev_start, prev_end) = pair[0];
        let (next_start, next_end) = pair[1];
        if prev_start == next_start {
            return Err(GptError::StartLbaOverlap);
        }
        if prev_end > next_end {
            return Err(GptError::StartLbaOverlap);
        }
        if prev_end >= next_start {
            return Err(GptError::EndLbaOverlap);
        }
    }
    Ok(())
}
