//! Dual-copy table reconciliation, repair, and kernel selection
//!
//! [`GptData`] wraps the four caller-owned buffers (two header sectors,
//! two entry arrays) and runs the copy-reconciliation algorithm over them:
//! figure out which copies are valid, rebuild a bad copy from the good one,
//! then serve kernel-slot selection and post-boot outcome updates against
//! the reconciled state. The caller reads [`GptData::modified`] afterwards
//! to learn which buffers must be written back to media.

use bitflags::bitflags;
use log::{debug, warn};

use crate::entries::{check_entries, entries_from_bytes, entries_from_bytes_mut};
use crate::error::{GptError, Result};
use crate::guid::Guid;
use crate::header::{
    check_header, fields_same, header_crc, header_from_bytes, header_from_bytes_mut, GptHeader,
    HeaderCopy,
};
use crate::kernel::{select_next, Candidate, Cursor};
use crate::{
    GPT_ENTRIES_SECTORS, GPT_HEADER_SECTORS, MIN_DRIVE_SECTORS, SECTOR_SIZE, SIZE_OF_ENTRY,
    TOTAL_ENTRIES_SIZE,
};

bitflags! {
    /// Which of the two on-media copies a check found valid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CopyMask: u8 {
        /// The copy at the start of the drive.
        const PRIMARY = 0b01;
        /// The copy at the end of the drive.
        const SECONDARY = 0b10;
        /// Both copies.
        const BOTH = 0b11;
    }
}

bitflags! {
    /// Buffers rewritten since the last [`GptData::clear_modified`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModifiedFlags: u8 {
        /// The primary header sector changed.
        const HEADER_PRIMARY = 0x01;
        /// The secondary header sector changed.
        const HEADER_SECONDARY = 0x02;
        /// The primary entry array changed.
        const ENTRIES_PRIMARY = 0x04;
        /// The secondary entry array changed.
        const ENTRIES_SECONDARY = 0x08;
    }
}

/// Boot outcome reported back for the most recently selected slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryUpdate {
    /// The slot was attempted; consume one try.
    Try,
    /// The slot failed outright; disable it.
    Bad,
}

/// A kernel slot handed out by [`GptData::next_kernel_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSlot {
    /// Index of the entry in the array.
    pub index: usize,
    /// First sector of the slot.
    pub start_lba: u64,
    /// Slot length in sectors.
    pub sectors: u64,
}

/// The dual-copy table engine over caller-owned buffers.
///
/// The buffer fields stay public so callers can refill them from media (or
/// tests can corrupt them) between operations; the engine re-derives its
/// view of them in [`GptData::sanity_check`].
pub struct GptData<'a> {
    /// Sector holding the primary header (LBA 1).
    pub primary_header: &'a mut [u8],
    /// Primary entry array.
    pub primary_entries: &'a mut [u8],
    /// Sector holding the secondary header (last LBA).
    pub secondary_header: &'a mut [u8],
    /// Secondary entry array.
    pub secondary_entries: &'a mut [u8],
    /// Sector size of the drive, in bytes.
    pub sector_bytes: u32,
    /// Total size of the drive, in sectors.
    pub drive_sectors: u64,

    valid_headers: CopyMask,
    valid_entries: CopyMask,
    modified: ModifiedFlags,
    cursor: Cursor,
    current_kernel: Option<usize>,
}

impl<'a> GptData<'a> {
    /// Wrap caller buffers. No validation happens until [`GptData::init`].
    pub fn new(
        primary_header: &'a mut [u8],
        primary_entries: &'a mut [u8],
        secondary_header: &'a mut [u8],
        secondary_entries: &'a mut [u8],
        sector_bytes: u32,
        drive_sectors: u64,
    ) -> Self {
        GptData {
            primary_header,
            primary_entries,
            secondary_header,
            secondary_entries,
            sector_bytes,
            drive_sectors,
            valid_headers: CopyMask::empty(),
            valid_entries: CopyMask::empty(),
            modified: ModifiedFlags::empty(),
            cursor: Cursor::Start,
            current_kernel: None,
        }
    }

    /// Which header copies the last sanity check found valid.
    pub fn valid_headers(&self) -> CopyMask {
        self.valid_headers
    }

    /// Which entry-array copies the last sanity check found valid.
    pub fn valid_entries(&self) -> CopyMask {
        self.valid_entries
    }

    /// Buffers rewritten since construction or the last clear.
    pub fn modified(&self) -> ModifiedFlags {
        self.modified
    }

    /// Acknowledge a write-back; clears the modified flags.
    pub fn clear_modified(&mut self) {
        self.modified = ModifiedFlags::empty();
    }

    /// Entry index of the most recently selected kernel slot, if any.
    pub fn current_kernel(&self) -> Option<usize> {
        self.current_kernel
    }

    /// Unique GUID of the most recently selected kernel slot.
    pub fn current_kernel_unique_guid(&self) -> Option<Guid> {
        let index = self.current_kernel?;
        let region = self.primary_entries.get(..TOTAL_ENTRIES_SIZE)?;
        let entries = entries_from_bytes(region)?;
        entries.get(index).map(|e| e.unique_guid)
    }

    fn check_parameters(&self) -> Result<()> {
        if self.sector_bytes != SECTOR_SIZE {
            return Err(GptError::InvalidSectorSize);
        }
        if self.drive_sectors < MIN_DRIVE_SECTORS {
            return Err(GptError::InvalidSectorNumber);
        }
        Ok(())
    }

    /// Classify both copies without modifying anything.
    ///
    /// Populates [`GptData::valid_headers`] and [`GptData::valid_entries`].
    /// Fails only when no usable combination exists at all; a single bad
    /// copy is left for [`GptData::repair`] to fix.
    pub fn sanity_check(&mut self) -> Result<()> {
        self.valid_headers = CopyMask::empty();
        self.valid_entries = CopyMask::empty();

        self.check_parameters()?;

        if check_header(self.primary_header, HeaderCopy::Primary, self.drive_sectors) {
            self.valid_headers |= CopyMask::PRIMARY;
        }
        if check_header(self.secondary_header, HeaderCopy::Secondary, self.drive_sectors) {
            self.valid_headers |= CopyMask::SECONDARY;
        }
        if self.valid_headers.is_empty() {
            warn!("neither GPT header copy is valid");
            return Err(GptError::InvalidHeaders);
        }

        let good: GptHeader = if self.valid_headers.contains(CopyMask::PRIMARY) {
            *header_from_bytes(self.primary_header).ok_or(GptError::InvalidHeaders)?
        } else {
            *header_from_bytes(self.secondary_header).ok_or(GptError::InvalidHeaders)?
        };

        if check_entries(self.primary_entries, &good).is_ok() {
            self.valid_entries |= CopyMask::PRIMARY;
        }
        if check_entries(self.secondary_entries, &good).is_ok() {
            self.valid_entries |= CopyMask::SECONDARY;
        }

        // Both headers parse but the entries match neither: an update may
        // have been interrupted after writing the secondary copy. See if
        // the entries validate under the secondary header instead.
        if self.valid_headers == CopyMask::BOTH && self.valid_entries.is_empty() {
            let alt: GptHeader =
                *header_from_bytes(self.secondary_header).ok_or(GptError::InvalidHeaders)?;
            if check_entries(self.primary_entries, &alt).is_ok() {
                self.valid_entries |= CopyMask::PRIMARY;
            }
            if check_entries(self.secondary_entries, &alt).is_ok() {
                self.valid_entries |= CopyMask::SECONDARY;
            }
            if !self.valid_entries.is_empty() {
                debug!("entries match the secondary header only; demoting primary");
                self.valid_headers = CopyMask::SECONDARY;
            }
        }
        if self.valid_entries.is_empty() {
            warn!("neither entry-array copy is valid");
            return Err(GptError::InvalidEntries);
        }

        // Two structurally valid headers that disagree on shared fields:
        // the primary wins.
        if self.valid_headers == CopyMask::BOTH {
            let h1 = *header_from_bytes(self.primary_header).ok_or(GptError::InvalidHeaders)?;
            let h2 = *header_from_bytes(self.secondary_header).ok_or(GptError::InvalidHeaders)?;
            if !fields_same(&h1, &h2) {
                debug!("header copies disagree; preferring primary");
                self.valid_headers -= CopyMask::SECONDARY;
            }
        }

        Ok(())
    }

    /// Rebuild any single bad copy from the surviving good one.
    ///
    /// Must run after a successful [`GptData::sanity_check`]. Rewritten
    /// buffers are recorded in [`GptData::modified`].
    pub fn repair(&mut self) {
        if self.valid_headers == CopyMask::PRIMARY {
            debug!("rebuilding secondary header from primary");
            if copy_header(self.primary_header, self.secondary_header) {
                if let Some(h) = header_from_bytes_mut(self.secondary_header) {
                    h.my_lba = self.drive_sectors - GPT_HEADER_SECTORS;
                    h.alternate_lba = 1;
                    h.entries_lba = { h.my_lba } - GPT_ENTRIES_SECTORS;
                }
                let crc = header_crc(self.secondary_header);
                if let Some(h) = header_from_bytes_mut(self.secondary_header) {
                    h.header_crc32 = crc;
                }
                self.modified |= ModifiedFlags::HEADER_SECONDARY;
                self.valid_headers = CopyMask::BOTH;
            }
        } else if self.valid_headers == CopyMask::SECONDARY {
            debug!("rebuilding primary header from secondary");
            if copy_header(self.secondary_header, self.primary_header) {
                if let Some(h) = header_from_bytes_mut(self.primary_header) {
                    h.my_lba = 1;
                    h.alternate_lba = self.drive_sectors - GPT_HEADER_SECTORS;
                    h.entries_lba = { h.my_lba } + GPT_HEADER_SECTORS;
                }
                let crc = header_crc(self.primary_header);
                if let Some(h) = header_from_bytes_mut(self.primary_header) {
                    h.header_crc32 = crc;
                }
                self.modified |= ModifiedFlags::HEADER_PRIMARY;
                self.valid_headers = CopyMask::BOTH;
            }
        }

        if self.valid_entries == CopyMask::PRIMARY {
            debug!("rebuilding secondary entries from primary");
            if copy_entries(self.primary_entries, self.secondary_entries) {
                self.modified |= ModifiedFlags::ENTRIES_SECONDARY;
                self.valid_entries = CopyMask::BOTH;
            }
        } else if self.valid_entries == CopyMask::SECONDARY {
            debug!("rebuilding primary entries from secondary");
            if copy_entries(self.secondary_entries, self.primary_entries) {
                self.modified |= ModifiedFlags::ENTRIES_PRIMARY;
                self.valid_entries = CopyMask::BOTH;
            }
        }
    }

    /// Validate and reconcile the buffers, readying the table for use.
    ///
    /// Resets the selection walk, classifies both copies, and repairs a
    /// single bad copy in place. Check [`GptData::modified`] afterwards.
    pub fn init(&mut self) -> Result<()> {
        self.modified = ModifiedFlags::empty();
        self.cursor = Cursor::Start;
        self.current_kernel = None;
        self.sanity_check()?;
        self.repair();
        Ok(())
    }

    /// Select the next kernel slot to try.
    ///
    /// Slots are eligible when their type marks a kernel, priority is
    /// nonzero, and they have either booted successfully before or have
    /// tries remaining. Each call advances past the previously returned
    /// slot; once the ranking is exhausted every further call fails with
    /// [`GptError::NoValidKernel`] until the next [`GptData::init`].
    pub fn next_kernel_entry(&mut self) -> Result<KernelSlot> {
        if self.cursor == Cursor::Exhausted {
            return Err(GptError::NoValidKernel);
        }
        let region = self
            .primary_entries
            .get(..TOTAL_ENTRIES_SIZE)
            .ok_or(GptError::InvalidEntries)?;
        let entries = entries_from_bytes(region).ok_or(GptError::InvalidEntries)?;

        let candidates = entries.iter().enumerate().filter_map(|(index, e)| {
            if e.is_kernel() && e.priority() > 0 && (e.successful() || e.tries() > 0) {
                Some(Candidate {
                    index,
                    priority: e.priority(),
                })
            } else {
                None
            }
        });

        match select_next(self.cursor, candidates) {
            Some(c) => {
                self.cursor = Cursor::At {
                    priority: c.priority,
                    index: c.index,
                };
                self.current_kernel = Some(c.index);
                let e = &entries[c.index];
                let start = e.starting_lba;
                let end = e.ending_lba;
                Ok(KernelSlot {
                    index: c.index,
                    start_lba: start,
                    sectors: end.wrapping_sub(start).wrapping_add(1),
                })
            }
            None => {
                self.cursor = Cursor::Exhausted;
                self.current_kernel = None;
                Err(GptError::NoValidKernel)
            }
        }
    }

    /// Record the boot outcome of the most recently selected slot.
    ///
    /// A slot that has already booted successfully is left untouched by
    /// either outcome. Otherwise [`EntryUpdate::Try`] consumes one try
    /// (disabling the slot when the last try is spent) and
    /// [`EntryUpdate::Bad`] disables it outright. Any change is mirrored
    /// into the secondary entry array and both headers' CRCs.
    pub fn update_kernel_entry(&mut self, update: EntryUpdate) -> Result<()> {
        let index = self.current_kernel.ok_or(GptError::InvalidUpdateType)?;

        let changed = {
            let region = self
                .primary_entries
                .get_mut(..TOTAL_ENTRIES_SIZE)
                .ok_or(GptError::InvalidEntries)?;
            let entries = entries_from_bytes_mut(region).ok_or(GptError::InvalidEntries)?;
            let entry = entries.get_mut(index).ok_or(GptError::InvalidUpdateType)?;
            if !entry.is_kernel() {
                return Err(GptError::InvalidUpdateType);
            }
            if entry.successful() {
                false
            } else {
                match update {
                    EntryUpdate::Try if entry.tries() > 1 => {
                        let tries = entry.tries();
                        entry.set_tries(tries - 1);
                    }
                    // Out of tries, or told to give up: disable the slot.
                    EntryUpdate::Try | EntryUpdate::Bad => {
                        entry.set_successful(false);
                        entry.set_tries(0);
                        entry.set_priority(0);
                    }
                }
                true
            }
        };
        if !changed {
            return Ok(());
        }

        let offset = index * SIZE_OF_ENTRY;
        let src = self
            .primary_entries
            .get(offset..offset + SIZE_OF_ENTRY)
            .ok_or(GptError::InvalidEntries)?;
        let mut entry_bytes = [0u8; SIZE_OF_ENTRY];
        entry_bytes.copy_from_slice(src);
        self.secondary_entries
            .get_mut(offset..offset + SIZE_OF_ENTRY)
            .ok_or(GptError::InvalidEntries)?
            .copy_from_slice(&entry_bytes);

        let crc = crc32fast::hash(
            self.primary_entries
                .get(..TOTAL_ENTRIES_SIZE)
                .ok_or(GptError::InvalidEntries)?,
        );
        refresh_entries_crc(self.primary_header, crc)?;
        refresh_entries_crc(self.secondary_header, crc)?;

        self.modified |= ModifiedFlags::HEADER_PRIMARY
            | ModifiedFlags::HEADER_SECONDARY
            | ModifiedFlags::ENTRIES_PRIMARY
            | ModifiedFlags::ENTRIES_SECONDARY;
        Ok(())
    }
}

/// Copy the declared header bytes from one sector to another. Returns
/// false without touching `dst` if either buffer cannot hold a header.
fn copy_header(src: &[u8], dst: &mut [u8]) -> bool {
    let min = core::mem::size_of::<GptHeader>();
    if src.len() < min || dst.len() < min {
        return false;
    }
    let declared = header_from_bytes(src).map(|h| h.size as usize).unwrap_or(min);
    let len = declared.min(src.len()).min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
    true
}

/// Copy one entry array over another. Returns false if a buffer is short.
fn copy_entries(src: &[u8], dst: &mut [u8]) -> bool {
    match (
        src.get(..TOTAL_ENTRIES_SIZE),
        dst.get_mut(..TOTAL_ENTRIES_SIZE),
    ) {
        (Some(s), Some(d)) => {
            d.copy_from_slice(s);
            true
        }
        _ => false,
    }
}

/// Store a new entry-array CRC in a header and refresh its self-CRC.
fn refresh_entries_crc(sector: &mut [u8], crc: u32) -> Result<()> {
    header_from_bytes_mut(sector)
        .ok_or(GptError::InvalidHeaders)?
        .entries_crc32 = crc;
    let self_crc = header_crc(sector);
    header_from_bytes_mut(sector)
        .ok_or(GptError::InvalidHeaders)?
        .header_crc32 = self_crc;
    Ok(())
}
