//! Single-copy table engine for raw flash

use log::warn;

use crate::error::{GptError, Result};
use crate::kernel::{select_next, Candidate, Cursor};
use crate::table::{EntryUpdate, KernelSlot};
use crate::SECTOR_SIZE;

use super::layout::{check_entries, MtdDiskLayout, MTD_DRIVE_SIGNATURE, MTD_DRIVE_V1_SIZE};

/// The single-copy table engine.
///
/// Unlike the dual-copy engine there is nothing to reconcile or repair;
/// the layout is either valid or the table is unusable. A single dirty
/// bit tells the caller when the layout must be written back.
pub struct MtdData {
    /// The one layout copy, owned by value.
    pub primary: MtdDiskLayout,
    /// Sector size the byte offsets are converted with.
    pub sector_bytes: u32,
    /// Total size of the flash device, in sectors.
    pub drive_sectors: u64,
    /// Flash page size, in bytes.
    pub flash_page_bytes: u32,
    /// Flash erase-block size, in bytes.
    pub flash_block_bytes: u32,

    modified: bool,
    cursor: Cursor,
    current_kernel: Option<usize>,
}

impl MtdData {
    /// Wrap a layout. No validation happens until [`MtdData::init`].
    pub fn new(
        primary: MtdDiskLayout,
        sector_bytes: u32,
        drive_sectors: u64,
        flash_page_bytes: u32,
        flash_block_bytes: u32,
    ) -> Self {
        MtdData {
            primary,
            sector_bytes,
            drive_sectors,
            flash_page_bytes,
            flash_block_bytes,
            modified: false,
            cursor: Cursor::Start,
            current_kernel: None,
        }
    }

    /// Whether the layout changed since construction or the last clear.
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// Acknowledge a write-back; clears the dirty bit.
    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Index of the most recently selected kernel slot, if any.
    pub fn current_kernel(&self) -> Option<usize> {
        self.current_kernel
    }

    /// Validate the drive and flash geometry.
    ///
    /// The page size must be a positive multiple of the sector size and
    /// the erase-block size a positive multiple of the page size.
    pub fn check_parameters(&self) -> Result<()> {
        if self.sector_bytes != SECTOR_SIZE {
            return Err(GptError::InvalidSectorSize);
        }
        if self.drive_sectors == 0 {
            return Err(GptError::InvalidSectorNumber);
        }
        if self.flash_page_bytes == 0 || self.flash_page_bytes % self.sector_bytes != 0 {
            return Err(GptError::InvalidFlashGeometry);
        }
        if self.flash_block_bytes == 0 || self.flash_block_bytes % self.flash_page_bytes != 0 {
            return Err(GptError::InvalidFlashGeometry);
        }
        Ok(())
    }

    /// Validate the layout structure and its partition slots.
    pub fn sanity_check(&self) -> Result<()> {
        self.check_parameters()?;
        if self.primary.signature != MTD_DRIVE_SIGNATURE {
            warn!("flash layout signature mismatch");
            return Err(GptError::InvalidHeaders);
        }
        if (self.primary.size as usize) < MTD_DRIVE_V1_SIZE {
            return Err(GptError::InvalidHeaders);
        }
        if self.primary.crc() != self.primary.crc32 {
            return Err(GptError::CrcCorrupted);
        }
        check_entries(&self.primary)
    }

    /// Validate the layout, readying the table for use.
    pub fn init(&mut self) -> Result<()> {
        self.modified = false;
        self.cursor = Cursor::Start;
        self.current_kernel = None;
        self.sanity_check()
    }

    /// Select the next kernel slot to try.
    ///
    /// Same eligibility and ordering rules as the dual-copy engine; the
    /// returned slot is converted from byte offsets to sectors.
    pub fn next_kernel_entry(&mut self) -> Result<KernelSlot> {
        if self.cursor == Cursor::Exhausted {
            return Err(GptError::NoValidKernel);
        }

        let candidates = self
            .primary
            .partitions
            .iter()
            .enumerate()
            .filter_map(|(index, p)| {
                if p.is_kernel() && p.priority() > 0 && (p.successful() || p.tries() > 0) {
                    Some(Candidate {
                        index,
                        priority: p.priority(),
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
                let p = &self.primary.partitions[c.index];
                let start_bytes = p.starting_offset;
                let end_bytes = p.ending_offset;
                let sector = self.sector_bytes as u64;
                Ok(KernelSlot {
                    index: c.index,
                    start_lba: start_bytes / sector,
                    sectors: end_bytes.wrapping_sub(start_bytes).wrapping_add(1) / sector,
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
    /// Same transitions as the dual-copy engine; a change refreshes the
    /// layout CRC and sets the dirty bit.
    pub fn update_kernel_entry(&mut self, update: EntryUpdate) -> Result<()> {
        let index = self.current_kernel.ok_or(GptError::InvalidUpdateType)?;
        let part = self
            .primary
            .partitions
            .get_mut(index)
            .ok_or(GptError::InvalidUpdateType)?;
        if !part.is_kernel() {
            return Err(GptError::InvalidUpdateType);
        }
        if part.successful() {
            return Ok(());
        }

        match update {
            EntryUpdate::Try if part.tries() > 1 => {
                let tries = part.tries();
                part.set_tries(tries - 1);
            }
            EntryUpdate::Try | EntryUpdate::Bad => {
                part.set_successful(false);
                part.set_tries(0);
                part.set_priority(0);
            }
        }

        self.primary.update_crc();
        self.modified = true;
        Ok(())
    }
}
