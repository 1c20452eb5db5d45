//! Dual-copy GUID Partition Table integrity engine
//!
//! A `no_std` library that validates, cross-repairs, and interprets the
//! redundant on-media GPT layout used by verified-boot firmware, plus the
//! single-copy analogue for raw NAND media. Callers (bootloaders and
//! host-side maintenance tools) own all disk I/O: this crate only inspects
//! and rewrites caller-supplied sector buffers and reports which of them
//! changed.
//!
//! # Overview
//!
//! A GPT drive carries two independently corruptible copies of the same
//! metadata: a header sector at LBA 1 plus an entry array, mirrored at the
//! end of the drive. This crate provides:
//! - Structural validation of headers (signature, revision, CRC, geometry)
//! - Entry-array validation (CRC, bounds, duplicate GUIDs, overlap)
//! - The dual-copy sanity-check/repair algorithm that rebuilds one bad copy
//!   from the surviving good one
//! - The priority/tries/successful boot-slot selection state machine and
//!   its post-boot update transitions
//! - A single-copy variant of all of the above for raw-flash layouts
//!
//! # Architecture
//!
//! The implementation is layered:
//! 1. **Header layer** - parses and validates one header copy in isolation
//! 2. **Entries layer** - validates an entry array against a trusted header
//! 3. **Table layer** - reconciles the two copies and repairs in place
//! 4. **Selection layer** - walks validated entries to pick the next
//!    bootable kernel slot and records boot outcomes
//!
//! # Usage
//!
//! ```ignore
//! use dualgpt::{EntryUpdate, GptData};
//!
//! // Buffers come from the caller's block I/O layer.
//! let mut gpt = GptData::new(&mut h1, &mut e1, &mut h2, &mut e2, 512, sectors);
//! gpt.init()?;
//!
//! let slot = gpt.next_kernel_entry()?;
//! // ... attempt to boot slot.start_lba .. +slot.sectors ...
//! gpt.update_kernel_entry(EntryUpdate::Try)?;
//!
//! // Persist whatever the engine touched.
//! let dirty = gpt.modified();
//! ```
//!
//! All multi-byte on-media fields are little-endian, matching the GPT wire
//! format; the crate assumes a little-endian host, as the firmware targets
//! it serves all are.

#![no_std]
#![warn(missing_docs)]

pub mod entries;
pub mod error;
pub mod guid;
pub mod header;
mod kernel;
pub mod mtd;
pub mod table;

pub use entries::{check_entries, GptEntry};
pub use error::{error_text, GptError, Result};
pub use guid::Guid;
pub use header::{check_header, fields_same, header_crc, GptHeader, HeaderCopy};
pub use table::{CopyMask, EntryUpdate, GptData, KernelSlot, ModifiedFlags};

/// The only supported sector size, in bytes.
pub const SECTOR_SIZE: u32 = 512;

/// Sectors reserved for the protective MBR at LBA 0.
pub const GPT_PMBR_SECTORS: u64 = 1;

/// Sectors occupied by one header copy.
pub const GPT_HEADER_SECTORS: u64 = 1;

/// Sectors occupied by one entry-array copy.
pub const GPT_ENTRIES_SECTORS: u64 = 32;

/// Size of one partition entry, in bytes.
pub const SIZE_OF_ENTRY: usize = 128;

/// Number of entries in one entry-array copy.
pub const MAX_NUMBER_OF_ENTRIES: usize = 128;

/// Total size of one entry-array copy, in bytes.
pub const TOTAL_ENTRIES_SIZE: usize = SIZE_OF_ENTRY * MAX_NUMBER_OF_ENTRIES;

/// Smallest drive that can hold the fixed layout: protective MBR, two
/// header sectors, and two entry-array regions.
pub const MIN_DRIVE_SECTORS: u64 =
    GPT_PMBR_SECTORS + 2 * GPT_HEADER_SECTORS + 2 * GPT_ENTRIES_SECTORS;
