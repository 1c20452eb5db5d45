//! On-flash layout structure and partition flag fields

use crc32fast::Hasher;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::entries::scan_overlaps;
use crate::error::{GptError, Result};

/// Fixed 8-byte layout magic.
pub const MTD_DRIVE_SIGNATURE: [u8; 8] = *b"CrOSPart";

/// Size of the version-1 layout structure, in bytes.
pub const MTD_DRIVE_V1_SIZE: usize = 352;

/// Number of partition slots in the layout.
pub const MTD_MAX_PARTITIONS: usize = 16;

/// Byte offset of `crc32` within [`MtdDiskLayout`].
const LAYOUT_CRC_OFFSET: usize = 8;

const PRIORITY_SHIFT: u32 = 0;
const PRIORITY_MASK: u32 = 0xF << PRIORITY_SHIFT;

const TRIES_SHIFT: u32 = 4;
const TRIES_MASK: u32 = 0xF << TRIES_SHIFT;

const SUCCESSFUL_SHIFT: u32 = 8;
const SUCCESSFUL_MASK: u32 = 1 << SUCCESSFUL_SHIFT;

const TYPE_SHIFT: u32 = 12;
const TYPE_MASK: u32 = 0xF << TYPE_SHIFT;

/// Partition kinds a flags word can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MtdPartitionType {
    /// Slot not in use.
    Unused = 0,
    /// Bootable kernel slot.
    Kernel = 1,
    /// Root filesystem.
    Rootfs = 2,
    /// Firmware blob.
    Firmware = 3,
}

impl MtdPartitionType {
    fn from_bits(bits: u32) -> Option<MtdPartitionType> {
        match bits {
            0 => Some(Self::Unused),
            1 => Some(Self::Kernel),
            2 => Some(Self::Rootfs),
            3 => Some(Self::Firmware),
            _ => None,
        }
    }
}

/// One partition slot (20 bytes). Offsets are in bytes, inclusive.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C, packed)]
pub struct MtdDiskPartition {
    /// First byte of the partition.
    pub starting_offset: u64,
    /// Last byte of the partition (inclusive).
    pub ending_offset: u64,
    /// Packed type and boot-selection fields.
    pub flags: u32,
}

impl MtdDiskPartition {
    /// Partition kind, if the type field carries a known value.
    pub fn partition_type(&self) -> Option<MtdPartitionType> {
        MtdPartitionType::from_bits(({ self.flags } & TYPE_MASK) >> TYPE_SHIFT)
    }

    /// Store a partition kind, preserving the other flag bits.
    pub fn set_partition_type(&mut self, t: MtdPartitionType) {
        let flags = self.flags;
        self.flags = (flags & !TYPE_MASK) | ((t as u32) << TYPE_SHIFT);
    }

    /// Whether the slot is unused (zero type field).
    pub fn is_unused(&self) -> bool {
        let flags = self.flags;
        flags & TYPE_MASK == 0
    }

    /// Whether the slot holds a bootable kernel.
    pub fn is_kernel(&self) -> bool {
        self.partition_type() == Some(MtdPartitionType::Kernel)
    }

    /// Boot priority, 0 (never boot) to 15 (highest).
    pub fn priority(&self) -> u8 {
        (({ self.flags } & PRIORITY_MASK) >> PRIORITY_SHIFT) as u8
    }

    /// Set the boot priority; only the low 4 bits of `priority` are used.
    pub fn set_priority(&mut self, priority: u8) {
        let flags = self.flags;
        self.flags = (flags & !PRIORITY_MASK) | (((priority as u32) & 0xF) << PRIORITY_SHIFT);
    }

    /// Remaining boot attempts for a not-yet-successful slot.
    pub fn tries(&self) -> u8 {
        (({ self.flags } & TRIES_MASK) >> TRIES_SHIFT) as u8
    }

    /// Set the tries counter; only the low 4 bits of `tries` are used.
    pub fn set_tries(&mut self, tries: u8) {
        let flags = self.flags;
        self.flags = (flags & !TRIES_MASK) | (((tries as u32) & 0xF) << TRIES_SHIFT);
    }

    /// Whether the slot has booted successfully before.
    pub fn successful(&self) -> bool {
        let flags = self.flags;
        flags & SUCCESSFUL_MASK != 0
    }

    /// Set or clear the successful flag.
    pub fn set_successful(&mut self, successful: bool) {
        let flags = self.flags;
        self.flags = if successful {
            flags | SUCCESSFUL_MASK
        } else {
            flags & !SUCCESSFUL_MASK
        };
    }
}

/// The whole on-flash layout (352 bytes).
///
/// The field offsets are naturally aligned with no padding, so this stays
/// an ordinary `repr(C)` struct; only the 20-byte partition slots need to
/// be packed.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct MtdDiskLayout {
    /// Magic bytes; must equal [`MTD_DRIVE_SIGNATURE`].
    pub signature: [u8; 8],
    /// CRC32 of the first `size` bytes, computed with this field zeroed.
    pub crc32: u32,
    /// Declared structure size in bytes.
    pub size: u32,
    /// First byte usable for partition contents.
    pub first_offset: u64,
    /// Last usable byte (inclusive).
    pub last_offset: u64,
    /// Partition slots.
    pub partitions: [MtdDiskPartition; MTD_MAX_PARTITIONS],
}

impl MtdDiskLayout {
    /// Compute the layout CRC: CRC32 over the declared `size` bytes with
    /// the stored CRC field treated as zero.
    pub fn crc(&self) -> u32 {
        let bytes = self.as_bytes();
        let declared = self.size as usize;
        let size = declared.clamp(LAYOUT_CRC_OFFSET + 4, bytes.len());
        let mut hasher = Hasher::new();
        hasher.update(&bytes[..LAYOUT_CRC_OFFSET]);
        hasher.update(&[0u8; 4]);
        hasher.update(&bytes[LAYOUT_CRC_OFFSET + 4..size]);
        hasher.finalize()
    }

    /// Recompute and store the layout CRC.
    pub fn update_crc(&mut self) {
        self.crc32 = self.crc();
    }
}

/// Validate the partition slots of a layout.
///
/// Every active slot must lie inside the layout's usable byte window and
/// must not overlap any other active slot. Unused slots are ignored.
pub fn check_entries(layout: &MtdDiskLayout) -> Result<()> {
    let first = layout.first_offset;
    let last = layout.last_offset;
    for part in layout.partitions.iter().filter(|p| !p.is_unused()) {
        let start = part.starting_offset;
        let end = part.ending_offset;
        if start < first || end > last || start > end {
            return Err(GptError::OutOfRegion);
        }
    }

    let mut ranges = [(0u64, 0u64); MTD_MAX_PARTITIONS];
    let mut used = 0;
    for part in layout.partitions.iter().filter(|p| !p.is_unused()) {
        ranges[used] = (part.starting_offset, part.ending_offset);
        used += 1;
    }
    scan_overlaps(&mut ranges[..used])
}
