//! Shared fixtures: a small, fully valid test drive
//!
//! The layout (sectors, 467-sector drive):
//! ```text
//!   0          protective MBR
//!   1          primary header
//!   2..=33     primary entries (128 * 128 bytes)
//!   34..=133   kernel A
//!   134..=232  rootfs A
//!   234..=331  rootfs B (overwritten as kernel X by some tests)
//!   334..=430  kernel B  (overwritten as kernel Y by some tests)
//!   434..=465  secondary entries
//!   466        secondary header
//! ```

#![allow(dead_code)]

use dualgpt::entries::entries_from_bytes_mut;
use dualgpt::header::{
    header_from_bytes, header_from_bytes_mut, GPT_HEADER_REVISION, GPT_HEADER_SIGNATURE,
};
use dualgpt::guid::{TYPE_CHROMEOS_KERNEL, TYPE_CHROMEOS_ROOTFS};
use dualgpt::mtd::{MtdData, MtdDiskLayout, MtdDiskPartition, MtdPartitionType, MTD_DRIVE_SIGNATURE, MTD_DRIVE_V1_SIZE};
use dualgpt::{GptData, GptEntry, GptHeader, Guid, SECTOR_SIZE, TOTAL_ENTRIES_SIZE};

pub const DRIVE_SECTORS: u64 = 467;
pub const SECTOR: usize = SECTOR_SIZE as usize;

pub const KERNEL_A: usize = 0;
pub const KERNEL_B: usize = 1;
pub const ROOTFS_A: usize = 2;
pub const ROOTFS_B: usize = 3;
// Overload the rootfs slots for selection tests.
pub const KERNEL_X: usize = 2;
pub const KERNEL_Y: usize = 3;

/// Owns the four buffers a [`GptData`] borrows.
pub struct TestDisk {
    pub primary_header: Vec<u8>,
    pub primary_entries: Vec<u8>,
    pub secondary_header: Vec<u8>,
    pub secondary_entries: Vec<u8>,
    pub sector_bytes: u32,
    pub drive_sectors: u64,
}

/// A deterministic GUID derived from `num`.
pub fn test_guid(num: u32) -> Guid {
    Guid::new(
        num,
        0xd450,
        0x44bc,
        0xa6,
        0x93,
        [0xb8, 0xac, 0x75, 0x5f, 0xcd, 0x48],
    )
}

/// View a header sector mutably.
pub fn header_mut(sector: &mut [u8]) -> &mut GptHeader {
    header_from_bytes_mut(sector).unwrap()
}

/// View one entry of an entry-array buffer mutably.
pub fn entry_mut(entries: &mut [u8], index: usize) -> &mut GptEntry {
    &mut entries_from_bytes_mut(&mut entries[..TOTAL_ENTRIES_SIZE]).unwrap()[index]
}

/// Set up a kernel slot's type and selection attributes. A non-kernel
/// request clears the type instead, making the slot unused.
pub fn fill_entry(e: &mut GptEntry, is_kernel: bool, priority: u8, successful: bool, tries: u8) {
    e.type_guid = if is_kernel {
        TYPE_CHROMEOS_KERNEL
    } else {
        Guid::ZERO
    };
    e.set_priority(priority);
    e.set_successful(successful);
    e.set_tries(tries);
}

impl TestDisk {
    /// Build the fully valid drive described in the module docs.
    pub fn build() -> TestDisk {
        let mut disk = TestDisk {
            primary_header: vec![0; SECTOR],
            primary_entries: vec![0; TOTAL_ENTRIES_SIZE],
            secondary_header: vec![0; SECTOR],
            secondary_entries: vec![0; TOTAL_ENTRIES_SIZE],
            sector_bytes: SECTOR_SIZE,
            drive_sectors: DRIVE_SECTORS,
        };

        {
            let h = header_mut(&mut disk.primary_header);
            h.signature = GPT_HEADER_SIGNATURE;
            h.revision = GPT_HEADER_REVISION;
            h.size = core::mem::size_of::<GptHeader>() as u32;
            h.reserved_zero = 0;
            h.my_lba = 1;
            h.alternate_lba = DRIVE_SECTORS - 1;
            h.first_usable_lba = 34;
            h.last_usable_lba = DRIVE_SECTORS - 1 - 32 - 1; // 433
            h.entries_lba = 2;
            h.number_of_entries = 128;
            h.size_of_entry = 128;
        }

        let ranges: [(Guid, u64, u64); 4] = [
            (TYPE_CHROMEOS_KERNEL, 34, 133),
            (TYPE_CHROMEOS_ROOTFS, 134, 232),
            (TYPE_CHROMEOS_ROOTFS, 234, 331),
            (TYPE_CHROMEOS_KERNEL, 334, 430),
        ];
        for (i, (type_guid, start, end)) in ranges.into_iter().enumerate() {
            let e = entry_mut(&mut disk.primary_entries, i);
            e.type_guid = type_guid;
            e.unique_guid = test_guid(i as u32);
            e.starting_lba = start;
            e.ending_lba = end;
        }

        disk.secondary_header.copy_from_slice(&disk.primary_header);
        disk.secondary_entries.copy_from_slice(&disk.primary_entries);
        {
            let h2 = header_mut(&mut disk.secondary_header);
            h2.my_lba = DRIVE_SECTORS - 1; // 466
            h2.alternate_lba = 1;
            h2.entries_lba = DRIVE_SECTORS - 1 - 32; // 434
        }

        disk.refresh_crc32();
        disk
    }

    /// Recompute both entry-array CRCs and both header self-CRCs from the
    /// current buffer contents.
    pub fn refresh_crc32(&mut self) {
        refresh_side(&mut self.primary_header, &self.primary_entries);
        refresh_side(&mut self.secondary_header, &self.secondary_entries);
    }

    /// Borrow the buffers as a table engine.
    pub fn gpt(&mut self) -> GptData<'_> {
        GptData::new(
            &mut self.primary_header,
            &mut self.primary_entries,
            &mut self.secondary_header,
            &mut self.secondary_entries,
            self.sector_bytes,
            self.drive_sectors,
        )
    }
}

fn refresh_side(header: &mut [u8], entries: &[u8]) {
    let (count, entry_size) = {
        let h = header_from_bytes(header).unwrap();
        (h.number_of_entries as usize, h.size_of_entry as usize)
    };
    let len = (count * entry_size).min(entries.len());
    let entries_crc = crc32fast::hash(&entries[..len]);
    header_mut(header).entries_crc32 = entries_crc;
    let self_crc = dualgpt::header_crc(header);
    header_mut(header).header_crc32 = self_crc;
}

const MTD_SECTOR: u64 = SECTOR_SIZE as u64;

fn empty_partition() -> MtdDiskPartition {
    MtdDiskPartition {
        starting_offset: 0,
        ending_offset: 0,
        flags: 0,
    }
}

/// Set up a flash kernel slot. A non-kernel request marks it firmware, so
/// the slot stays active but is never bootable.
pub fn mtd_fill_entry(
    p: &mut MtdDiskPartition,
    is_kernel: bool,
    priority: u8,
    successful: bool,
    tries: u8,
) {
    p.set_partition_type(if is_kernel {
        MtdPartitionType::Kernel
    } else {
        MtdPartitionType::Firmware
    });
    p.set_priority(priority);
    p.set_successful(successful);
    p.set_tries(tries);
}

/// Build a fully valid flash table mirroring the block-device fixture.
pub fn build_mtd() -> MtdData {
    let mut layout = MtdDiskLayout {
        signature: MTD_DRIVE_SIGNATURE,
        crc32: 0,
        size: MTD_DRIVE_V1_SIZE as u32,
        first_offset: 32 * MTD_SECTOR,
        last_offset: DRIVE_SECTORS * MTD_SECTOR - 1,
        partitions: [empty_partition(); 16],
    };

    let slots: [(MtdPartitionType, u64, u64); 4] = [
        (MtdPartitionType::Kernel, 34, 134),
        (MtdPartitionType::Rootfs, 134, 233),
        (MtdPartitionType::Kernel, 234, 332),
        (MtdPartitionType::Rootfs, 334, 431),
    ];
    for (i, (t, start, end)) in slots.into_iter().enumerate() {
        layout.partitions[i].starting_offset = start * MTD_SECTOR;
        layout.partitions[i].ending_offset = end * MTD_SECTOR - 1;
        layout.partitions[i].set_partition_type(t);
    }
    layout.update_crc();

    let page = SECTOR_SIZE * 8;
    MtdData::new(layout, SECTOR_SIZE, DRIVE_SECTORS, page, page * 8)
}
