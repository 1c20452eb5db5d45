//! GPT header parsing and structural validation
//!
//! Each of the two table copies starts with one header sector. A header is
//! judged entirely on its own bytes plus the drive geometry; the entry
//! array it points at is validated separately (see [`crate::entries`]).

use crc32fast::Hasher;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Ref, Unaligned};

use crate::guid::Guid;
use crate::{
    GPT_ENTRIES_SECTORS, GPT_HEADER_SECTORS, GPT_PMBR_SECTORS, MAX_NUMBER_OF_ENTRIES,
    SIZE_OF_ENTRY, TOTAL_ENTRIES_SIZE,
};

/// Fixed 8-byte header magic.
pub const GPT_HEADER_SIGNATURE: [u8; 8] = *b"EFI PART";

/// The one supported header revision (1.0).
pub const GPT_HEADER_REVISION: u32 = 0x0001_0000;

/// Smallest declared header size the format allows.
pub const MIN_SIZE_OF_HEADER: u32 = 92;

/// Largest declared header size: one sector.
pub const MAX_SIZE_OF_HEADER: u32 = 512;

/// Byte offset of `header_crc32` within the header.
const HEADER_CRC_OFFSET: usize = 16;

/// On-media GPT header (92 bytes; the rest of the sector is padding).
///
/// Multi-byte fields are little-endian. The struct is packed so it can be
/// viewed at any offset of a caller byte buffer.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct GptHeader {
    /// Magic bytes; must equal [`GPT_HEADER_SIGNATURE`].
    pub signature: [u8; 8],
    /// Format revision; must equal [`GPT_HEADER_REVISION`].
    pub revision: u32,
    /// Declared header size in bytes; the self-CRC covers exactly this many.
    pub size: u32,
    /// CRC32 of the first `size` bytes, computed with this field zeroed.
    pub header_crc32: u32,
    /// Reserved; must be zero.
    pub reserved_zero: u32,
    /// LBA of the sector holding this copy of the header.
    pub my_lba: u64,
    /// LBA of the other copy. Informational only; never validated.
    pub alternate_lba: u64,
    /// First LBA usable for partition contents.
    pub first_usable_lba: u64,
    /// Last usable LBA (inclusive).
    pub last_usable_lba: u64,
    /// GUID identifying the disk.
    pub disk_uuid: Guid,
    /// Starting LBA of this copy's entry array.
    pub entries_lba: u64,
    /// Number of entries in the array.
    pub number_of_entries: u32,
    /// Size of one entry in bytes.
    pub size_of_entry: u32,
    /// CRC32 of the whole entry array.
    pub entries_crc32: u32,
}

/// Which of the two on-media copies a header sector claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCopy {
    /// The copy at LBA 1, entries ascending after it.
    Primary,
    /// The copy in the last sector, entries immediately below it.
    Secondary,
}

/// View the header at the start of a sector buffer.
///
/// Returns `None` if the buffer is too short to hold a header.
pub fn header_from_bytes(sector: &[u8]) -> Option<&GptHeader> {
    Ref::<_, GptHeader>::new_from_prefix(sector).map(|(r, _)| r.into_ref())
}

/// Mutable view of the header at the start of a sector buffer.
pub fn header_from_bytes_mut(sector: &mut [u8]) -> Option<&mut GptHeader> {
    Ref::<_, GptHeader>::new_from_prefix(sector).map(|(r, _)| r.into_mut())
}

/// Compute a header's self-CRC: CRC32 over the declared `size` bytes of the
/// sector with the stored CRC field treated as zero.
///
/// A buffer too short to reach past the CRC field yields 0.
pub fn header_crc(sector: &[u8]) -> u32 {
    if sector.len() < HEADER_CRC_OFFSET + 4 {
        return 0;
    }
    let declared = header_from_bytes(sector).map(|h| h.size as usize).unwrap_or(0);
    let size = declared.clamp(HEADER_CRC_OFFSET + 4, sector.len());
    let mut hasher = Hasher::new();
    hasher.update(&sector[..HEADER_CRC_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&sector[HEADER_CRC_OFFSET + 4..size]);
    hasher.finalize()
}

/// Validate one header copy in isolation.
///
/// Returns `true` iff the sector holds a structurally valid header for the
/// given copy position on a drive of `drive_sectors` sectors. The entry
/// array CRC is *not* checked here.
pub fn check_header(sector: &[u8], copy: HeaderCopy, drive_sectors: u64) -> bool {
    let Some(h) = header_from_bytes(sector) else {
        return false;
    };

    if { h.signature } != GPT_HEADER_SIGNATURE {
        return false;
    }
    if { h.revision } != GPT_HEADER_REVISION {
        return false;
    }

    let size = h.size;
    if size < MIN_SIZE_OF_HEADER || size > MAX_SIZE_OF_HEADER {
        return false;
    }
    if size as usize > sector.len() {
        return false;
    }
    if header_crc(sector) != { h.header_crc32 } {
        return false;
    }
    if { h.reserved_zero } != 0 {
        return false;
    }

    // Only one entry geometry is supported.
    if h.size_of_entry as usize != SIZE_OF_ENTRY {
        return false;
    }
    if h.number_of_entries as usize != MAX_NUMBER_OF_ENTRIES
        || (h.number_of_entries as u64) * (h.size_of_entry as u64) != TOTAL_ENTRIES_SIZE as u64
    {
        return false;
    }

    let my_lba = h.my_lba;
    let entries_lba = h.entries_lba;
    match copy {
        HeaderCopy::Primary => {
            if my_lba != GPT_PMBR_SECTORS {
                return false;
            }
            // Padding between the primary header and its entries is fine,
            // but the entries may not precede the header.
            if entries_lba <= my_lba {
                return false;
            }
        }
        HeaderCopy::Secondary => {
            if my_lba != drive_sectors.wrapping_sub(GPT_HEADER_SECTORS) {
                return false;
            }
            // The secondary entries must abut their header from below.
            if entries_lba != my_lba.wrapping_sub(GPT_ENTRIES_SECTORS) {
                return false;
            }
        }
    }

    // The usable window must clear both copies' header+entries regions.
    let first = h.first_usable_lba;
    let last = h.last_usable_lba;
    if first < GPT_PMBR_SECTORS + GPT_HEADER_SECTORS + GPT_ENTRIES_SECTORS {
        return false;
    }
    let Some(max_last) = drive_sectors.checked_sub(1 + GPT_HEADER_SECTORS + GPT_ENTRIES_SECTORS)
    else {
        return false;
    };
    if last > max_last {
        return false;
    }
    if first > last {
        return false;
    }

    true
}

/// Compare the fields the two copies are expected to share.
///
/// The copy-specific positional fields (`my_lba`, `alternate_lba`,
/// `entries_lba`) and the self-CRC are excluded.
pub fn fields_same(a: &GptHeader, b: &GptHeader) -> bool {
    ({ a.signature } == { b.signature })
        && { a.revision } == { b.revision }
        && { a.size } == { b.size }
        && { a.reserved_zero } == { b.reserved_zero }
        && { a.first_usable_lba } == { b.first_usable_lba }
        && { a.last_usable_lba } == { b.last_usable_lba }
        && { a.disk_uuid } == { b.disk_uuid }
        && { a.number_of_entries } == { b.number_of_entries }
        && { a.size_of_entry } == { b.size_of_entry }
        && { a.entries_crc32 } == { b.entries_crc32 }
}
