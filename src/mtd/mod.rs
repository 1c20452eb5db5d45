//! Single-copy partition layout for raw NAND flash
//!
//! Raw-flash media have no spare region for a second table copy, so the
//! whole layout lives in one small CRC-protected structure kept in the
//! flash's metadata store. The selection and update semantics mirror the
//! dual-copy engine; only the storage model differs: byte offsets instead
//! of LBAs, a packed 32-bit flags word per partition instead of GPT
//! attribute bits, and a plain dirty bit instead of per-buffer flags.

mod layout;
mod table;

pub use layout::{
    check_entries, MtdDiskLayout, MtdDiskPartition, MtdPartitionType, MTD_DRIVE_SIGNATURE,
    MTD_DRIVE_V1_SIZE, MTD_MAX_PARTITIONS,
};
pub use table::MtdData;
