//! Error types for partition-table operations
//!
//! Every operation returns a result code with a fixed, enumerable meaning.
//! Firmware callers exchange these as small integers, so each variant has a
//! stable numeric code alongside its `Display` text.

use core::fmt;

/// Result type for partition-table operations
pub type Result<T> = core::result::Result<T, GptError>;

/// Errors that can occur during partition-table operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GptError {
    /// No eligible kernel slot remains to try
    NoValidKernel = 1,

    /// Neither header copy is structurally valid
    InvalidHeaders = 2,

    /// Neither entry-array copy is valid under the trusted header
    InvalidEntries = 3,

    /// Unsupported sector size
    InvalidSectorSize = 4,

    /// Drive too small for the fixed on-media layout
    InvalidSectorNumber = 5,

    /// Outcome update requested with no selected slot, or for an entry
    /// that is no longer a kernel
    InvalidUpdateType = 6,

    /// Entry-array CRC32 does not match the header
    CrcCorrupted = 7,

    /// An active entry lies outside the usable region, or ends before it
    /// starts
    OutOfRegion = 8,

    /// Two active entries share a starting LBA, or one encloses another
    StartLbaOverlap = 9,

    /// Two active entries touch or partially overlap
    EndLbaOverlap = 10,

    /// Two active entries share a unique GUID
    DupGuid = 11,

    /// Flash page/block sizes inconsistent with each other or the sector
    /// size
    InvalidFlashGeometry = 12,
}

/// Number of defined result codes, success included.
const CODE_COUNT: u32 = 13;

impl GptError {
    /// The stable numeric code for this error.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a numeric code back to an error. Code 0 is success and all
    /// codes at or beyond the defined range are unknown; both yield `None`.
    pub fn from_code(code: u32) -> Option<GptError> {
        match code {
            1 => Some(Self::NoValidKernel),
            2 => Some(Self::InvalidHeaders),
            3 => Some(Self::InvalidEntries),
            4 => Some(Self::InvalidSectorSize),
            5 => Some(Self::InvalidSectorNumber),
            6 => Some(Self::InvalidUpdateType),
            7 => Some(Self::CrcCorrupted),
            8 => Some(Self::OutOfRegion),
            9 => Some(Self::StartLbaOverlap),
            10 => Some(Self::EndLbaOverlap),
            11 => Some(Self::DupGuid),
            12 => Some(Self::InvalidFlashGeometry),
            _ => None,
        }
    }
}

impl fmt::Display for GptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValidKernel => write!(f, "No valid kernel found"),
            Self::InvalidHeaders => write!(f, "Invalid headers"),
            Self::InvalidEntries => write!(f, "Invalid entries"),
            Self::InvalidSectorSize => write!(f, "Invalid sector size"),
            Self::InvalidSectorNumber => write!(f, "Invalid sector number"),
            Self::InvalidUpdateType => write!(f, "Invalid update type"),
            Self::CrcCorrupted => write!(f, "CRC corrupted"),
            Self::OutOfRegion => write!(f, "Entry outside of valid region"),
            Self::StartLbaOverlap => write!(f, "Starting LBA overlaps"),
            Self::EndLbaOverlap => write!(f, "Ending LBA overlaps"),
            Self::DupGuid => write!(f, "Duplicated GUID occurrence"),
            Self::InvalidFlashGeometry => write!(f, "Invalid flash geometry"),
        }
    }
}

/// Human-readable text for a numeric result code.
///
/// Covers code 0 ("Success") and every defined error code; any code
/// outside the defined range maps to the distinct string "Unknown".
pub fn error_text(code: u32) -> &'static str {
    match code {
        0 => "Success",
        1 => "No valid kernel found",
        2 => "Invalid headers",
        3 => "Invalid entries",
        4 => "Invalid sector size",
        5 => "Invalid sector number",
        6 => "Invalid update type",
        7 => "CRC corrupted",
        8 => "Entry outside of valid region",
        9 => "Starting LBA overlaps",
        10 => "Ending LBA overlaps",
        11 => "Duplicated GUID occurrence",
        12 => "Invalid flash geometry",
        _ => "Unknown",
    }
}
