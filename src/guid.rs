//! 16-byte GUIDs in on-media byte order
//!
//! GPT stores GUIDs in the mixed-endian EFI layout: the first three groups
//! little-endian, the rest big-endian. This module keeps them as opaque
//! 16-byte values; pretty-printing belongs to host-side tooling.

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// A 128-bit globally unique identifier, stored in on-media byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromZeroes, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    /// The all-zero GUID, marking a partition entry as unused.
    pub const ZERO: Guid = Guid([0; 16]);

    /// Build a GUID from its textual groups (`aabbccdd-eeff-gghh-iijj-kk..`),
    /// encoding the first three groups little-endian as the media format
    /// requires.
    pub const fn new(
        time_low: u32,
        time_mid: u16,
        time_high: u16,
        clock_high: u8,
        clock_low: u8,
        node: [u8; 6],
    ) -> Guid {
        let a = time_low.to_le_bytes();
        let b = time_mid.to_le_bytes();
        let c = time_high.to_le_bytes();
        Guid([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], clock_high, clock_low, node[0],
            node[1], node[2], node[3], node[4], node[5],
        ])
    }

    /// Whether this is the zero GUID.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }
}

/// Partition type marking a bootable kernel slot (ChromeOS kernel).
pub const TYPE_CHROMEOS_KERNEL: Guid = Guid::new(
    0xFE3A2A5D,
    0x4F32,
    0x41A7,
    0xB7,
    0x25,
    [0xAC, 0xCC, 0x32, 0x85, 0xA3, 0x09],
);

/// Partition type for a root filesystem (ChromeOS rootfs).
pub const TYPE_CHROMEOS_ROOTFS: Guid = Guid::new(
    0x3CB8E202,
    0x3B7E,
    0x47DD,
    0x8A,
    0x3C,
    [0x7F, 0xF2, 0xA1, 0x3C, 0xFC, 0xEC],
);
