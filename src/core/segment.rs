//! Segment type for load-time memory mapping units.
//!
//! A segment is a contiguous virtual address range backed by a region of the
//! image file. It is the unit of address to file offset translation.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Segment type and access flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SegmentFlags: u32 {
        const CODE = 0x0000_0001;
        const DATA = 0x0000_0002;
        const READ = 0x0000_0010;
        const WRITE = 0x0000_0020;
        const BSS = 0x0000_0040;
    }
}

impl fmt::Display for SegmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut perms = String::new();
        perms.push(if self.contains(Self::READ) { 'r' } else { '-' });
        perms.push(if self.contains(Self::WRITE) { 'w' } else { '-' });
        perms.push(if self.contains(Self::CODE) { 'x' } else { '-' });
        write!(f, "{}", perms)
    }
}

/// Load-time memory mapping unit.
///
/// Fields are read-only after construction so `end_address > address` holds
/// for every segment, including deserialized ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSegment")]
pub struct Segment {
    name: String,
    offset: u64,
    address: u64,
    end_address: u64,
    flags: SegmentFlags,
}

#[derive(Deserialize)]
struct RawSegment {
    name: String,
    offset: u64,
    address: u64,
    end_address: u64,
    flags: SegmentFlags,
}

impl TryFrom<RawSegment> for Segment {
    type Error = String;

    fn try_from(raw: RawSegment) -> Result<Self, Self::Error> {
        let size = raw.end_address.saturating_sub(raw.address);
        Segment::new(raw.name, raw.offset, raw.address, size, raw.flags).ok_or_else(|| {
            format!(
                "segment range [{:#x}, {:#x}) is empty",
                raw.address, raw.end_address
            )
        })
    }
}

impl Segment {
    /// Create a segment covering `[address, address + size)`.
    ///
    /// Returns `None` for empty or wrapping ranges, so every constructed
    /// segment satisfies `end_address > address`.
    pub fn new(
        name: impl Into<String>,
        offset: u64,
        address: u64,
        size: u64,
        flags: SegmentFlags,
    ) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let end_address = address.checked_add(size)?;
        Some(Self {
            name: name.into(),
            offset,
            address,
            end_address,
            flags,
        })
    }

    /// Human-readable name (section name for PE images)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File offset where segment data begins
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// First virtual address of the segment
    pub fn address(&self) -> u64 {
        self.address
    }

    /// One past the last virtual address
    pub fn end_address(&self) -> u64 {
        self.end_address
    }

    pub fn flags(&self) -> SegmentFlags {
        self.flags
    }

    /// Get the segment size in bytes
    pub fn size(&self) -> u64 {
        self.end_address - self.address
    }

    /// Check whether `address` falls inside the segment
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.end_address
    }

    /// Check whether any of `flags` is set
    pub fn is(&self, flags: SegmentFlags) -> bool {
        self.flags.intersects(flags)
    }

    /// Translate a virtual address inside this segment to a file offset
    pub fn file_offset_of(&self, address: u64) -> Option<u64> {
        if !self.contains(address) {
            return None;
        }
        self.offset.checked_add(address - self.address)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Segment '{}' [{:#x}, {:#x}) {}",
            self.name, self.address, self.end_address, self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text() -> Segment {
        Segment::new(
            ".text",
            0x400,
            0x401000,
            0x1000,
            SegmentFlags::CODE | SegmentFlags::READ,
        )
        .unwrap()
    }

    #[test]
    fn test_segment_bounds() {
        let seg = text();
        assert_eq!(seg.size(), 0x1000);
        assert!(seg.contains(0x401000));
        assert!(seg.contains(0x401FFF));
        assert!(!seg.contains(0x402000));
        assert!(!seg.contains(0x400FFF));
    }

    #[test]
    fn test_file_offset_of() {
        let seg = text();
        assert_eq!(seg.file_offset_of(seg.address()), Some(seg.offset()));
        assert_eq!(seg.file_offset_of(0x401010), Some(0x410));
        assert_eq!(seg.file_offset_of(0x402000), None);
    }

    #[test]
    fn test_empty_and_wrapping_segments_rejected() {
        assert!(Segment::new(".bss", 0, 0x1000, 0, SegmentFlags::BSS).is_none());
        assert!(Segment::new("wrap", 0, u64::MAX - 1, 4, SegmentFlags::DATA).is_none());
    }

    #[test]
    fn test_flags() {
        let seg = text();
        assert!(seg.is(SegmentFlags::CODE));
        assert!(!seg.is(SegmentFlags::WRITE));
        assert_eq!(seg.flags().to_string(), "r-x");
        assert!(seg.to_string().starts_with("Segment '.text'"));
    }

    #[test]
    fn test_deserialize_checks_range() {
        let seg = text();
        let json = serde_json::to_string(&seg).unwrap();
        assert_eq!(serde_json::from_str::<Segment>(&json).unwrap(), seg);

        let inverted = json.replace("\"end_address\":4202496", "\"end_address\":4198400");
        assert_ne!(inverted, json);
        assert!(serde_json::from_str::<Segment>(&inverted).is_err());
    }
}
