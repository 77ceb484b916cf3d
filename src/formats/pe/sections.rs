//! Section table parsing and address translation for PE files

use std::borrow::Cow;

use tracing::debug;

use crate::core::segment::Segment;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

/// Parse section headers from data
pub fn parse_section_headers(
    data: &[u8],
    offset: usize,
    count: u16,
    limit: usize,
) -> Result<Vec<SectionHeader>> {
    let count = count as usize;
    if count > limit {
        return Err(PeError::TooManySections { count, limit });
    }

    let mut sections = Vec::with_capacity(count);

    for i in 0..count {
        let section_offset = offset + i * SECTION_HEADER_SIZE;
        let raw = data
            .get(section_offset..section_offset + SECTION_HEADER_SIZE)
            .ok_or(PeError::TruncatedHeader {
                expected: section_offset + SECTION_HEADER_SIZE,
                actual: data.len(),
            })?;

        let mut name = [0u8; 8];
        name.copy_from_slice(&raw[..8]);

        // The slice is exactly one header long, so these reads cannot miss
        let field = |at: usize| raw.read_u32_le_at(at).unwrap_or_default();

        sections.push(SectionHeader {
            name,
            virtual_size: field(8),
            virtual_address: field(12),
            size_of_raw_data: field(16),
            pointer_to_raw_data: field(20),
            characteristics: field(36),
        });
    }

    Ok(sections)
}

/// Build one segment per mapped section.
///
/// Sections that occupy no address space are skipped.
pub fn build_segments(headers: &[SectionHeader], image_base: u64) -> Vec<Segment> {
    headers
        .iter()
        .filter_map(|header| {
            let address = image_base.checked_add(header.virtual_address as u64)?;
            let segment = Segment::new(
                header.name(),
                header.pointer_to_raw_data as u64,
                address,
                header.mapped_size() as u64,
                header.segment_flags(),
            );
            if segment.is_none() {
                debug!(section = %header.name(), "Skipping empty section");
            }
            segment
        })
        .collect()
}

/// Translate a virtual address through a segment list
pub fn segment_offset(segments: &[Segment], address: u64) -> Option<u64> {
    segments.iter().find_map(|s| s.file_offset_of(address))
}

/// Read-only view of an image used while walking its directories.
///
/// Every read goes through the segment list: an RVA is first turned into a
/// virtual address, then into a file offset, then checked against the data.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    segments: &'a [Segment],
    image_base: u64,
}

impl<'a> ImageView<'a> {
    pub fn new(data: &'a [u8], segments: &'a [Segment], image_base: u64) -> Self {
        Self {
            data,
            segments,
            image_base,
        }
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    /// Virtual address of an RVA
    pub fn va(&self, rva: u64) -> Result<u64> {
        self.image_base
            .checked_add(rva)
            .ok_or(PeError::InvalidRva { rva })
    }

    /// Virtual address of an RVA that some segment contains
    pub fn mapped_va(&self, rva: u64) -> Result<u64> {
        let address = self.va(rva)?;
        match self.offset(address) {
            Some(_) => Ok(address),
            None => Err(PeError::InvalidRva { rva }),
        }
    }

    /// File offset of a virtual address
    pub fn offset(&self, address: u64) -> Option<u64> {
        segment_offset(self.segments, address)
    }

    /// File offset of an RVA
    pub fn rva_to_offset(&self, rva: u64) -> Result<usize> {
        let offset = self
            .offset(self.va(rva)?)
            .ok_or(PeError::InvalidRva { rva })?;
        usize::try_from(offset).map_err(|_| PeError::InvalidOffset { offset })
    }

    pub fn read_u16_rva(&self, rva: u64) -> Result<u16> {
        let offset = self.rva_to_offset(rva)?;
        self.data
            .read_u16_le_at(offset)
            .ok_or(PeError::InvalidOffset { offset: offset as u64 })
    }

    pub fn read_u32_rva(&self, rva: u64) -> Result<u32> {
        let offset = self.rva_to_offset(rva)?;
        self.data
            .read_u32_le_at(offset)
            .ok_or(PeError::InvalidOffset { offset: offset as u64 })
    }

    pub fn read_u64_rva(&self, rva: u64) -> Result<u64> {
        let offset = self.rva_to_offset(rva)?;
        self.data
            .read_u64_le_at(offset)
            .ok_or(PeError::InvalidOffset { offset: offset as u64 })
    }

    /// Bytes starting at an RVA
    pub fn bytes_rva(&self, rva: u64, len: usize) -> Result<&'a [u8]> {
        let offset = self.rva_to_offset(rva)?;
        self.data
            .get(offset..offset.saturating_add(len))
            .ok_or(PeError::InvalidOffset { offset: offset as u64 })
    }

    /// NUL-terminated string at an RVA, at most `max_len` bytes long
    pub fn read_cstring_rva(&self, rva: u64, max_len: usize) -> Result<Cow<'a, str>> {
        let offset = self.rva_to_offset(rva)?;
        self.data
            .read_cstring_at(offset, max_len)
            .ok_or(PeError::InvalidString { rva })
    }
}
