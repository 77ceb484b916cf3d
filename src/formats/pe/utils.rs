//! Utility functions for PE parsing

use std::borrow::Cow;

/// Extension trait for reading primitive types from byte slices
pub trait ReadExt {
    fn read_u16_le_at(&self, offset: usize) -> Option<u16>;
    fn read_u32_le_at(&self, offset: usize) -> Option<u32>;
    fn read_u64_le_at(&self, offset: usize) -> Option<u64>;
    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<Cow<'_, str>>;
}

impl ReadExt for [u8] {
    #[inline(always)]
    fn read_u16_le_at(&self, offset: usize) -> Option<u16> {
        self.get(offset..offset.checked_add(2)?)
            .and_then(|b| b.try_into().ok())
            .map(u16::from_le_bytes)
    }

    #[inline(always)]
    fn read_u32_le_at(&self, offset: usize) -> Option<u32> {
        self.get(offset..offset.checked_add(4)?)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    }

    #[inline(always)]
    fn read_u64_le_at(&self, offset: usize) -> Option<u64> {
        self.get(offset..offset.checked_add(8)?)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes.
    ///
    /// The terminator must appear within `max_len` bytes and inside the
    /// slice; an unterminated run is rejected rather than truncated.
    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<Cow<'_, str>> {
        let end = offset.saturating_add(max_len.saturating_add(1)).min(self.len());
        let slice = self.get(offset..end)?;
        let len = slice.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&slice[..len]))
    }
}
