//! Executable format loaders.
//!
//! A format plugin turns raw image bytes into segments and symbols. Plugins
//! are created empty, loaded once, and are read-only afterwards, so a loaded
//! plugin can be shared across threads.

pub mod pe;

use crate::analysis::Analyzer;
use crate::core::segment::Segment;
use crate::core::symbol::SymbolTable;
use crate::error::Result;

/// Contract every executable format loader implements
pub trait FormatPlugin: Send + Sync {
    /// Short format identifier, e.g. `"pe"`
    fn name(&self) -> &'static str;

    /// Address width of the loaded image, 0 before a successful load
    fn bits(&self) -> u32;

    /// Processor identifier used to pick a decoder
    fn processor(&self) -> Option<&'static str>;

    /// File offset of a virtual address
    fn offset(&self, address: u64) -> Result<u64>;

    /// Parse `data`; state changes only when this returns `Ok`
    fn load(&mut self, data: &[u8]) -> Result<()>;

    fn segments(&self) -> &[Segment];

    fn symbols(&self) -> Option<&SymbolTable>;

    /// Virtual address of the entry point, if the image has one
    fn entry_point(&self) -> Option<u64>;

    /// Analysis strategy suited to the loaded image
    fn create_analyzer(&self) -> Box<dyn Analyzer>;

    /// Index of the segment containing `address`
    fn segment_index(&self, address: u64) -> Option<usize> {
        self.segments().iter().position(|s| s.contains(address))
    }
}
