//! Data directory walkers

pub mod export;
pub mod import;

pub use export::{walk_exports, ExportDirectory};
pub use import::{resolve_ordinal, ImportDescriptor, ImportSummary, ImportWalker, Thunk, Thunk32, Thunk64};
