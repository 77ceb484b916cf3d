//! Analyzer factory.
//!
//! Analysis itself lives outside this crate; a format plugin only picks the
//! strategy suited to the image it loaded.

/// Opaque analysis strategy handed out by a loaded format
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;
}

/// Default strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAnalyzer;

impl GenericAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for GenericAnalyzer {
    fn name(&self) -> &'static str {
        "generic"
    }
}

/// Strategy for images built on the Visual Basic runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct VisualBasicAnalyzer;

impl VisualBasicAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for VisualBasicAnalyzer {
    fn name(&self) -> &'static str {
        "visualbasic"
    }
}
