//! PE/COFF format loader

use std::sync::Arc;

use tracing::{debug, info, trace};

pub mod directories;
pub mod headers;
pub mod names;
pub mod sections;
pub mod types;
pub mod utils;

use directories::{walk_exports, ImportWalker, Thunk32, Thunk64};
use headers::*;
use sections::*;
pub use names::{format_import_name, ImportName, OrdinalDatabase, OrdinalNames};
pub use types::*;

use crate::analysis::{Analyzer, GenericAnalyzer, VisualBasicAnalyzer};
use crate::config::LoadOptions;
use crate::core::segment::Segment;
use crate::core::symbol::{SymbolKind, SymbolTable};
use crate::error::LoupeError;
use crate::formats::FormatPlugin;

/// Name given to the entry point symbol
pub const ENTRY_POINT_NAME: &str = "entrypoint";

/// Everything a successful load produces
#[derive(Debug, Clone)]
struct LoadedImage {
    nt_headers: NtHeaders,
    segments: Vec<Segment>,
    symbols: SymbolTable,
    variant: PeVariant,
}

/// PE format plugin.
///
/// Holds no image until [`FormatPlugin::load`] succeeds; a failed load leaves
/// the previous state untouched.
pub struct PeFormat {
    options: LoadOptions,
    names: Arc<dyn OrdinalNames>,
    image: Option<LoadedImage>,
}

impl Default for PeFormat {
    fn default() -> Self {
        Self::with_options(LoadOptions::default())
    }
}

impl std::fmt::Debug for PeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeFormat")
            .field("options", &self.options)
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

impl PeFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: LoadOptions) -> Self {
        Self {
            options,
            names: Arc::new(OrdinalDatabase::builtin()),
            image: None,
        }
    }

    /// Replace the ordinal name database used by the import walk
    pub fn with_names(mut self, names: Arc<dyn OrdinalNames>) -> Self {
        self.names = names;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn nt_headers(&self) -> Option<&NtHeaders> {
        self.image.as_ref().map(|i| &i.nt_headers)
    }

    pub fn image_base(&self) -> Option<u64> {
        self.nt_headers().map(|h| h.optional_header.image_base)
    }

    pub fn section_alignment(&self) -> Option<u32> {
        self.nt_headers().map(|h| h.optional_header.section_alignment)
    }

    pub fn machine(&self) -> Option<Machine> {
        self.nt_headers().map(|h| h.file_header.machine)
    }

    /// Variant hint gathered from the imports
    pub fn variant(&self) -> PeVariant {
        self.image.as_ref().map(|i| i.variant).unwrap_or_default()
    }

    /// File offset of an RVA
    pub fn rva_to_offset(&self, rva: u64) -> crate::error::Result<u64> {
        let base = self.image_base().unwrap_or_default();
        let address = base
            .checked_add(rva)
            .ok_or(LoupeError::UnresolvedAddress { address: rva })?;
        self.offset(address)
    }

    /// Parse `data` into a fresh image without touching `self`
    fn parse(&self, data: &[u8]) -> Result<LoadedImage> {
        let dos_header = parse_dos_header(data)?;
        let nt_headers = parse_nt_headers(data, dos_header.e_lfanew as usize)?;
        let image_base = nt_headers.optional_header.image_base;

        let section_headers = parse_section_headers(
            data,
            section_table_offset(&dos_header, &nt_headers),
            nt_headers.file_header.number_of_sections,
            self.options.max_sections,
        )?;

        // (a) segments
        let segments = build_segments(&section_headers, image_base);
        debug!(
            sections = section_headers.len(),
            segments = segments.len(),
            "Section table parsed"
        );

        let view = ImageView::new(data, &segments, image_base);
        let mut symbols = SymbolTable::new();
        let mut variant = PeVariant::Generic;

        // (b) entry point
        let entry_rva = nt_headers.optional_header.address_of_entry_point;
        if entry_rva != 0 {
            let address = view.mapped_va(entry_rva as u64)?;
            trace!(address = format_args!("{:#x}", address), "Entry point");
            symbols.define(address, ENTRY_POINT_NAME, SymbolKind::EntryPoint);
        }

        // (c) exports
        let export_dir = nt_headers.data_directory(IMAGE_DIRECTORY_ENTRY_EXPORT);
        if self.options.parse_exports && export_dir.is_present() {
            walk_exports(&view, export_dir, &self.options, &mut symbols)?;
        }

        // (d) imports
        let import_dir = nt_headers.data_directory(IMAGE_DIRECTORY_ENTRY_IMPORT);
        if self.options.parse_imports && import_dir.is_present() {
            let walker = ImportWalker::new(view, self.names.as_ref(), &self.options);
            let summary = if nt_headers.optional_header.is_64bit() {
                walker.walk::<Thunk64>(import_dir.virtual_address, &mut symbols)?
            } else {
                walker.walk::<Thunk32>(import_dir.virtual_address, &mut symbols)?
            };
            if summary.visual_basic {
                variant = PeVariant::VisualBasic;
            }
        }

        Ok(LoadedImage {
            nt_headers,
            segments,
            symbols,
            variant,
        })
    }
}

impl FormatPlugin for PeFormat {
    fn name(&self) -> &'static str {
        "pe"
    }

    fn bits(&self) -> u32 {
        self.nt_headers()
            .map(|h| h.optional_header.bits())
            .unwrap_or_default()
    }

    fn processor(&self) -> Option<&'static str> {
        self.machine().and_then(|m| m.processor())
    }

    fn offset(&self, address: u64) -> crate::error::Result<u64> {
        segment_offset(self.segments(), address).ok_or(LoupeError::UnresolvedAddress { address })
    }

    fn load(&mut self, data: &[u8]) -> crate::error::Result<()> {
        info!(size = data.len(), "Loading PE image");

        let image = self.parse(data)?;
        info!(
            bits = image.nt_headers.optional_header.bits(),
            segments = image.segments.len(),
            symbols = image.symbols.len(),
            variant = ?image.variant,
            "PE image loaded"
        );

        self.image = Some(image);
        Ok(())
    }

    fn segments(&self) -> &[Segment] {
        self.image.as_ref().map(|i| i.segments.as_slice()).unwrap_or(&[])
    }

    fn symbols(&self) -> Option<&SymbolTable> {
        self.image.as_ref().map(|i| &i.symbols)
    }

    fn entry_point(&self) -> Option<u64> {
        let image = self.image.as_ref()?;
        let rva = image.nt_headers.optional_header.address_of_entry_point;
        if rva == 0 {
            return None;
        }
        image.nt_headers.optional_header.image_base.checked_add(rva as u64)
    }

    fn create_analyzer(&self) -> Box<dyn Analyzer> {
        match self.variant() {
            PeVariant::VisualBasic => Box::new(VisualBasicAnalyzer::new()),
            PeVariant::Generic => Box::new(GenericAnalyzer::new()),
        }
    }
}
