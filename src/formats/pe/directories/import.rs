//! Import directory walk

use tracing::{debug, trace, warn};

use crate::config::LoadOptions;
use crate::core::symbol::{SymbolKind, SymbolTable};
use crate::formats::pe::names::{format_import_name, ImportName, OrdinalNames};
use crate::formats::pe::sections::ImageView;
use crate::formats::pe::types::*;

/// Width and ordinal tag of one import thunk
pub trait Thunk {
    /// Bytes per thunk entry
    const WIDTH: u64;
    /// The single bit marking an ordinal import
    const ORDINAL_FLAG: u64;

    /// Read one thunk, zero-extended to 64 bits
    fn read(view: &ImageView<'_>, rva: u64) -> Result<u64>;
}

/// Thunks of PE32 images
pub struct Thunk32;

/// Thunks of PE32+ images
pub struct Thunk64;

impl Thunk for Thunk32 {
    const WIDTH: u64 = 4;
    const ORDINAL_FLAG: u64 = 1 << 31;

    fn read(view: &ImageView<'_>, rva: u64) -> Result<u64> {
        view.read_u32_rva(rva).map(u64::from)
    }
}

impl Thunk for Thunk64 {
    const WIDTH: u64 = 8;
    const ORDINAL_FLAG: u64 = 1 << 63;

    fn read(view: &ImageView<'_>, rva: u64) -> Result<u64> {
        view.read_u64_rva(rva)
    }
}

/// Ordinal carried by a thunk value, or `None` for a name-record RVA.
///
/// The flag has exactly one bit set, so clearing it with XOR leaves the
/// ordinal bits untouched.
#[inline]
pub fn resolve_ordinal<T: Thunk>(value: u64) -> Option<u64> {
    if value & T::ORDINAL_FLAG != 0 {
        Some(value ^ T::ORDINAL_FLAG)
    } else {
        None
    }
}

/// One 20-byte import descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name: u32,
    pub first_thunk: u32,
}

impl ImportDescriptor {
    fn read(view: &ImageView<'_>, rva: u64) -> Result<Self> {
        Ok(Self {
            original_first_thunk: view.read_u32_rva(rva)?,
            time_date_stamp: view.read_u32_rva(rva + 4)?,
            forwarder_chain: view.read_u32_rva(rva + 8)?,
            name: view.read_u32_rva(rva + 12)?,
            first_thunk: view.read_u32_rva(rva + 16)?,
        })
    }

    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }

    /// RVA of the table the names and ordinals are read from
    pub fn lookup_table(&self) -> u32 {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}

/// What an import walk produced besides symbols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub descriptors: usize,
    pub imports: usize,
    /// A Visual Basic runtime DLL was imported
    pub visual_basic: bool,
    /// The walk stopped at `max_imports`
    pub capped: bool,
}

/// Shared state of one import walk
pub struct ImportWalker<'a> {
    view: ImageView<'a>,
    names: &'a dyn OrdinalNames,
    options: &'a LoadOptions,
    summary: ImportSummary,
}

impl<'a> ImportWalker<'a> {
    pub fn new(view: ImageView<'a>, names: &'a dyn OrdinalNames, options: &'a LoadOptions) -> Self {
        Self {
            view,
            names,
            options,
            summary: ImportSummary::default(),
        }
    }

    /// Walk every descriptor of the directory at `dir_rva`
    pub fn walk<T: Thunk>(mut self, dir_rva: u32, symbols: &mut SymbolTable) -> Result<ImportSummary> {
        let mut rva = dir_rva as u64;

        loop {
            let descriptor = ImportDescriptor::read(&self.view, rva)?;
            if descriptor.is_null() {
                break;
            }
            let at = rva;
            rva += IMPORT_DESCRIPTOR_SIZE as u64;

            if descriptor.name == 0 {
                warn!(rva = format_args!("{:#x}", at), "Skipping import descriptor without a name");
                continue;
            }

            self.summary.descriptors += 1;
            self.read_descriptor::<T>(&descriptor, symbols)?;
            if self.summary.capped {
                break;
            }
        }

        debug!(
            descriptors = self.summary.descriptors,
            imports = self.summary.imports,
            "Import directory walked"
        );
        Ok(self.summary)
    }

    /// Define one Import symbol per thunk of a descriptor
    pub fn read_descriptor<T: Thunk>(
        &mut self,
        descriptor: &ImportDescriptor,
        symbols: &mut SymbolTable,
    ) -> Result<()> {
        let dll = self
            .view
            .read_cstring_rva(descriptor.name as u64, self.options.max_name_len)?
            .to_ascii_lowercase();

        if dll.contains("msvbvm") {
            self.summary.visual_basic = true;
        }

        let table = descriptor.lookup_table() as u64;
        if table == 0 {
            return Ok(());
        }
        if descriptor.first_thunk == 0 {
            return Err(PeError::MalformedImportTable(format!(
                "descriptor for {} has no FirstThunk",
                dll
            )));
        }

        for i in 0u64.. {
            let value = T::read(&self.view, table + i * T::WIDTH)?;
            if value == 0 {
                break;
            }

            if self.summary.imports >= self.options.max_imports {
                warn!(limit = self.options.max_imports, dll = %dll, "Import limit reached");
                self.summary.capped = true;
                break;
            }

            // Instructions dereference the FirstThunk slot, whichever table named it
            let address = self
                .view
                .mapped_va(descriptor.first_thunk as u64 + i * T::WIDTH)?;
            let name = self.import_name::<T>(&dll, value)?;

            trace!(address = format_args!("{:#x}", address), name = %name, "Import");
            symbols.define(address, name, SymbolKind::Import);
            self.summary.imports += 1;
        }

        Ok(())
    }

    fn import_name<T: Thunk>(&self, dll: &str, value: u64) -> Result<String> {
        match resolve_ordinal::<T>(value) {
            None => {
                // Skip the two-byte hint of the hint/name record
                let rva = value.checked_add(2).ok_or(PeError::InvalidRva { rva: value })?;
                let name = self.view.read_cstring_rva(rva, self.options.max_name_len)?;
                Ok(format_import_name(dll, ImportName::Name(&name)))
            }
            Some(ordinal) => {
                let resolved = u16::try_from(ordinal)
                    .ok()
                    .and_then(|o| self.names.lookup_ordinal_name(dll, o));
                Ok(match resolved {
                    Some(name) => format_import_name(dll, ImportName::Name(name)),
                    None => format_import_name(dll, ImportName::Ordinal(ordinal)),
                })
            }
        }
    }
}
