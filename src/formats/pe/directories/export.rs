//! Export directory walk

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::config::LoadOptions;
use crate::core::symbol::{SymbolKind, SymbolTable};
use crate::formats::pe::names::{format_import_name, ImportName};
use crate::formats::pe::sections::ImageView;
use crate::formats::pe::types::*;

/// Export directory header (40 bytes)
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportDirectory {
    pub name: u32,
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
}

impl ExportDirectory {
    pub fn read(view: &ImageView<'_>, rva: u64) -> Result<Self> {
        // The whole header must be mapped
        view.bytes_rva(rva, EXPORT_DIRECTORY_SIZE)?;

        Ok(Self {
            name: view.read_u32_rva(rva + 12)?,
            base: view.read_u32_rva(rva + 16)?,
            number_of_functions: view.read_u32_rva(rva + 20)?,
            number_of_names: view.read_u32_rva(rva + 24)?,
            address_of_functions: view.read_u32_rva(rva + 28)?,
            address_of_names: view.read_u32_rva(rva + 32)?,
            address_of_name_ordinals: view.read_u32_rva(rva + 36)?,
        })
    }
}

/// Walk the export directory and define one Export symbol per exported
/// function. Returns the number of symbols defined.
pub fn walk_exports(
    view: &ImageView<'_>,
    dir: DataDirectory,
    options: &LoadOptions,
    symbols: &mut SymbolTable,
) -> Result<usize> {
    let dir_rva = dir.virtual_address as u64;
    let dir_end = dir_rva + dir.size as u64;
    let export_dir = ExportDirectory::read(view, dir_rva)?;

    let dll = if export_dir.name != 0 {
        view.read_cstring_rva(export_dir.name as u64, options.max_name_len)?
            .into_owned()
    } else {
        String::new()
    };

    if export_dir.number_of_names > export_dir.number_of_functions {
        return Err(PeError::MalformedExportTable(format!(
            "{} names for {} functions",
            export_dir.number_of_names, export_dir.number_of_functions
        )));
    }

    // Function index → name
    let name_count = (export_dir.number_of_names as usize).min(options.max_exports);
    let mut names: HashMap<u32, String> = HashMap::with_capacity(name_count);
    for j in 0..name_count as u64 {
        let name_rva = view.read_u32_rva(export_dir.address_of_names as u64 + j * 4)?;
        let index = view.read_u16_rva(export_dir.address_of_name_ordinals as u64 + j * 2)?;
        let name = view.read_cstring_rva(name_rva as u64, options.max_name_len)?;
        names.insert(index as u32, name.into_owned());
    }

    let mut defined = 0usize;
    for i in 0..export_dir.number_of_functions {
        let rva = view.read_u32_rva(export_dir.address_of_functions as u64 + i as u64 * 4)? as u64;
        if rva == 0 {
            continue;
        }
        // Forwarders point at a string inside the directory, not at code
        if rva >= dir_rva && rva < dir_end {
            trace!(index = i, "Skipping forwarded export");
            continue;
        }

        if defined >= options.max_exports {
            warn!(limit = options.max_exports, "Export limit reached");
            break;
        }

        let address = view.mapped_va(rva)?;
        let name = match names.remove(&i) {
            Some(name) => name,
            None => {
                let ordinal = export_dir.base as u64 + i as u64;
                format_import_name(&dll, ImportName::Ordinal(ordinal))
            }
        };

        trace!(address = format_args!("{:#x}", address), name = %name, "Export");
        symbols.define(address, name, SymbolKind::Export);
        defined += 1;
    }

    debug!(dll = %dll, exports = defined, "Export directory walked");
    Ok(defined)
}
