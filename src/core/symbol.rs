//! Symbol and SymbolTable types.
//!
//! The symbol table maps an address to exactly one named, typed symbol and is
//! the single source of truth for names shown downstream (listings, printer).
//! It is written by the format loader during the load phase and read-only
//! afterward.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Symbol kinds for different types of program entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Imported symbol (IAT slot)
    Import,
    /// Exported symbol
    Export,
    /// Image entry point
    EntryPoint,
    /// Function discovered by analysis
    Function,
    /// Data object
    Data,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Import => write!(f, "Import"),
            SymbolKind::Export => write!(f, "Export"),
            SymbolKind::EntryPoint => write!(f, "EntryPoint"),
            SymbolKind::Function => write!(f, "Function"),
            SymbolKind::Data => write!(f, "Data"),
        }
    }
}

/// Named program entity at an address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// Display name
    pub name: String,
    /// Virtual address
    pub address: u64,
    /// Symbol kind
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(address: u64, name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            address,
            kind,
        }
    }

    /// Check whether the symbol has the given kind
    pub fn is(&self, kind: SymbolKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:#x} ({})", self.name, self.address, self.kind)
    }
}

/// Address-keyed symbol table of one loaded image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: BTreeMap<u64, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the symbol at `address`, replacing any previous one.
    ///
    /// The last write stays visible. Overwrites are reported through a debug
    /// event naming both symbols.
    pub fn define(
        &mut self,
        address: u64,
        name: impl Into<String>,
        kind: SymbolKind,
    ) -> Option<Symbol> {
        let symbol = Symbol::new(address, name, kind);
        let previous = self.symbols.insert(address, symbol);

        if let Some(old) = &previous {
            debug!(
                address = format_args!("{:#x}", address),
                old = %old.name,
                old_kind = %old.kind,
                new = %self.symbols[&address].name,
                new_kind = %kind,
                "Symbol overwritten"
            );
        }

        previous
    }

    /// Symbol defined at exactly `address`
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        self.symbols.get(&address)
    }

    /// First symbol with the given name, in address order
    pub fn find_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols.values().find(|s| s.name == name)
    }

    /// Symbols of one kind, in address order
    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> + '_ {
        self.symbols.values().filter(move |s| s.kind == kind)
    }

    /// All symbols in address order
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> + '_ {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
