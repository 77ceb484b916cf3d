//! Import name services: the ordinal name database and display-name formatting.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Resolves ordinal-only imports to their textual names
pub trait OrdinalNames: Send + Sync {
    fn lookup_ordinal_name(&self, dll: &str, ordinal: u16) -> Option<&str>;
}

const WS2_32: &[(u16, &str)] = &[
    (1, "accept"),
    (2, "bind"),
    (3, "closesocket"),
    (4, "connect"),
    (5, "getpeername"),
    (6, "getsockname"),
    (7, "getsockopt"),
    (8, "htonl"),
    (9, "htons"),
    (10, "ioctlsocket"),
    (11, "inet_addr"),
    (12, "inet_ntoa"),
    (13, "listen"),
    (14, "ntohl"),
    (15, "ntohs"),
    (16, "recv"),
    (17, "recvfrom"),
    (18, "select"),
    (19, "send"),
    (20, "sendto"),
    (21, "setsockopt"),
    (22, "shutdown"),
    (23, "socket"),
    (51, "gethostbyaddr"),
    (52, "gethostbyname"),
    (53, "getprotobyname"),
    (54, "getprotobynumber"),
    (55, "getservbyname"),
    (56, "getservbyport"),
    (57, "gethostname"),
    (111, "WSAGetLastError"),
    (112, "WSASetLastError"),
    (115, "WSAStartup"),
    (116, "WSACleanup"),
    (151, "__WSAFDIsSet"),
];

const OLEAUT32: &[(u16, &str)] = &[
    (2, "SysAllocString"),
    (3, "SysReAllocString"),
    (4, "SysAllocStringLen"),
    (5, "SysReAllocStringLen"),
    (6, "SysFreeString"),
    (7, "SysStringLen"),
    (8, "VariantInit"),
    (9, "VariantClear"),
    (10, "VariantCopy"),
    (11, "VariantCopyInd"),
    (12, "VariantChangeType"),
];

static BUILTIN: Lazy<OrdinalDatabase> = Lazy::new(|| {
    let mut db = OrdinalDatabase::empty();
    for dll in ["ws2_32.dll", "wsock32.dll"] {
        db.extend(dll, WS2_32.iter().map(|&(o, n)| (o, n.to_string())));
    }
    db.extend(
        "oleaut32.dll",
        OLEAUT32.iter().map(|&(o, n)| (o, n.to_string())),
    );
    db
});

/// In-memory DLL → (ordinal → name) map.
///
/// DLL keys are stored lower-cased and matched case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrdinalDatabase {
    tables: HashMap<String, HashMap<u16, String>>,
}

impl OrdinalDatabase {
    /// A database with no tables
    pub fn empty() -> Self {
        Self::default()
    }

    /// A database holding the built-in winsock and oleaut32 tables
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Load tables from JSON of the form `{"dll": {"ordinal": "name"}}`
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, HashMap<u16, String>> = serde_json::from_str(json)?;
        let mut db = Self::empty();
        for (dll, names) in raw {
            db.extend(&dll, names);
        }
        Ok(db)
    }

    /// Add or replace one entry
    pub fn insert(&mut self, dll: &str, ordinal: u16, name: impl Into<String>) {
        self.tables
            .entry(dll.to_ascii_lowercase())
            .or_default()
            .insert(ordinal, name.into());
    }

    /// Merge entries for one DLL
    pub fn extend(&mut self, dll: &str, names: impl IntoIterator<Item = (u16, String)>) {
        self.tables
            .entry(dll.to_ascii_lowercase())
            .or_default()
            .extend(names);
    }

    /// Merge every table of `other` into this database
    pub fn merge(&mut self, other: OrdinalDatabase) {
        for (dll, names) in other.tables {
            self.extend(&dll, names);
        }
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrdinalNames for OrdinalDatabase {
    fn lookup_ordinal_name(&self, dll: &str, ordinal: u16) -> Option<&str> {
        let table = match self.tables.get(dll) {
            Some(table) => table,
            None => self.tables.get(&dll.to_ascii_lowercase())?,
        };
        table.get(&ordinal).map(String::as_str)
    }
}

/// What an import resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportName<'a> {
    Name(&'a str),
    Ordinal(u64),
}

impl fmt::Display for ImportName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Ordinal(ordinal) => write!(f, "ord{}", ordinal),
        }
    }
}

/// Canonical display name for an import: `"<module>!<symbol>"`.
///
/// The module is the lower-cased DLL name without its extension. Two DLLs
/// exporting the same symbol produce different names, but the result is not
/// guaranteed unique across DLLs with the same stem.
pub fn format_import_name(dll: &str, name: ImportName<'_>) -> String {
    let module = match dll.rfind('.') {
        Some(dot) if dot > 0 => &dll[..dot],
        _ => dll,
    };
    format!("{}!{}", module.to_ascii_lowercase(), name)
}
