//! Load configuration.
//!
//! Bounds applied while walking untrusted image structures. Every field has a
//! default, so partial JSON documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options controlling how an image is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Walk the export directory.
    pub parse_exports: bool,
    /// Walk the import directory.
    pub parse_imports: bool,
    /// Section tables longer than this are rejected.
    pub max_sections: usize,
    /// Import walk stops after this many symbols.
    pub max_imports: usize,
    /// Export walk stops after this many symbols.
    pub max_exports: usize,
    /// Longest C string read for a DLL or symbol name.
    pub max_name_len: usize,
    /// Largest file `io::MappedImage` will map.
    pub max_file_size: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            parse_exports: true,
            parse_imports: true,
            max_sections: 96,
            max_imports: 10_000,
            max_exports: 10_000,
            max_name_len: 512,
            max_file_size: 512 * 1024 * 1024,
        }
    }
}

impl LoadOptions {
    /// Parse options from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize options to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoupeError;

    #[test]
    fn test_defaults() {
        let opts = LoadOptions::default();
        assert!(opts.parse_imports);
        assert!(opts.parse_exports);
        assert_eq!(opts.max_sections, 96);
        assert_eq!(opts.max_name_len, 512);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts = LoadOptions::from_json(r#"{ "max_imports": 5, "parse_exports": false }"#)
            .unwrap();
        assert_eq!(opts.max_imports, 5);
        assert!(!opts.parse_exports);
        assert_eq!(opts.max_exports, LoadOptions::default().max_exports);
    }

    #[test]
    fn test_json_roundtrip_and_errors() {
        let opts = LoadOptions {
            max_sections: 4,
            ..Default::default()
        };
        let text = opts.to_json().unwrap();
        assert_eq!(LoadOptions::from_json(&text).unwrap(), opts);

        assert!(matches!(
            LoadOptions::from_json("{ not json"),
            Err(LoupeError::Serialization(_))
        ));
    }
}
