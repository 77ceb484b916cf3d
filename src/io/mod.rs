//! Bounded, memory-mapped file input.
//!
//! The loader itself works on byte slices. `MappedImage` is the way to get
//! one from a file without copying it, after checking the configured size
//! limit.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::config::LoadOptions;
use crate::error::{LoupeError, Result};

/// A read-only memory map of an image file
#[derive(Debug)]
pub struct MappedImage {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
}

impl MappedImage {
    /// Map `path`, failing if it is larger than `options.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = options.max_file_size,
            "Mapping image"
        );

        if file_size > options.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = options.max_file_size,
                "File is too large"
            );
            return Err(LoupeError::FileTooLarge {
                limit: options.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file opened above.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mapped bytes; empty for an empty file
    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

impl AsRef<[u8]> for MappedImage {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_map_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"MZ\x90\x00").unwrap();
        file.flush().unwrap();

        let image = MappedImage::open(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(image.bytes(), b"MZ\x90\x00");
        assert_eq!(image.len(), 4);
        assert_eq!(image.path(), file.path());
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let image = MappedImage::open(file.path(), &LoadOptions::default()).unwrap();
        assert!(image.is_empty());
        assert_eq!(image.bytes(), &[] as &[u8]);
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        file.flush().unwrap();

        let options = LoadOptions {
            max_file_size: 16,
            ..LoadOptions::default()
        };
        assert!(matches!(
            MappedImage::open(file.path(), &options),
            Err(LoupeError::FileTooLarge { limit: 16, found: 64 })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MappedImage::open(dir.path().join("absent.exe"), &LoadOptions::default()),
            Err(LoupeError::Io(_))
        ));
    }
}
