//! Core PE data types and structures

use thiserror::Error;

use crate::core::segment::SegmentFlags;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

pub const DOS_HEADER_SIZE: usize = 64;
pub const COFF_HEADER_SIZE: usize = 20;
pub const SECTION_HEADER_SIZE: usize = 40;
pub const IMPORT_DESCRIPTOR_SIZE: usize = 20;
pub const EXPORT_DIRECTORY_SIZE: usize = 40;

// Data directory indices
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

// Section characteristics
pub const IMAGE_SCN_CNT_CODE: u32 = 0x00000020;
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x00000040;
pub const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x00000080;
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x20000000;
pub const IMAGE_SCN_MEM_READ: u32 = 0x40000000;
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x80000000;

/// PE parsing error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    #[error("Invalid DOS signature")]
    InvalidDosSignature,
    #[error("Invalid PE signature")]
    InvalidPeSignature,
    #[error("Invalid machine type: 0x{0:04x}")]
    InvalidMachine(u16),
    #[error("Invalid optional header magic: 0x{0:04x}")]
    InvalidMagic(u16),
    #[error("Truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    #[error("Invalid RVA: 0x{rva:08x}")]
    InvalidRva { rva: u64 },
    #[error("Invalid file offset: 0x{offset:x}")]
    InvalidOffset { offset: u64 },
    #[error("Invalid string at RVA 0x{rva:08x}")]
    InvalidString { rva: u64 },
    #[error("Too many sections: {count} (limit {limit})")]
    TooManySections { count: usize, limit: usize },
    #[error("Malformed import table: {0}")]
    MalformedImportTable(String),
    #[error("Malformed export table: {0}")]
    MalformedExportTable(String),
}

pub type Result<T> = std::result::Result<T, PeError>;

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm,    // 0x01c0
    ArmNT,  // 0x01c4
    Arm64,  // 0xaa64
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            0x8664 => Self::X86_64,
            0x01c0 => Self::Arm,
            0x01c4 => Self::ArmNT,
            0xaa64 => Self::Arm64,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl Machine {
    /// Raw COFF machine value
    pub fn raw(&self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::I386 => 0x014c,
            Self::X86_64 => 0x8664,
            Self::Arm => 0x01c0,
            Self::ArmNT => 0x01c4,
            Self::Arm64 => 0xaa64,
            Self::Other(v) => *v,
        }
    }

    /// Processor identifier used to select a decoding backend
    pub fn processor(&self) -> Option<&'static str> {
        match self {
            Self::I386 => Some("x86_32"),
            Self::X86_64 => Some("x86_64"),
            Self::Arm | Self::ArmNT => Some("arm"),
            Self::Arm64 => Some("arm64"),
            Self::Unknown | Self::Other(_) => None,
        }
    }
}

/// The DOS header fields the loader needs
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,  // Magic number (MZ)
    pub e_lfanew: u32, // File address of PE header
}

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    /// Directories with a zero RVA or size are absent
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }
}

/// Optional header, normalized over PE32 and PE32+
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_image: u32,
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }

    pub fn bits(&self) -> u32 {
        if self.is_64bit() {
            64
        } else {
            32
        }
    }
}

/// NT headers (PE signature + COFF + Optional)
#[derive(Debug, Clone)]
pub struct NtHeaders {
    pub file_header: CoffHeader,
    pub optional_header: OptionalHeader,
    pub data_directories: Vec<DataDirectory>,
}

impl NtHeaders {
    /// Directory entry by index; missing entries read as absent
    pub fn data_directory(&self, index: usize) -> DataDirectory {
        self.data_directories
            .get(index)
            .copied()
            .unwrap_or_default()
    }
}

/// Section header
#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).to_string()
    }

    /// Size of the address range the section occupies once mapped
    pub fn mapped_size(&self) -> u32 {
        self.virtual_size.max(self.size_of_raw_data)
    }

    pub fn segment_flags(&self) -> SegmentFlags {
        let c = self.characteristics;
        let mut flags = SegmentFlags::empty();
        if c & (IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE) != 0 {
            flags |= SegmentFlags::CODE;
        }
        if c & IMAGE_SCN_CNT_INITIALIZED_DATA != 0 {
            flags |= SegmentFlags::DATA;
        }
        if c & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0 {
            flags |= SegmentFlags::BSS;
        }
        if c & IMAGE_SCN_MEM_READ != 0 {
            flags |= SegmentFlags::READ;
        }
        if c & IMAGE_SCN_MEM_WRITE != 0 {
            flags |= SegmentFlags::WRITE;
        }
        flags
    }
}

/// Image variant hint consumed by analyzers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeVariant {
    #[default]
    Generic,
    /// Imports the Visual Basic runtime (msvbvm*.dll)
    VisualBasic,
}
