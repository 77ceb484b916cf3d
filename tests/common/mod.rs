//! Common test utilities: an in-memory PE image builder.
//!
//! Every image has the same layout:
//!
//! | section | RVA    | file offset | size  |
//! |---------|--------|-------------|-------|
//! | .text   | 0x1000 | 0x400       | 0x200 |
//! | .rdata  | 0x2000 | 0x600       | 0x800 |
//! | .data   | 0x3000 | 0xE00       | 0x200 |
//!
//! Headers live in the first 0x400 bytes and are written by `build()`.

#![allow(dead_code)]

pub const IMAGE_BASE_32: u64 = 0x0040_0000;
pub const IMAGE_BASE_64: u64 = 0x1_4000_0000;

pub const FILE_SIZE: usize = 0x1000;
pub const E_LFANEW: usize = 0x80;

const SCN_CODE: u32 = 0x0000_0020;
const SCN_INITIALIZED_DATA: u32 = 0x0000_0040;
const SCN_EXECUTE: u32 = 0x2000_0000;
const SCN_READ: u32 = 0x4000_0000;
const SCN_WRITE: u32 = 0x8000_0000;

/// (name, rva, file offset, size, characteristics)
pub const SECTIONS: [(&str, u32, u32, u32, u32); 3] = [
    (".text", 0x1000, 0x400, 0x200, SCN_CODE | SCN_EXECUTE | SCN_READ),
    (".rdata", 0x2000, 0x600, 0x800, SCN_INITIALIZED_DATA | SCN_READ),
    (".data", 0x3000, 0xE00, 0x200, SCN_INITIALIZED_DATA | SCN_READ | SCN_WRITE),
];

/// Builds small but well-formed PE32 / PE32+ images
#[derive(Debug, Clone)]
pub struct PeBuilder {
    pub bits: u32,
    pub image_base: u64,
    pub machine: u16,
    pub entry: u32,
    pub import_dir: (u32, u32),
    pub export_dir: (u32, u32),
    data: Vec<u8>,
}

impl PeBuilder {
    pub fn pe32() -> Self {
        Self::new(32, IMAGE_BASE_32, 0x014c)
    }

    pub fn pe64() -> Self {
        Self::new(64, IMAGE_BASE_64, 0x8664)
    }

    pub fn new(bits: u32, image_base: u64, machine: u16) -> Self {
        Self {
            bits,
            image_base,
            machine,
            entry: 0x1000,
            import_dir: (0, 0),
            export_dir: (0, 0),
            data: vec![0u8; FILE_SIZE],
        }
    }

    pub fn thunk_width(&self) -> u32 {
        self.bits / 8
    }

    pub fn ordinal_flag(&self) -> u64 {
        if self.bits == 64 {
            1 << 63
        } else {
            1 << 31
        }
    }

    /// File offset backing an RVA
    pub fn file_offset(rva: u32) -> usize {
        SECTIONS
            .iter()
            .find(|(_, va, _, size, _)| rva >= *va && rva < va + size)
            .map(|(_, va, raw, _, _)| (raw + (rva - va)) as usize)
            .unwrap_or_else(|| panic!("RVA {:#x} is not inside a test section", rva))
    }

    pub fn put_bytes(&mut self, rva: u32, bytes: &[u8]) -> &mut Self {
        let at = Self::file_offset(rva);
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn put_u16(&mut self, rva: u32, v: u16) -> &mut Self {
        self.put_bytes(rva, &v.to_le_bytes())
    }

    pub fn put_u32(&mut self, rva: u32, v: u32) -> &mut Self {
        self.put_bytes(rva, &v.to_le_bytes())
    }

    /// Write a NUL-terminated string
    pub fn put_str(&mut self, rva: u32, s: &str) -> &mut Self {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.put_bytes(rva, &bytes)
    }

    /// Write a thunk of the image's width
    pub fn put_thunk(&mut self, rva: u32, v: u64) -> &mut Self {
        if self.bits == 64 {
            self.put_bytes(rva, &v.to_le_bytes())
        } else {
            self.put_bytes(rva, &(v as u32).to_le_bytes())
        }
    }

    /// Write a zero-terminated thunk array
    pub fn put_thunks(&mut self, rva: u32, values: &[u64]) -> &mut Self {
        let w = self.thunk_width();
        for (i, v) in values.iter().enumerate() {
            self.put_thunk(rva + i as u32 * w, *v);
        }
        self.put_thunk(rva + values.len() as u32 * w, 0)
    }

    /// Write a hint/name record
    pub fn put_hint_name(&mut self, rva: u32, hint: u16, name: &str) -> &mut Self {
        self.put_u16(rva, hint).put_str(rva + 2, name)
    }

    /// Write one import descriptor
    pub fn put_descriptor(&mut self, rva: u32, oft: u32, name: u32, ft: u32) -> &mut Self {
        self.put_u32(rva, oft).put_u32(rva + 12, name).put_u32(rva + 16, ft)
    }

    pub fn code(&mut self, rva: u32, bytes: &[u8]) -> &mut Self {
        self.put_bytes(rva, bytes)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        let opt_size: u16 = if self.bits == 64 { 0xF0 } else { 0xE0 };

        // DOS header
        data[0..2].copy_from_slice(b"MZ");
        data[60..64].copy_from_slice(&(E_LFANEW as u32).to_le_bytes());

        // PE signature + COFF header
        let coff = E_LFANEW + 4;
        data[E_LFANEW..coff].copy_from_slice(b"PE\0\0");
        data[coff..coff + 2].copy_from_slice(&self.machine.to_le_bytes());
        data[coff + 2..coff + 4].copy_from_slice(&(SECTIONS.len() as u16).to_le_bytes());
        data[coff + 16..coff + 18].copy_from_slice(&opt_size.to_le_bytes());
        data[coff + 18..coff + 20].copy_from_slice(&0x0102u16.to_le_bytes());

        // Optional header
        let opt = coff + 20;
        let w32 = |data: &mut Vec<u8>, at: usize, v: u32| {
            data[opt + at..opt + at + 4].copy_from_slice(&v.to_le_bytes())
        };
        let (magic, dirs_at): (u16, usize) = if self.bits == 64 { (0x20B, 112) } else { (0x10B, 96) };
        data[opt..opt + 2].copy_from_slice(&magic.to_le_bytes());
        w32(&mut data, 16, self.entry);
        if self.bits == 64 {
            data[opt + 24..opt + 32].copy_from_slice(&self.image_base.to_le_bytes());
        } else {
            w32(&mut data, 28, self.image_base as u32);
        }
        w32(&mut data, 32, 0x1000);
        w32(&mut data, 36, 0x200);
        w32(&mut data, 56, 0x4000);
        w32(&mut data, dirs_at - 4, 16);
        w32(&mut data, dirs_at, self.export_dir.0);
        w32(&mut data, dirs_at + 4, self.export_dir.1);
        w32(&mut data, dirs_at + 8, self.import_dir.0);
        w32(&mut data, dirs_at + 12, self.import_dir.1);

        // Section table
        let mut at = opt + opt_size as usize;
        for (name, va, raw, size, characteristics) in SECTIONS {
            data[at..at + name.len()].copy_from_slice(name.as_bytes());
            data[at + 8..at + 12].copy_from_slice(&size.to_le_bytes());
            data[at + 12..at + 16].copy_from_slice(&va.to_le_bytes());
            data[at + 16..at + 20].copy_from_slice(&size.to_le_bytes());
            data[at + 20..at + 24].copy_from_slice(&raw.to_le_bytes());
            data[at + 36..at + 40].copy_from_slice(&characteristics.to_le_bytes());
            at += 40;
        }

        data
    }
}

/// Import layout shared by the import tests.
///
/// - KERNEL32.dll: OFT 0x2100 names two functions, FT 0x3000 holds three
///   different (bound) values
/// - WS2_32.dll: no OFT, FT 0x3080 holds ordinals 23 and 0x9999
pub fn with_standard_imports(mut builder: PeBuilder) -> PeBuilder {
    let flag = builder.ordinal_flag();

    builder
        .put_descriptor(0x2000, 0x2100, 0x2300, 0x3000)
        .put_descriptor(0x2014, 0, 0x2320, 0x3080)
        .put_str(0x2300, "KERNEL32.dll")
        .put_str(0x2320, "WS2_32.dll")
        .put_hint_name(0x2400, 0x80, "CreateFileA")
        .put_hint_name(0x2420, 0x120, "ExitProcess")
        .put_thunks(0x2100, &[0x2400, 0x2420])
        .put_thunks(0x3000, &[0x7FF0_1000, 0x7FF0_2000, 0x7FF0_3000])
        .put_thunks(0x3080, &[flag | 23, flag | 0x9999]);

    builder.import_dir = (0x2000, 0x3C);
    builder
}

/// Export layout: "sample.dll", base 1, function 0 unnamed at 0x1000,
/// function 1 "Start" at 0x1020, function 2 empty
pub fn with_standard_exports(mut builder: PeBuilder) -> PeBuilder {
    builder
        .put_u32(0x2600 + 12, 0x2680)
        .put_u32(0x2600 + 16, 1)
        .put_u32(0x2600 + 20, 3)
        .put_u32(0x2600 + 24, 1)
        .put_u32(0x2600 + 28, 0x2640)
        .put_u32(0x2600 + 32, 0x2650)
        .put_u32(0x2600 + 36, 0x2660)
        .put_u32(0x2640, 0x1000)
        .put_u32(0x2644, 0x1020)
        .put_u32(0x2648, 0)
        .put_u32(0x2650, 0x2690)
        .put_u16(0x2660, 1)
        .put_str(0x2680, "sample.dll")
        .put_str(0x2690, "Start");

    builder.export_dir = (0x2600, 0x100);
    builder
}
