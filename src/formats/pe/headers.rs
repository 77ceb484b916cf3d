//! PE header parsing

use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

fn truncated(expected: usize, actual: usize) -> PeError {
    PeError::TruncatedHeader { expected, actual }
}

/// Parse DOS header from data
pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    if data.len() < DOS_HEADER_SIZE {
        return Err(truncated(DOS_HEADER_SIZE, data.len()));
    }

    let e_magic = data
        .read_u16_le_at(0)
        .ok_or_else(|| truncated(2, data.len()))?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::InvalidDosSignature);
    }

    let e_lfanew = data
        .read_u32_le_at(60)
        .ok_or_else(|| truncated(DOS_HEADER_SIZE, data.len()))?;

    Ok(DosHeader { e_magic, e_lfanew })
}

/// Parse COFF header from data at offset
pub fn parse_coff_header(data: &[u8], offset: usize) -> Result<CoffHeader> {
    let end = offset + COFF_HEADER_SIZE;
    let read16 = |at: usize| data.read_u16_le_at(offset + at).ok_or_else(|| truncated(end, data.len()));
    let read32 = |at: usize| data.read_u32_le_at(offset + at).ok_or_else(|| truncated(end, data.len()));

    Ok(CoffHeader {
        machine: Machine::from(read16(0)?),
        number_of_sections: read16(2)?,
        time_date_stamp: read32(4)?,
        size_of_optional_header: read16(16)?,
        characteristics: read16(18)?,
    })
}

/// Parse the optional header and its data directories.
///
/// PE32 and PE32+ differ only in the width of the image base and in where the
/// data directory array starts, so both are read by the same routine.
pub fn parse_optional_header(
    data: &[u8],
    offset: usize,
    size: u16,
) -> Result<(OptionalHeader, Vec<DataDirectory>)> {
    let size = size as usize;
    let end = offset + size;
    if size < 2 || end > data.len() {
        return Err(truncated(end.max(offset + 2), data.len()));
    }

    let magic = data
        .read_u16_le_at(offset)
        .ok_or_else(|| truncated(offset + 2, data.len()))?;

    // Offset of the first data directory relative to the optional header
    let directories_at = match magic {
        PE32_MAGIC => 96,
        PE32PLUS_MAGIC => 112,
        _ => return Err(PeError::InvalidMagic(magic)),
    };
    if size < directories_at {
        return Err(truncated(offset + directories_at, end));
    }

    // Reads stay inside the declared optional header
    let header = &data[offset..end];
    let read32 = |at: usize| header.read_u32_le_at(at).ok_or_else(|| truncated(offset + at + 4, end));

    let image_base = if magic == PE32PLUS_MAGIC {
        header
            .read_u64_le_at(24)
            .ok_or_else(|| truncated(offset + 32, end))?
    } else {
        read32(28)? as u64
    };

    let optional_header = OptionalHeader {
        magic,
        address_of_entry_point: read32(16)?,
        image_base,
        section_alignment: read32(32)?,
        file_alignment: read32(36)?,
        size_of_image: read32(56)?,
        number_of_rva_and_sizes: read32(directories_at - 4)?,
    };

    let directories = parse_data_directories(
        header,
        directories_at,
        optional_header.number_of_rva_and_sizes,
    );

    Ok((optional_header, directories))
}

/// Parse data directories from the optional header bytes.
///
/// Entries that the header declares but does not hold read as absent; the
/// array is always padded to 16 entries.
pub fn parse_data_directories(header: &[u8], offset: usize, count: u32) -> Vec<DataDirectory> {
    let count = (count as usize).min(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);
    let mut directories = Vec::with_capacity(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);

    for i in 0..count {
        let dir_offset = offset + i * 8;
        match (
            header.read_u32_le_at(dir_offset),
            header.read_u32_le_at(dir_offset + 4),
        ) {
            (Some(virtual_address), Some(size)) => directories.push(DataDirectory {
                virtual_address,
                size,
            }),
            _ => break,
        }
    }

    directories.resize(IMAGE_NUMBEROF_DIRECTORY_ENTRIES, DataDirectory::default());
    directories
}

/// Parse NT headers (PE signature + COFF + Optional)
pub fn parse_nt_headers(data: &[u8], offset: usize) -> Result<NtHeaders> {
    let signature = data
        .get(offset..offset + 4)
        .ok_or_else(|| truncated(offset + 4, data.len()))?;

    if signature != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }

    let file_header = parse_coff_header(data, offset + 4)?;
    match file_header.machine {
        Machine::I386 | Machine::X86_64 | Machine::Arm | Machine::ArmNT | Machine::Arm64 => {}
        other => return Err(PeError::InvalidMachine(other.raw())),
    }

    let opt_offset = offset + 4 + COFF_HEADER_SIZE;
    let (optional_header, data_directories) =
        parse_optional_header(data, opt_offset, file_header.size_of_optional_header)?;

    Ok(NtHeaders {
        file_header,
        optional_header,
        data_directories,
    })
}

/// File offset of the section table
pub fn section_table_offset(dos_header: &DosHeader, nt_headers: &NtHeaders) -> usize {
    dos_header.e_lfanew as usize
        + 4
        + COFF_HEADER_SIZE
        + nt_headers.file_header.size_of_optional_header as usize
}
