use crate::layout::{align_up, SectionRvas};

pub struct SectionBody<'a> {
    pub name: &'static str,
    pub rva: u32,
    pub bytes: &'a [u8],
    pub characteristics: u32,
}

const CHAR_TEXT: u32 = 0x6000_0020;
const CHAR_DATA: u32 = 0xC000_0040;
const CHAR_RDATA: u32 = 0x4000_0040;
const CHAR_IDATA: u32 = 0xC000_0040;
const CHAR_EDATA: u32 = 0x4000_0040;

#[allow(clippy::too_many_arguments)]
pub struct PeImage<'a> {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub is_dll: bool,
    pub entry_rva: u32,
    pub rvas: SectionRvas,
    pub code: &'a [u8],
    pub data: &'a [u8],
    pub rodata: &'a [u8],
    pub edata: Option<&'a [u8]>,
    pub idata: &'a [u8],
    pub import_directory_rva: u32,
    pub import_directory_size: u32,
    pub export_directory_rva: u32,
    pub export_directory_size: u32,
}

/// Writes the full DOS+PE+COFF+optional header, section headers and
/// section bodies described in the emit phase. Only the import directory
/// (always) and export directory (DLLs only) are populated in the 16 data
/// directory entries; every other entry stays zero.
pub fn emit(image: &PeImage) -> Vec<u8> {
    let mut sections = vec![
        SectionBody { name: ".text", rva: image.rvas.code_rva, bytes: image.code, characteristics: CHAR_TEXT },
        SectionBody { name: ".data", rva: image.rvas.data_rva, bytes: image.data, characteristics: CHAR_DATA },
        SectionBody { name: ".rdata", rva: image.rvas.rodata_rva, bytes: image.rodata, characteristics: CHAR_RDATA },
    ];
    if let Some(edata) = image.edata {
        sections.push(SectionBody { name: ".edata", rva: image.rvas.edata_rva, bytes: edata, characteristics: CHAR_EDATA });
    }
    sections.push(SectionBody { name: ".idata", rva: image.rvas.idata_rva, bytes: image.idata, characteristics: CHAR_IDATA });

    let section_count = sections.len() as u16;
    let dos_stub_size: u32 = 0x80;
    let optional_header_size: u32 = 240;
    let headers_size = dos_stub_size + 4 + 20 + optional_header_size + section_count as u32 * 40;
    let headers_raw_size = align_up(headers_size, image.file_alignment);

    let mut file_offsets = Vec::with_capacity(sections.len());
    let mut cursor = headers_raw_size;
    let mut raw_sizes = Vec::with_capacity(sections.len());
    for section in &sections {
        file_offsets.push(cursor);
        let raw = align_up(section.bytes.len() as u32, image.file_alignment);
        raw_sizes.push(raw);
        cursor += raw;
    }

    let size_of_image = align_up(
        sections.last().map(|s| s.rva + s.bytes.len() as u32).unwrap_or(image.rvas.idata_rva),
        image.section_alignment,
    );

    let mut out = Vec::with_capacity(cursor as usize);

    // DOS stub: MZ magic, e_lfanew pointing at the PE signature.
    let mut dos = vec![0u8; dos_stub_size as usize];
    dos[0] = b'M';
    dos[1] = b'Z';
    dos[0x3C..0x40].copy_from_slice(&dos_stub_size.to_le_bytes());
    out.extend_from_slice(&dos);

    out.extend_from_slice(b"PE\0\0");

    let mut coff = vec![0u8; 20];
    coff[0..2].copy_from_slice(&0x8664u16.to_le_bytes());
    coff[2..4].copy_from_slice(&section_count.to_le_bytes());
    coff[16..18].copy_from_slice(&(optional_header_size as u16).to_le_bytes());
    let mut characteristics: u16 = 0x0002 | 0x0020; // EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE
    if image.is_dll {
        characteristics |= 0x2000; // IMAGE_FILE_DLL
    }
    coff[18..20].copy_from_slice(&characteristics.to_le_bytes());
    out.extend_from_slice(&coff);

    let mut opt = vec![0u8; optional_header_size as usize];
    opt[0..2].copy_from_slice(&0x020Bu16.to_le_bytes());
    opt[2] = 14;
    let size_of_code: u32 = raw_sizes[0];
    let size_of_initialized_data: u32 = raw_sizes[1..].iter().sum();
    opt[4..8].copy_from_slice(&size_of_code.to_le_bytes());
    opt[8..12].copy_from_slice(&size_of_initialized_data.to_le_bytes());
    opt[16..20].copy_from_slice(&image.entry_rva.to_le_bytes());
    opt[20..24].copy_from_slice(&image.rvas.code_rva.to_le_bytes());
    opt[24..32].copy_from_slice(&image.image_base.to_le_bytes());
    opt[32..36].copy_from_slice(&image.section_alignment.to_le_bytes());
    opt[36..40].copy_from_slice(&image.file_alignment.to_le_bytes());
    opt[40] = 6;
    opt[48] = 6;
    opt[56..60].copy_from_slice(&size_of_image.to_le_bytes());
    opt[60..64].copy_from_slice(&headers_raw_size.to_le_bytes());
    opt[68] = 0x03; // IMAGE_SUBSYSTEM_WINDOWS_CUI
    opt[70..72].copy_from_slice(&0x8160u16.to_le_bytes()); // DllCharacteristics
    opt[72..80].copy_from_slice(&0x10_0000u64.to_le_bytes());
    opt[80..88].copy_from_slice(&0x1000u64.to_le_bytes());
    opt[88..96].copy_from_slice(&0x10_0000u64.to_le_bytes());
    opt[96..104].copy_from_slice(&0x1000u64.to_le_bytes());
    opt[108..112].copy_from_slice(&16u32.to_le_bytes());

    if image.export_directory_size > 0 {
        opt[112..116].copy_from_slice(&image.export_directory_rva.to_le_bytes());
        opt[116..120].copy_from_slice(&image.export_directory_size.to_le_bytes());
    }
    opt[120..124].copy_from_slice(&image.import_directory_rva.to_le_bytes());
    opt[124..128].copy_from_slice(&image.import_directory_size.to_le_bytes());
    out.extend_from_slice(&opt);

    for (i, section) in sections.iter().enumerate() {
        let mut header = vec![0u8; 40];
        let name_bytes = section.name.as_bytes();
        header[..name_bytes.len()].copy_from_slice(name_bytes);
        header[8..12].copy_from_slice(&(section.bytes.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&section.rva.to_le_bytes());
        header[16..20].copy_from_slice(&raw_sizes[i].to_le_bytes());
        header[20..24].copy_from_slice(&file_offsets[i].to_le_bytes());
        header[36..40].copy_from_slice(&section.characteristics.to_le_bytes());
        out.extend_from_slice(&header);
    }

    out.resize(headers_raw_size as usize, 0);

    for (i, section) in sections.iter().enumerate() {
        debug_assert_eq!(out.len() as u32, file_offsets[i]);
        out.extend_from_slice(section.bytes);
        out.resize(file_offsets[i] as usize + raw_sizes[i] as usize, 0);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rvas() -> SectionRvas {
        SectionRvas { code_rva: 0x1000, data_rva: 0x2000, rodata_rva: 0x3000, edata_rva: 0, idata_rva: 0x4000 }
    }

    #[test]
    fn pe_signature_lands_at_0x80() {
        let image = PeImage {
            image_base: 0x1_4000_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            is_dll: false,
            entry_rva: 0x1000,
            rvas: sample_rvas(),
            code: &[0x90; 4],
            data: &[],
            rodata: &[],
            edata: None,
            idata: &[0u8; 64],
            import_directory_rva: 0x4000,
            import_directory_size: 40,
            export_directory_rva: 0,
            export_directory_size: 0,
        };
        let bytes = emit(&image);
        assert_eq!(&bytes[0x80..0x84], b"PE\0\0");
    }

    #[test]
    fn section_file_offsets_are_file_aligned_and_increasing() {
        let image = PeImage {
            image_base: 0x1_4000_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            is_dll: false,
            entry_rva: 0x1000,
            rvas: sample_rvas(),
            code: &[0x90; 300],
            data: &[1; 50],
            rodata: &[2; 10],
            edata: None,
            idata: &[0u8; 64],
            import_directory_rva: 0x4000,
            import_directory_size: 40,
            export_directory_rva: 0,
            export_directory_size: 0,
        };
        let bytes = emit(&image);
        // 4 sections: text/data/rdata/idata, coff header numberOfSections at 0x84+2
        let n = u16::from_le_bytes(bytes[0x84 + 2..0x84 + 4].try_into().unwrap());
        assert_eq!(n, 4);

        for sec_idx in 0..n as usize {
            let hdr_off = 0x80 + 4 + 20 + 240 + sec_idx * 40;
            let file_off = u32::from_le_bytes(bytes[hdr_off + 20..hdr_off + 24].try_into().unwrap());
            assert_eq!(file_off % 0x200, 0);
        }
    }
}
