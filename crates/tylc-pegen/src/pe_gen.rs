//! Single translation-unit PE emitter used directly by the code generator,
//! independent of the multi-object linker. The code generator bakes
//! placeholder RVAs into its instruction stream before the real section
//! layout is known; this module patches those placeholders once layout is
//! fixed and writes out a minimal EXE.

use std::path::Path;

use crate::error::PeGenError;

pub const DATA_RVA_PLACEHOLDER: u32 = 0x100000;
pub const IDATA_RVA_PLACEHOLDER: u32 = 0x200000;

const CODE_RVA: u32 = 0x1000;
const SECTION_ALIGN: u32 = 0x1000;
const FILE_ALIGN: u32 = 0x200;
const IMAGE_BASE_DEFAULT: u64 = 0x1_4000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupKind {
    Data,
    Idata,
}

#[derive(Debug, Clone, Copy)]
pub struct CodeFixup {
    pub offset: u32,
    pub kind: FixupKind,
}

#[derive(Debug, Clone, Copy)]
pub struct VtableFixup {
    pub data_offset: u32,
    pub label_offset: u32,
}

fn align_up(v: u32, align: u32) -> u32 {
    (v + align - 1) / align * align
}

#[derive(Debug, Clone, Default)]
pub struct PeGenerator {
    code: Vec<u8>,
    data: Vec<u8>,
    imports: Vec<(String, String)>,
    code_fixups: Vec<CodeFixup>,
    vtable_fixups: Vec<VtableFixup>,
}

impl PeGenerator {
    pub fn new() -> Self {
        PeGenerator::default()
    }

    pub fn add_code(&mut self, bytes: &[u8]) -> u32 {
        let off = self.code.len() as u32;
        self.code.extend_from_slice(bytes);
        off
    }

    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let off = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        off
    }

    /// Registers `(dll, function)`, deduplicating exact repeats while
    /// preserving first-seen DLL and function order.
    pub fn add_import(&mut self, dll: impl Into<String>, function: impl Into<String>) {
        let dll = dll.into();
        let function = function.into();
        if !self.imports.iter().any(|(d, f)| *d == dll && *f == function) {
            self.imports.push((dll, function));
        }
    }

    pub fn record_data_fixup(&mut self, code_offset: u32) {
        self.code_fixups.push(CodeFixup { offset: code_offset, kind: FixupKind::Data });
    }

    pub fn record_idata_fixup(&mut self, code_offset: u32) {
        self.code_fixups.push(CodeFixup { offset: code_offset, kind: FixupKind::Idata });
    }

    pub fn record_vtable_fixup(&mut self, data_offset: u32, label_offset: u32) {
        self.vtable_fixups.push(VtableFixup { data_offset, label_offset });
    }

    pub fn generate(&self, output_path: impl AsRef<Path>, image_base: Option<u64>) -> Result<(), PeGenError> {
        let bytes = self.build(image_base.unwrap_or(IMAGE_BASE_DEFAULT))?;
        let path = output_path.as_ref();
        std::fs::write(path, bytes).map_err(|source| PeGenError::Write { path: path.to_path_buf(), source })
    }

    fn build(&self, image_base: u64) -> Result<Vec<u8>, PeGenError> {
        let code_raw_size = align_up(self.code.len() as u32, FILE_ALIGN);
        let data_rva = align_up(CODE_RVA + self.code.len() as u32, SECTION_ALIGN);

        let idata = self.build_import_table()?;
        let idata_rva = align_up(data_rva + self.data.len() as u32, SECTION_ALIGN);

        let mut code = self.code.clone();
        for fixup in &self.code_fixups {
            let off = fixup.offset as usize;
            if off + 4 > code.len() {
                return Err(PeGenError::OffsetOutOfRange { offset: fixup.offset });
            }
            let (actual, placeholder) = match fixup.kind {
                FixupKind::Data => (data_rva, DATA_RVA_PLACEHOLDER),
                FixupKind::Idata => (idata_rva, IDATA_RVA_PLACEHOLDER),
            };
            let old = u32::from_le_bytes(code[off..off + 4].try_into().unwrap());
            let patched = (old as i64 + actual as i64 - placeholder as i64) as u32;
            code[off..off + 4].copy_from_slice(&patched.to_le_bytes());
        }

        let mut data = self.data.clone();
        for fixup in &self.vtable_fixups {
            let off = fixup.data_offset as usize;
            if off + 8 > data.len() {
                return Err(PeGenError::VtableOffsetOutOfRange { offset: fixup.data_offset });
            }
            let addr = image_base + CODE_RVA as u64 + fixup.label_offset as u64;
            data[off..off + 8].copy_from_slice(&addr.to_le_bytes());
        }

        let code_virtual_size = code.len() as u32;
        let data_virtual_size = data.len() as u32;
        let data_raw_size = align_up(data.len() as u32, FILE_ALIGN);
        let idata_virtual_size = idata.bytes.len() as u32;
        let idata_raw_size = align_up(idata.bytes.len() as u32, FILE_ALIGN);

        let headers_size: u32 = 64 + 4 + 20 + 240 + 40 * 3;
        let headers_raw_size = align_up(headers_size, FILE_ALIGN);

        let text_ptr = headers_raw_size;
        let data_ptr = text_ptr + code_raw_size;
        let idata_ptr = data_ptr + data_raw_size;

        let size_of_image = align_up(idata_rva + idata_virtual_size, SECTION_ALIGN);

        let mut out = Vec::with_capacity((idata_ptr + idata_raw_size) as usize);

        // DOS header
        let mut dos = vec![0u8; 64];
        dos[0] = b'M';
        dos[1] = b'Z';
        dos[0x3C..0x40].copy_from_slice(&64u32.to_le_bytes());
        out.extend_from_slice(&dos);

        out.extend_from_slice(b"PE\0\0");

        // COFF header
        let mut coff = vec![0u8; 20];
        coff[0..2].copy_from_slice(&0x8664u16.to_le_bytes());
        coff[2..4].copy_from_slice(&3u16.to_le_bytes()); // .text, .data, .idata
        coff[16..18].copy_from_slice(&0xF0u16.to_le_bytes()); // SizeOfOptionalHeader
        coff[18..20].copy_from_slice(&0x0022u16.to_le_bytes()); // EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE
        out.extend_from_slice(&coff);

        // Optional header (PE32+)
        let mut opt = vec![0u8; 240];
        opt[0..2].copy_from_slice(&0x020Bu16.to_le_bytes());
        opt[2] = 14;
        opt[4..8].copy_from_slice(&code_raw_size.to_le_bytes());
        opt[8..12].copy_from_slice(&(data_raw_size + idata_raw_size).to_le_bytes());
        opt[16..20].copy_from_slice(&CODE_RVA.to_le_bytes()); // AddressOfEntryPoint
        opt[20..24].copy_from_slice(&CODE_RVA.to_le_bytes()); // BaseOfCode
        opt[24..32].copy_from_slice(&image_base.to_le_bytes());
        opt[32..36].copy_from_slice(&SECTION_ALIGN.to_le_bytes());
        opt[36..40].copy_from_slice(&FILE_ALIGN.to_le_bytes());
        opt[40] = 6; // MajorOSVersion
        opt[48] = 6; // MajorSubsystemVersion
        opt[56..60].copy_from_slice(&size_of_image.to_le_bytes());
        opt[60..64].copy_from_slice(&headers_raw_size.to_le_bytes());
        opt[68] = 0x03; // IMAGE_SUBSYSTEM_WINDOWS_CUI
        opt[70..72].copy_from_slice(&0x8160u16.to_le_bytes()); // DllCharacteristics
        opt[72..80].copy_from_slice(&0x10_0000u64.to_le_bytes()); // SizeOfStackReserve
        opt[80..88].copy_from_slice(&0x1000u64.to_le_bytes()); // SizeOfStackCommit
        opt[88..96].copy_from_slice(&0x10_0000u64.to_le_bytes()); // SizeOfHeapReserve
        opt[96..104].copy_from_slice(&0x1000u64.to_le_bytes()); // SizeOfHeapCommit
        opt[108..112].copy_from_slice(&16u32.to_le_bytes()); // NumberOfRvaAndSizes

        // Data directory[1]: import table
        opt[120..124].copy_from_slice(&(idata_rva + idata.idt_offset).to_le_bytes());
        opt[124..128].copy_from_slice(&idata.idt_size.to_le_bytes());
        out.extend_from_slice(&opt);

        let mut sec_text = vec![0u8; 40];
        sec_text[0..5].copy_from_slice(b".text");
        sec_text[8..12].copy_from_slice(&code_virtual_size.to_le_bytes());
        sec_text[12..16].copy_from_slice(&CODE_RVA.to_le_bytes());
        sec_text[16..20].copy_from_slice(&code_raw_size.to_le_bytes());
        sec_text[20..24].copy_from_slice(&text_ptr.to_le_bytes());
        sec_text[36..40].copy_from_slice(&0x6000_0020u32.to_le_bytes());
        out.extend_from_slice(&sec_text);

        let mut sec_data = vec![0u8; 40];
        sec_data[0..5].copy_from_slice(b".data");
        sec_data[8..12].copy_from_slice(&data_virtual_size.to_le_bytes());
        sec_data[12..16].copy_from_slice(&data_rva.to_le_bytes());
        sec_data[16..20].copy_from_slice(&data_raw_size.to_le_bytes());
        sec_data[20..24].copy_from_slice(&data_ptr.to_le_bytes());
        sec_data[36..40].copy_from_slice(&0xC000_0040u32.to_le_bytes());
        out.extend_from_slice(&sec_data);

        let mut sec_idata = vec![0u8; 40];
        sec_idata[0..6].copy_from_slice(b".idata");
        sec_idata[8..12].copy_from_slice(&idata_virtual_size.to_le_bytes());
        sec_idata[12..16].copy_from_slice(&idata_rva.to_le_bytes());
        sec_idata[16..20].copy_from_slice(&idata_raw_size.to_le_bytes());
        sec_idata[20..24].copy_from_slice(&idata_ptr.to_le_bytes());
        sec_idata[36..40].copy_from_slice(&0xC000_0040u32.to_le_bytes());
        out.extend_from_slice(&sec_idata);

        out.resize(headers_raw_size as usize, 0);

        out.extend_from_slice(&code);
        out.resize(text_ptr as usize + code_raw_size as usize, 0);

        out.extend_from_slice(&data);
        out.resize(data_ptr as usize + data_raw_size as usize, 0);

        out.extend_from_slice(&idata.bytes);
        out.resize(idata_ptr as usize + idata_raw_size as usize, 0);

        Ok(out)
    }

    /// Lays out the IDT/ILT/IAT/strings region. DLLs and, within each DLL,
    /// functions keep first-seen order (`add_import` dedups exact repeats).
    fn build_import_table(&self) -> Result<ImportTable, PeGenError> {
        let mut dlls: Vec<(&str, Vec<&str>)> = Vec::new();
        for (dll, func) in &self.imports {
            if let Some((_, funcs)) = dlls.iter_mut().find(|(d, _)| d == dll) {
                funcs.push(func);
            } else {
                dlls.push((dll, vec![func]));
            }
        }

        let idt_offset = 0u32;
        let idt_size = (dlls.len() as u32 + 1) * 20;
        let ilt_offset = idt_offset + idt_size;
        let ilt_total: u32 = dlls.iter().map(|(_, fs)| (fs.len() as u32 + 1) * 8).sum();
        let iat_offset = ilt_offset + ilt_total;
        let iat_total = ilt_total;
        let hintname_offset = iat_offset + iat_total;

        let mut hintname = Vec::new();
        let mut hintname_rvas: Vec<u32> = Vec::new();
        for (_, funcs) in &dlls {
            for func in funcs {
                hintname_rvas.push(hintname_offset + hintname.len() as u32);
                hintname.extend_from_slice(&0u16.to_le_bytes());
                hintname.extend_from_slice(func.as_bytes());
                hintname.push(0);
                if hintname.len() % 2 == 1 {
                    hintname.push(0);
                }
            }
        }

        let dllnames_offset = hintname_offset + hintname.len() as u32;
        let mut dllnames = Vec::new();
        let mut dllname_rvas: Vec<u32> = Vec::new();
        for (dll, _) in &dlls {
            dllname_rvas.push(dllnames_offset + dllnames.len() as u32);
            dllnames.extend_from_slice(dll.as_bytes());
            dllnames.push(0);
            if dllnames.len() % 2 == 1 {
                dllnames.push(0);
            }
        }

        let total_size = dllnames_offset + dllnames.len() as u32;
        let mut bytes = vec![0u8; total_size as usize];

        let mut func_idx = 0usize;
        let mut ilt_cursor = ilt_offset;
        let mut iat_cursor = iat_offset;
        for (i, (_, funcs)) in dlls.iter().enumerate() {
            let idt_entry = (idt_offset + i as u32 * 20) as usize;
            bytes[idt_entry..idt_entry + 4].copy_from_slice(&ilt_cursor.to_le_bytes());
            bytes[idt_entry + 12..idt_entry + 16].copy_from_slice(&dllname_rvas[i].to_le_bytes());
            bytes[idt_entry + 16..idt_entry + 20].copy_from_slice(&iat_cursor.to_le_bytes());

            for _ in funcs {
                let hn_rva = hintname_rvas[func_idx] as u64;
                let ilt_pos = ilt_cursor as usize;
                bytes[ilt_pos..ilt_pos + 8].copy_from_slice(&hn_rva.to_le_bytes());
                ilt_cursor += 8;
                let iat_pos = iat_cursor as usize;
                bytes[iat_pos..iat_pos + 8].copy_from_slice(&hn_rva.to_le_bytes());
                iat_cursor += 8;
                func_idx += 1;
            }
            ilt_cursor += 8; // null terminator for this DLL's ILT group
            iat_cursor += 8; // null terminator for this DLL's IAT group
        }

        bytes[hintname_offset as usize..hintname_offset as usize + hintname.len()].copy_from_slice(&hintname);
        bytes[dllnames_offset as usize..dllnames_offset as usize + dllnames.len()].copy_from_slice(&dllnames);

        Ok(ImportTable { bytes, idt_offset, idt_size })
    }
}

struct ImportTable {
    bytes: Vec<u8>,
    idt_offset: u32,
    idt_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_import_layout_matches_fixed_offsets() {
        let mut gen = PeGenerator::new();
        gen.add_import("kernel32.dll", "ExitProcess");
        let table = gen.build_import_table().unwrap();
        assert_eq!(table.idt_offset, 0);
        assert_eq!(table.idt_size, 40); // one entry + terminator
    }

    #[test]
    fn data_fixup_shifts_by_actual_minus_placeholder() {
        let mut gen = PeGenerator::new();
        let off = gen.add_code(&DATA_RVA_PLACEHOLDER.to_le_bytes());
        gen.record_data_fixup(off);
        gen.add_data(&[0u8; 16]);
        let bytes = gen.build(IMAGE_BASE_DEFAULT).unwrap();
        let data_rva = align_up(CODE_RVA + gen.code.len() as u32, SECTION_ALIGN);
        let headers_raw_size = align_up(64 + 4 + 20 + 240 + 40 * 3, FILE_ALIGN);
        let patched = u32::from_le_bytes(bytes[headers_raw_size as usize..headers_raw_size as usize + 4].try_into().unwrap());
        assert_eq!(patched, data_rva);
    }

    #[test]
    fn vtable_fixup_writes_absolute_address() {
        let mut gen = PeGenerator::new();
        gen.add_code(&[0x90; 4]);
        let off = gen.add_data(&[0u8; 8]);
        gen.record_vtable_fixup(off, 2);
        let bytes = gen.build(IMAGE_BASE_DEFAULT).unwrap();
        let headers_raw_size = align_up(64 + 4 + 20 + 240 + 40 * 3, FILE_ALIGN);
        let code_raw_size = align_up(4, FILE_ALIGN);
        let data_ptr = headers_raw_size + code_raw_size;
        let addr = u64::from_le_bytes(bytes[data_ptr as usize..data_ptr as usize + 8].try_into().unwrap());
        assert_eq!(addr, IMAGE_BASE_DEFAULT + CODE_RVA as u64 + 2);
    }
}
