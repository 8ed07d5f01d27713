//! The relocatable object container: three byte sections, a symbol table
//! with a name index, two relocation lists and an import list, all backed
//! by a single deduplicated string table on disk.
//!
//! Format (little-endian throughout):
//!   Header (44 bytes)
//!   code bytes, data bytes, rodata bytes (exactly codeSize/dataSize/rodataSize)
//!   symbol records (20 bytes each)
//!   code-site relocation records (16 bytes each)
//!   data-site relocation records (16 bytes each)
//!   import records (8 bytes each)
//!   string table (stringTableSize bytes)

use std::collections::HashMap;
use std::path::Path;

use crate::error::ObjectError;
use crate::strtab::StringTable;

pub const OBJ_MAGIC: u32 = 0x4F58_4C46;
pub const OBJ_VERSION: u16 = 1;

const HEADER_SIZE: usize = 44;
const SYMBOL_RECORD_SIZE: usize = 20;
const RELOC_RECORD_SIZE: usize = 16;
const IMPORT_RECORD_SIZE: usize = 8;

/// Which of the three byte sections a symbol or relocation belongs to.
pub const SECTION_CODE: u32 = 0;
pub const SECTION_DATA: u32 = 1;
pub const SECTION_RODATA: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolKind {
    Undefined = 0,
    Function = 1,
    Data = 2,
    Const = 3,
    Local = 4,
}

impl SymbolKind {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => SymbolKind::Undefined,
            1 => SymbolKind::Function,
            2 => SymbolKind::Data,
            3 => SymbolKind::Const,
            4 => SymbolKind::Local,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelocType {
    Rel32 = 0,
    Rip32 = 1,
    Abs64 = 2,
    Abs32 = 3,
}

impl RelocType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => RelocType::Rel32,
            1 => RelocType::Rip32,
            2 => RelocType::Abs64,
            3 => RelocType::Abs32,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// SECTION_CODE / SECTION_DATA / SECTION_RODATA. Meaningless when `kind`
    /// is `Undefined`.
    pub section: u32,
    pub offset: u32,
    pub size: u32,
    pub exported: bool,
    pub hidden: bool,
    pub weak: bool,
}

impl Symbol {
    pub fn undefined(name: impl Into<String>) -> Self {
        Symbol {
            name: name.into(),
            kind: SymbolKind::Undefined,
            section: 0,
            offset: 0,
            size: 0,
            exported: false,
            hidden: false,
            weak: false,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.kind != SymbolKind::Undefined
    }

    fn visibility_byte(&self) -> u8 {
        (self.exported as u8) | ((self.hidden as u8) << 1) | ((self.weak as u8) << 2)
    }

    fn from_visibility_byte(b: u8) -> (bool, bool, bool) {
        (b & 0b001 != 0, b & 0b010 != 0, b & 0b100 != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRelocation {
    pub offset: u32,
    pub kind: RelocType,
    pub symbol: String,
    pub addend: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub dll: String,
    pub function: String,
}

/// An alignment used by the data/rodata builders: each append is padded up
/// to this boundary so relocations can never straddle an 8-byte seam.
const APPEND_ALIGN: usize = 8;

fn pad_to(buf: &mut Vec<u8>, align: usize) {
    let rem = buf.len() % align;
    if rem != 0 {
        buf.resize(buf.len() + (align - rem), 0);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectFile {
    pub module_name: String,
    pub code: Vec<u8>,
    pub data: Vec<u8>,
    pub rodata: Vec<u8>,
    pub symbols: Vec<Symbol>,
    symbol_index: HashMap<String, usize>,
    pub code_relocations: Vec<NamedRelocation>,
    pub data_relocations: Vec<NamedRelocation>,
    pub imports: Vec<Import>,
}

impl ObjectFile {
    pub fn new(module_name: impl Into<String>) -> Self {
        ObjectFile { module_name: module_name.into(), ..Default::default() }
    }

    pub fn add_code(&mut self, bytes: &[u8]) -> u32 {
        let off = self.code.len() as u32;
        self.code.extend_from_slice(bytes);
        off
    }

    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let off = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        pad_to(&mut self.data, APPEND_ALIGN);
        off
    }

    pub fn add_rodata(&mut self, bytes: &[u8]) -> u32 {
        let off = self.rodata.len() as u32;
        self.rodata.extend_from_slice(bytes);
        pad_to(&mut self.rodata, APPEND_ALIGN);
        off
    }

    /// Appends a zero-terminated string into `.rodata`, returning its offset.
    pub fn add_string(&mut self, s: &str) -> u32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.add_rodata(&bytes)
    }

    pub fn add_symbol(&mut self, symbol: Symbol) {
        let idx = self.symbols.len();
        self.symbol_index.insert(symbol.name.clone(), idx);
        self.symbols.push(symbol);
    }

    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbol_index.get(name).map(|&i| &self.symbols[i])
    }

    pub fn add_code_relocation(&mut self, offset: u32, kind: RelocType, symbol: impl Into<String>, addend: i32) {
        self.code_relocations.push(NamedRelocation { offset, kind, symbol: symbol.into(), addend });
    }

    pub fn add_data_relocation(&mut self, offset: u32, kind: RelocType, symbol: impl Into<String>, addend: i32) {
        self.data_relocations.push(NamedRelocation { offset, kind, symbol: symbol.into(), addend });
    }

    pub fn add_import(&mut self, dll: impl Into<String>, function: impl Into<String>) {
        self.imports.push(Import { dll: dll.into(), function: function.into() });
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ObjectError> {
        let path = path.as_ref();
        let bytes = self.to_bytes();
        std::fs::write(path, bytes).map_err(|source| ObjectError::Write { path: path.to_path_buf(), source })
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ObjectError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ObjectError::Read { path: path.to_path_buf(), source })?;
        Self::from_bytes(&bytes, path)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut strtab = StringTable::new();
        let module_name_off = strtab.intern(&self.module_name);

        // Pre-intern every string referenced from a packed record so the
        // table itself never needs a second pass.
        let symbol_name_offs: Vec<u32> = self.symbols.iter().map(|s| strtab.intern(&s.name)).collect();
        let code_reloc_sym_offs: Vec<u32> = self.code_relocations.iter().map(|r| strtab.intern(&r.symbol)).collect();
        let data_reloc_sym_offs: Vec<u32> = self.data_relocations.iter().map(|r| strtab.intern(&r.symbol)).collect();
        let import_offs: Vec<(u32, u32)> = self
            .imports
            .iter()
            .map(|i| (strtab.intern(&i.dll), strtab.intern(&i.function)))
            .collect();

        let strtab_bytes = strtab.into_bytes();

        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + self.code.len()
                + self.data.len()
                + self.rodata.len()
                + self.symbols.len() * SYMBOL_RECORD_SIZE
                + self.code_relocations.len() * RELOC_RECORD_SIZE
                + self.data_relocations.len() * RELOC_RECORD_SIZE
                + self.imports.len() * IMPORT_RECORD_SIZE
                + strtab_bytes.len(),
        );

        out.extend_from_slice(&OBJ_MAGIC.to_le_bytes());
        out.extend_from_slice(&OBJ_VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // flags, reserved
        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.rodata.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.symbols.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.code_relocations.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.data_relocations.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.imports.len() as u32).to_le_bytes());
        out.extend_from_slice(&module_name_off.to_le_bytes());
        out.extend_from_slice(&(strtab_bytes.len() as u32).to_le_bytes());
        debug_assert_eq!(out.len(), HEADER_SIZE);

        out.extend_from_slice(&self.code);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.rodata);

        for (sym, name_off) in self.symbols.iter().zip(&symbol_name_offs) {
            out.extend_from_slice(&name_off.to_le_bytes());
            out.push(sym.kind as u8);
            out.push(sym.visibility_byte());
            out.extend_from_slice(&[0u8; 2]); // padding
            out.extend_from_slice(&sym.section.to_le_bytes());
            out.extend_from_slice(&sym.offset.to_le_bytes());
            out.extend_from_slice(&sym.size.to_le_bytes());
        }

        for (reloc, sym_off) in self.code_relocations.iter().zip(&code_reloc_sym_offs) {
            write_reloc_record(&mut out, reloc.offset, reloc.kind, *sym_off, reloc.addend);
        }
        for (reloc, sym_off) in self.data_relocations.iter().zip(&data_reloc_sym_offs) {
            write_reloc_record(&mut out, reloc.offset, reloc.kind, *sym_off, reloc.addend);
        }

        for (dll_off, func_off) in &import_offs {
            out.extend_from_slice(&dll_off.to_le_bytes());
            out.extend_from_slice(&func_off.to_le_bytes());
        }

        out.extend_from_slice(&strtab_bytes);
        out
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self, ObjectError> {
        let err_trunc = |context| ObjectError::Truncated { path: path.to_path_buf(), context };
        if bytes.len() < HEADER_SIZE {
            return Err(err_trunc("header"));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if magic != OBJ_MAGIC {
            return Err(ObjectError::BadMagic { path: path.to_path_buf() });
        }
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if version != OBJ_VERSION {
            return Err(ObjectError::BadVersion { path: path.to_path_buf(), found: version, expected: OBJ_VERSION });
        }
        let code_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let data_size = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        let rodata_size = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
        let symbol_count = u32::from_le_bytes(bytes[20..24].try_into().unwrap()) as usize;
        let code_reloc_count = u32::from_le_bytes(bytes[24..28].try_into().unwrap()) as usize;
        let data_reloc_count = u32::from_le_bytes(bytes[28..32].try_into().unwrap()) as usize;
        let import_count = u32::from_le_bytes(bytes[32..36].try_into().unwrap()) as usize;
        let module_name_offset = u32::from_le_bytes(bytes[36..40].try_into().unwrap());
        let strtab_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap()) as usize;

        let mut cursor = HEADER_SIZE;
        let take = |cursor: &mut usize, len: usize| -> Result<std::ops::Range<usize>, ObjectError> {
            let end = cursor.checked_add(len).ok_or(err_trunc("overflow"))?;
            if end > bytes.len() {
                return Err(err_trunc("section/table"));
            }
            let r = *cursor..end;
            *cursor = end;
            Ok(r)
        };

        let code = bytes[take(&mut cursor, code_size)?].to_vec();
        let data = bytes[take(&mut cursor, data_size)?].to_vec();
        let rodata = bytes[take(&mut cursor, rodata_size)?].to_vec();

        let mut symbols_raw = Vec::with_capacity(symbol_count);
        for _ in 0..symbol_count {
            let r = take(&mut cursor, SYMBOL_RECORD_SIZE)?;
            symbols_raw.push(bytes[r].to_vec());
        }
        let mut code_relocs_raw = Vec::with_capacity(code_reloc_count);
        for _ in 0..code_reloc_count {
            let r = take(&mut cursor, RELOC_RECORD_SIZE)?;
            code_relocs_raw.push(bytes[r].to_vec());
        }
        let mut data_relocs_raw = Vec::with_capacity(data_reloc_count);
        for _ in 0..data_reloc_count {
            let r = take(&mut cursor, RELOC_RECORD_SIZE)?;
            data_relocs_raw.push(bytes[r].to_vec());
        }
        let mut imports_raw = Vec::with_capacity(import_count);
        for _ in 0..import_count {
            let r = take(&mut cursor, IMPORT_RECORD_SIZE)?;
            imports_raw.push(bytes[r].to_vec());
        }
        let strtab_range = take(&mut cursor, strtab_size)?;
        let strtab = &bytes[strtab_range];

        let read_string = |offset: u32| -> Result<String, ObjectError> {
            read_cstr(strtab, offset, path)
        };

        let module_name = read_string(module_name_offset)?;

        let mut symbols = Vec::with_capacity(symbol_count);
        for raw in &symbols_raw {
            let name_off = u32::from_le_bytes(raw[0..4].try_into().unwrap());
            let kind = SymbolKind::from_u8(raw[4]).ok_or(err_trunc("symbol kind"))?;
            let (exported, hidden, weak) = Symbol::from_visibility_byte(raw[5]);
            let section = u32::from_le_bytes(raw[8..12].try_into().unwrap());
            let offset = u32::from_le_bytes(raw[12..16].try_into().unwrap());
            let size = u32::from_le_bytes(raw[16..20].try_into().unwrap());
            symbols.push(Symbol {
                name: read_string(name_off)?,
                kind,
                section,
                offset,
                size,
                exported,
                hidden,
                weak,
            });
        }

        let read_reloc = |raw: &[u8]| -> Result<NamedRelocation, ObjectError> {
            let offset = u32::from_le_bytes(raw[0..4].try_into().unwrap());
            let kind = RelocType::from_u8(raw[4]).ok_or(err_trunc("relocation kind"))?;
            let sym_off = u32::from_le_bytes(raw[8..12].try_into().unwrap());
            let addend = i32::from_le_bytes(raw[12..16].try_into().unwrap());
            Ok(NamedRelocation { offset, kind, symbol: read_string(sym_off)?, addend })
        };
        let mut code_relocations = Vec::with_capacity(code_reloc_count);
        for raw in &code_relocs_raw {
            code_relocations.push(read_reloc(raw)?);
        }
        let mut data_relocations = Vec::with_capacity(data_reloc_count);
        for raw in &data_relocs_raw {
            data_relocations.push(read_reloc(raw)?);
        }

        let mut imports = Vec::with_capacity(import_count);
        for raw in &imports_raw {
            let dll_off = u32::from_le_bytes(raw[0..4].try_into().unwrap());
            let func_off = u32::from_le_bytes(raw[4..8].try_into().unwrap());
            imports.push(Import { dll: read_string(dll_off)?, function: read_string(func_off)? });
        }

        let mut symbol_index = HashMap::with_capacity(symbols.len());
        for (i, s) in symbols.iter().enumerate() {
            symbol_index.insert(s.name.clone(), i);
        }

        Ok(ObjectFile { module_name, code, data, rodata, symbols, symbol_index, code_relocations, data_relocations, imports })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ObjectError> {
        Self::read(path)
    }
}

fn write_reloc_record(out: &mut Vec<u8>, offset: u32, kind: RelocType, symbol_name_off: u32, addend: i32) {
    out.extend_from_slice(&offset.to_le_bytes());
    out.push(kind as u8);
    out.extend_from_slice(&[0u8; 3]); // padding
    out.extend_from_slice(&symbol_name_off.to_le_bytes());
    out.extend_from_slice(&addend.to_le_bytes());
}

fn read_cstr(strtab: &[u8], offset: u32, path: &Path) -> Result<String, ObjectError> {
    let offset = offset as usize;
    if offset > strtab.len() {
        return Err(ObjectError::BadStringOffset { path: path.to_path_buf(), offset: offset as u32 });
    }
    let end = strtab[offset..].iter().position(|&b| b == 0).map(|p| offset + p).unwrap_or(strtab.len());
    std::str::from_utf8(&strtab[offset..end])
        .map(str::to_owned)
        .map_err(|_| ObjectError::InvalidUtf8 { path: path.to_path_buf() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ObjectFile {
        let mut obj = ObjectFile::new("sample.tyo");
        obj.add_code(&[0x90, 0x90, 0xC3]);
        let data_off = obj.add_data(b"hello");
        let str_off = obj.add_string("world");
        obj.add_symbol(Symbol {
            name: "main".into(),
            kind: SymbolKind::Function,
            section: SECTION_CODE,
            offset: 0,
            size: 3,
            exported: true,
            hidden: false,
            weak: false,
        });
        obj.add_symbol(Symbol {
            name: "g_counter".into(),
            kind: SymbolKind::Data,
            section: SECTION_DATA,
            offset: data_off,
            size: 5,
            exported: false,
            hidden: true,
            weak: false,
        });
        obj.add_code_relocation(1, RelocType::Rel32, "helper", -4);
        obj.add_data_relocation(str_off, RelocType::Abs64, "__rodata_anchor", 0);
        obj.add_import("kernel32.dll", "ExitProcess");
        obj
    }

    #[test]
    fn round_trips_every_field() {
        let original = sample();
        let bytes = original.to_bytes();
        let decoded = ObjectFile::from_bytes(&bytes, Path::new("<memory>")).unwrap();

        assert_eq!(decoded.module_name, original.module_name);
        assert_eq!(decoded.code, original.code);
        assert_eq!(decoded.data, original.data);
        assert_eq!(decoded.rodata, original.rodata);
        assert_eq!(decoded.symbols, original.symbols);
        assert_eq!(decoded.code_relocations, original.code_relocations);
        assert_eq!(decoded.data_relocations, original.data_relocations);
        assert_eq!(decoded.imports, original.imports);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = 0;
        let err = ObjectFile::from_bytes(&bytes, Path::new("x.tyo")).unwrap_err();
        assert!(matches!(err, ObjectError::BadMagic { .. }));
    }

    #[test]
    fn data_and_rodata_appends_are_8_byte_aligned() {
        let mut obj = ObjectFile::new("m");
        let a = obj.add_data(b"abc");
        let b = obj.add_data(b"de");
        assert_eq!(a, 0);
        assert_eq!(b, 8);
        assert_eq!(obj.data.len(), 16);
    }

    #[test]
    fn find_symbol_is_o1_lookup() {
        let obj = sample();
        assert!(obj.find_symbol("main").is_some());
        assert!(obj.find_symbol("does-not-exist").is_none());
    }
}
