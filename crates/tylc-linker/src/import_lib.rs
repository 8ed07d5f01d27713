//! Synthesizes a static import library for a DLL: a standard Unix `ar`
//! archive whose members are short COFF import-object records, one per
//! export, preceded by a linker symbol-index member so `ar`-aware tools
//! can find each export's member by name.

use crate::export_table::ResolvedExport;

const AR_MAGIC: &[u8; 8] = b"!<arch>\n";
const IMPORT_OBJECT_HDR_SIZE: usize = 20;

const IMPORT_CODE: u16 = 0; // function export
const IMPORT_DATA: u16 = 1; // data export
const IMPORT_NAME: u16 = 1; // full decorated name follows verbatim

fn short_import_member(dll_name: &str, export: &ResolvedExport, machine: u16) -> Vec<u8> {
    let mut strings = Vec::new();
    strings.extend_from_slice(export.name.as_bytes());
    strings.push(0);
    strings.extend_from_slice(dll_name.as_bytes());
    strings.push(0);

    let mut member = vec![0u8; IMPORT_OBJECT_HDR_SIZE];
    member[0..2].copy_from_slice(&0u16.to_le_bytes()); // Sig1 = IMAGE_FILE_MACHINE_UNKNOWN
    member[2..4].copy_from_slice(&0xFFFFu16.to_le_bytes()); // Sig2
    member[4..6].copy_from_slice(&0u16.to_le_bytes()); // Version
    member[6..8].copy_from_slice(&machine.to_le_bytes());
    member[8..12].copy_from_slice(&0u32.to_le_bytes()); // TimeDateStamp
    member[12..16].copy_from_slice(&(strings.len() as u32).to_le_bytes()); // SizeOfData
    member[16..18].copy_from_slice(&(export.ordinal.unwrap_or(0) as u16).to_le_bytes());
    let type_bits = if export.is_data { IMPORT_DATA } else { IMPORT_CODE };
    member[18..20].copy_from_slice(&(type_bits | (IMPORT_NAME << 2)).to_le_bytes());

    member.extend_from_slice(&strings);
    member
}

fn ar_header(name: &str, size: usize) -> [u8; 60] {
    let mut h = [b' '; 60];
    let name_bytes = name.as_bytes();
    let n = name_bytes.len().min(16);
    h[..n].copy_from_slice(&name_bytes[..n]);
    h[16..28].copy_from_slice(b"0           "); // mtime
    h[28..34].copy_from_slice(b"0     "); // uid
    h[34..40].copy_from_slice(b"0     "); // gid
    h[40..48].copy_from_slice(b"100644  "); // mode
    let size_str = size.to_string();
    h[48..48 + size_str.len()].copy_from_slice(size_str.as_bytes());
    h[58] = b'`';
    h[59] = b'\n';
    h
}

fn push_member(archive: &mut Vec<u8>, name: &str, data: &[u8]) {
    archive.extend_from_slice(&ar_header(name, data.len()));
    archive.extend_from_slice(data);
    if data.len() % 2 == 1 {
        archive.push(b'\n');
    }
}

/// A minimal first-linker-member symbol index: big-endian member count,
/// big-endian member offsets, then NUL-terminated symbol names in the
/// order their owning members appear. Lets `ar t`/`nm`-style tools resolve
/// a symbol name to an archive offset without scanning every member.
fn build_symbol_index(members: &[(String, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(members.len() as u32).to_be_bytes());
    for (_, offset) in members {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    for (name, _) in members {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

/// Builds the full import-library archive for `dll_name`'s resolved
/// exports: the `ar` magic, a `/` symbol-index member, then one short
/// import member per export.
pub fn build_import_library(dll_name: &str, exports: &[ResolvedExport], machine: u16) -> Vec<u8> {
    let mut archive = AR_MAGIC.to_vec();

    // First pass: serialize every export member so we know its offset for
    // the symbol index, which must precede them in the archive.
    let mut member_bytes: Vec<(String, Vec<u8>)> = Vec::new();
    for export in exports {
        member_bytes.push((export.name.clone(), short_import_member(dll_name, export, machine)));
    }

    let index_header_and_placeholder_len = 60; // one ar header for the "/" member itself
    let mut offset = AR_MAGIC.len() as u32 + index_header_and_placeholder_len as u32;
    // The index member's own size depends on the member offsets that come
    // after it, so reserve its header first, then compute offsets assuming
    // a provisional index size and fix up in a second pass if it changed
    // due to odd-length padding. For our fixed-width symbol index layout
    // the size is static given the export count, so one pass suffices.
    let provisional_index_len = 4 + exports.len() as u32 * 4 + exports.iter().map(|e| e.name.len() as u32 + 1).sum::<u32>();
    offset += provisional_index_len + (provisional_index_len % 2);

    let mut positions = Vec::new();
    for (name, bytes) in &member_bytes {
        positions.push((name.clone(), offset));
        offset += 60 + bytes.len() as u32;
        if bytes.len() % 2 == 1 {
            offset += 1;
        }
    }

    let index = build_symbol_index(&positions);
    debug_assert_eq!(index.len() as u32, provisional_index_len);
    push_member(&mut archive, "/", &index);

    for (name, bytes) in &member_bytes {
        push_member(&mut archive, name, bytes);
    }

    archive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_starts_with_ar_magic() {
        let exports = vec![ResolvedExport { name: "greet".into(), internal_name: "greet".into(), rva: 0x10, ordinal: Some(1), no_name: false, is_data: false }];
        let archive = build_import_library("hello.dll", &exports, 0x8664);
        assert_eq!(&archive[..8], AR_MAGIC);
    }

    #[test]
    fn one_member_per_export() {
        let exports = vec![
            ResolvedExport { name: "a".into(), internal_name: "a".into(), rva: 0x10, ordinal: Some(1), no_name: false, is_data: false },
            ResolvedExport { name: "b".into(), internal_name: "b".into(), rva: 0x20, ordinal: Some(2), no_name: false, is_data: false },
        ];
        let archive = build_import_library("m.dll", &exports, 0x8664);
        let parsed = tylc_object::Archive::parse(&archive).unwrap();
        // the "/" symbol-index member is skipped by the reader; only the
        // two short-import members remain
        assert_eq!(parsed.members.len(), 2);
    }
}
