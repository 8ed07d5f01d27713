use std::collections::HashMap;

use crate::imports::ImportMap;

/// The IDT/ILT/IAT/strings region of `.idata`, laid out relative to the
/// start of the section (add the section's base RVA to get an absolute
/// RVA). `function_rvas` gives each imported function's IAT slot, relative
/// to the section start — the value every relocation against that function
/// patches in as its target.
pub struct ImportTableLayout {
    pub bytes: Vec<u8>,
    pub idt_offset: u32,
    pub idt_size: u32,
    pub function_rvas: HashMap<String, u32>,
}

/// Builds the bit-exact import directory layout: an Import Directory Table
/// terminated by a zeroed 20-byte entry, an Import Lookup Table with a
/// zero terminator per DLL group, a parallel Import Address Table, a
/// packed hint/name region, then each DLL's name string.
pub fn build_import_table(imports: &ImportMap) -> ImportTableLayout {
    let dlls = imports.sorted();

    let idt_offset = 0u32;
    let idt_size = (dlls.len() as u32 + 1) * 20;
    let ilt_offset = idt_offset + idt_size;
    let ilt_total: u32 = dlls.iter().map(|(_, fns)| (fns.len() as u32 + 1) * 8).sum();
    let iat_offset = ilt_offset + ilt_total;
    let iat_total = ilt_total;
    let hintname_offset = iat_offset + iat_total;

    let mut hintname = Vec::new();
    let mut hintname_rvas = Vec::new();
    for (_, fns) in &dlls {
        for func in fns {
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
    let mut dllname_rvas = Vec::new();
    for (dll, _) in &dlls {
        dllname_rvas.push(dllnames_offset + dllnames.len() as u32);
        dllnames.extend_from_slice(dll.as_bytes());
        dllnames.push(0);
        if dllnames.len() % 2 == 1 {
            dllnames.push(0);
        }
    }

    let total = dllnames_offset + dllnames.len() as u32;
    let mut bytes = vec![0u8; total as usize];

    let mut function_rvas = HashMap::new();
    let mut func_idx = 0usize;
    let mut ilt_cursor = ilt_offset;
    let mut iat_cursor = iat_offset;

    for (i, (_, fns)) in dlls.iter().enumerate() {
        let idt_entry = (idt_offset + i as u32 * 20) as usize;
        bytes[idt_entry..idt_entry + 4].copy_from_slice(&ilt_cursor.to_le_bytes());
        bytes[idt_entry + 12..idt_entry + 16].copy_from_slice(&dllname_rvas[i].to_le_bytes());
        bytes[idt_entry + 16..idt_entry + 20].copy_from_slice(&iat_cursor.to_le_bytes());

        for func in fns {
            let hn_rva = hintname_rvas[func_idx] as u64;
            let ilt_pos = ilt_cursor as usize;
            bytes[ilt_pos..ilt_pos + 8].copy_from_slice(&hn_rva.to_le_bytes());
            ilt_cursor += 8;

            let iat_pos = iat_cursor as usize;
            bytes[iat_pos..iat_pos + 8].copy_from_slice(&hn_rva.to_le_bytes());
            function_rvas.insert((*func).to_string(), iat_cursor);
            iat_cursor += 8;

            func_idx += 1;
        }
        ilt_cursor += 8;
        iat_cursor += 8;
    }

    bytes[hintname_offset as usize..hintname_offset as usize + hintname.len()].copy_from_slice(&hintname);
    bytes[dllnames_offset as usize..dllnames_offset as usize + dllnames.len()].copy_from_slice(&dllnames);

    ImportTableLayout { bytes, idt_offset, idt_size, function_rvas }
}
