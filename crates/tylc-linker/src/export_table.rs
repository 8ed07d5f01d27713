/// A single export as resolved against the global symbol map, before
/// ordinal assignment.
#[derive(Debug, Clone)]
pub struct ResolvedExport {
    pub name: String,
    pub internal_name: String,
    pub rva: u32,
    pub ordinal: Option<u32>,
    pub no_name: bool,
    pub is_data: bool,
}

/// Assigns ordinals (DEF-specified ones fixed, the rest filled upward from
/// the lowest unused value starting at 1) and builds the Export Directory
/// Table, address table, name-pointer table, ordinal table and name pool.
pub struct ExportTableLayout {
    pub bytes: Vec<u8>,
    pub directory_offset: u32,
}

fn align_up(v: u32, align: u32) -> u32 {
    (v + align - 1) / align * align
}

pub fn assign_ordinals(exports: &mut [ResolvedExport]) {
    let mut used: Vec<u32> = exports.iter().filter_map(|e| e.ordinal).collect();
    used.sort_unstable();
    let mut next = 1u32;
    for export in exports.iter_mut() {
        if export.ordinal.is_none() {
            while used.binary_search(&next).is_ok() {
                next += 1;
            }
            export.ordinal = Some(next);
            used.push(next);
            used.sort_unstable();
        }
    }
}

/// Builds the full export region for `.edata`: directory table, address
/// table, name pointer table (sorted by name, `NONAME` exports excluded),
/// ordinal table, name pool, and the DLL name string.
pub fn build_export_table(dll_name: &str, exports: &[ResolvedExport]) -> ExportTableLayout {
    let base = exports.iter().map(|e| e.ordinal.unwrap()).min().unwrap_or(1);
    let max_ordinal = exports.iter().map(|e| e.ordinal.unwrap()).max().unwrap_or(base);
    let function_count = max_ordinal - base + 1;

    let mut named: Vec<&ResolvedExport> = exports.iter().filter(|e| !e.no_name).collect();
    named.sort_by(|a, b| a.name.cmp(&b.name));
    let name_count = named.len() as u32;

    const DIR_SIZE: u32 = 40;
    let dir_offset = 0u32;
    let addr_table_offset = dir_offset + DIR_SIZE;
    let addr_table_size = function_count * 4;
    let name_ptr_offset = addr_table_offset + addr_table_size;
    let name_ptr_size = name_count * 4;
    let ordinal_table_offset = name_ptr_offset + name_ptr_size;
    let ordinal_table_size = name_count * 2;
    let names_offset = align_up(ordinal_table_offset + ordinal_table_size, 2);

    let mut name_pool = Vec::new();
    let mut name_rvas = Vec::new();
    for export in &named {
        name_rvas.push(names_offset + name_pool.len() as u32);
        name_pool.extend_from_slice(export.name.as_bytes());
        name_pool.push(0);
    }
    let dll_name_rva = names_offset + name_pool.len() as u32;
    name_pool.extend_from_slice(dll_name.as_bytes());
    name_pool.push(0);

    let total = names_offset + name_pool.len() as u32;
    let mut bytes = vec![0u8; total as usize];

    // IMAGE_EXPORT_DIRECTORY: Characteristics, TimeDateStamp, Major/MinorVersion
    // (all zero), then Name, Base, NumberOfFunctions, NumberOfNames,
    // AddressOfFunctions, AddressOfNames, AddressOfNameOrdinals.
    bytes[12..16].copy_from_slice(&dll_name_rva.to_le_bytes());
    bytes[16..20].copy_from_slice(&base.to_le_bytes());
    bytes[20..24].copy_from_slice(&function_count.to_le_bytes());
    bytes[24..28].copy_from_slice(&name_count.to_le_bytes());
    bytes[28..32].copy_from_slice(&addr_table_offset.to_le_bytes());
    bytes[32..36].copy_from_slice(&name_ptr_offset.to_le_bytes());
    bytes[36..40].copy_from_slice(&ordinal_table_offset.to_le_bytes());

    for export in exports {
        let ordinal = export.ordinal.unwrap();
        let idx = (ordinal - base) as usize;
        let entry = addr_table_offset as usize + idx * 4;
        bytes[entry..entry + 4].copy_from_slice(&export.rva.to_le_bytes());
    }

    for (i, export) in named.iter().enumerate() {
        let name_entry = name_ptr_offset as usize + i * 4;
        bytes[name_entry..name_entry + 4].copy_from_slice(&name_rvas[i].to_le_bytes());
        let ordinal_entry = ordinal_table_offset as usize + i * 2;
        let relative_ordinal = (export.ordinal.unwrap() - base) as u16;
        bytes[ordinal_entry..ordinal_entry + 2].copy_from_slice(&relative_ordinal.to_le_bytes());
    }

    bytes[names_offset as usize..names_offset as usize + name_pool.len()].copy_from_slice(&name_pool);

    ExportTableLayout { bytes, directory_offset: dir_offset }
}
