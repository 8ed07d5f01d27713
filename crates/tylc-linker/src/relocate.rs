use std::collections::HashMap;

use tylc_object::{NamedRelocation, ObjectFile, RelocType};

use crate::error::LinkError;
use crate::layout::{ObjectLayout, SectionRvas};
use crate::symbol_map::GlobalSymbolMap;

const DATA_ANCHOR: &str = "__data";
const IDATA_ANCHOR: &str = "__idata";
const IMPORT_PREFIX: &str = "__import_";

/// True for the three bypass-resolution name classes described in phase B:
/// the data-section anchor, the import-table anchor, and any specific
/// import-function reference.
pub fn is_special_reference(name: &str) -> bool {
    name == DATA_ANCHOR || name == IDATA_ANCHOR || name.starts_with(IMPORT_PREFIX)
}

/// Resolves every code relocation's target name against the three
/// legitimate sources (global map, import function, local symbol) and the
/// three bypass names, without yet computing an RVA. Used by phase B to
/// surface unresolved names before layout runs.
pub fn check_resolvable(
    objects: &[ObjectFile],
    globals: &GlobalSymbolMap,
    import_function_dlls: &HashMap<String, String>,
    errors: &mut Vec<LinkError>,
) {
    for obj in objects {
        for reloc in obj.code_relocations.iter() {
            let name = &reloc.symbol;
            if is_special_reference(name) {
                if let Some(func) = name.strip_prefix(IMPORT_PREFIX) {
                    if !import_function_dlls.contains_key(func) {
                        errors.push(LinkError::UnresolvedImport { name: func.to_string() });
                    }
                }
                continue;
            }
            let resolved = globals.get(name).is_some()
                || import_function_dlls.contains_key(name)
                || obj.find_symbol(name).map(|s| s.is_defined()).unwrap_or(false);
            if !resolved {
                errors.push(LinkError::UndefinedSymbol { name: name.clone(), from_module: obj.module_name.clone() });
            }
        }
    }
}

fn patch_site<'a>(buf: &'a mut [u8], abs_offset: usize) -> Result<&'a mut [u8; 4], LinkError> {
    if abs_offset + 4 > buf.len() {
        return Err(LinkError::ObjectFormat {
            path: Default::default(),
            detail: format!("relocation patch site {abs_offset} is out of range of its merged section"),
        });
    }
    Ok((&mut buf[abs_offset..abs_offset + 4]).try_into().unwrap())
}

/// Computes the target RVA for one relocation's symbol name, given all the
/// fully-resolved context (globals, import function RVAs relative to the
/// start of `.idata`, the owning object's own local symbols, and that
/// object's section layout).
fn resolve_target_rva(
    name: &str,
    obj: &ObjectFile,
    layout: &ObjectLayout,
    rvas: &SectionRvas,
    globals: &GlobalSymbolMap,
    import_function_rvas: &HashMap<String, u32>,
) -> Option<u32> {
    if name == DATA_ANCHOR {
        return Some((rvas.data_rva as i64 + layout.data_offset as i64) as u32);
    }
    if name == IDATA_ANCHOR {
        return Some(rvas.idata_rva);
    }
    if let Some(func) = name.strip_prefix(IMPORT_PREFIX) {
        return import_function_rvas.get(func).map(|&iat_slot| rvas.idata_rva + iat_slot);
    }
    if let Some(global) = globals.get(name) {
        return Some(global.final_rva);
    }
    if let Some(&iat_slot) = import_function_rvas.get(name) {
        return Some(rvas.idata_rva + iat_slot);
    }
    if let Some(local) = obj.find_symbol(name) {
        if local.is_defined() {
            let base = match local.section {
                tylc_object::SECTION_CODE => rvas.code_rva + layout.code_offset,
                tylc_object::SECTION_DATA => rvas.data_rva + layout.data_offset,
                tylc_object::SECTION_RODATA => rvas.rodata_rva + layout.rodata_offset,
                _ => return None,
            };
            return Some(base + local.offset);
        }
    }
    None
}

/// Picks out one object's relocation list and its matching section offset:
/// code-site relocations patch the merged code buffer at `code_offset`,
/// data-site relocations patch the merged data buffer at `data_offset`.
pub enum RelocationSite {
    Code,
    Data,
}

fn relocations_and_offset<'a>(obj: &'a ObjectFile, layout: &ObjectLayout, site: &RelocationSite) -> (&'a [NamedRelocation], u32) {
    match site {
        RelocationSite::Code => (&obj.code_relocations, layout.code_offset),
        RelocationSite::Data => (&obj.data_relocations, layout.data_offset),
    }
}

fn site_base_rva(rvas: &SectionRvas, site: &RelocationSite) -> u32 {
    match site {
        RelocationSite::Code => rvas.code_rva,
        RelocationSite::Data => rvas.data_rva,
    }
}

/// Applies every REL32/RIP32/ABS32 relocation of `site`'s kind directly
/// into `merged_buf`. ABS64 relocations are skipped here — see
/// `apply_abs64_relocations`, which needs the image base.
#[allow(clippy::too_many_arguments)]
pub fn apply_relocations(
    site: RelocationSite,
    merged_buf: &mut [u8],
    objects: &[ObjectFile],
    layouts: &[ObjectLayout],
    rvas: &SectionRvas,
    globals: &GlobalSymbolMap,
    import_function_rvas: &HashMap<String, u32>,
    errors: &mut Vec<LinkError>,
) {
    let base_rva = site_base_rva(rvas, &site);
    for (obj, layout) in objects.iter().zip(layouts) {
        let (relocations, section_offset) = relocations_and_offset(obj, layout, &site);
        for reloc in relocations {
            if reloc.kind == RelocType::Abs64 {
                continue;
            }

            let target = resolve_target_rva(&reloc.symbol, obj, layout, rvas, globals, import_function_rvas);
            let Some(target) = target else {
                errors.push(LinkError::UndefinedSymbol { name: reloc.symbol.clone(), from_module: obj.module_name.clone() });
                continue;
            };

            let abs_offset = (section_offset + reloc.offset) as usize;
            let patch = match patch_site(merged_buf, abs_offset) {
                Ok(s) => s,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            match reloc.kind {
                RelocType::Rel32 | RelocType::Rip32 => {
                    let patch_site_rva = base_rva + abs_offset as u32;
                    let value = target as i64 - (patch_site_rva as i64 + 4);
                    patch.copy_from_slice(&(value as i32).to_le_bytes());
                }
                RelocType::Abs32 => {
                    let value = (target as i64 + reloc.addend as i64) as u32;
                    patch.copy_from_slice(&value.to_le_bytes());
                }
                RelocType::Abs64 => unreachable!("filtered above"),
            }
        }
    }
}

/// ABS64 needs the image base and writes the full 8 bytes; a second pass
/// after `apply_relocations` handles it once that base is known.
#[allow(clippy::too_many_arguments)]
pub fn apply_abs64_relocations(
    site: RelocationSite,
    merged_buf: &mut [u8],
    objects: &[ObjectFile],
    layouts: &[ObjectLayout],
    rvas: &SectionRvas,
    globals: &GlobalSymbolMap,
    import_function_rvas: &HashMap<String, u32>,
    image_base: u64,
    errors: &mut Vec<LinkError>,
) {
    for (obj, layout) in objects.iter().zip(layouts) {
        let (relocations, section_offset) = relocations_and_offset(obj, layout, &site);
        for reloc in relocations {
            if reloc.kind != RelocType::Abs64 {
                continue;
            }
            let target = resolve_target_rva(&reloc.symbol, obj, layout, rvas, globals, import_function_rvas);
            let Some(target) = target else {
                errors.push(LinkError::UndefinedSymbol { name: reloc.symbol.clone(), from_module: obj.module_name.clone() });
                continue;
            };
            let abs_offset = (section_offset + reloc.offset) as usize;
            if abs_offset + 8 > merged_buf.len() {
                errors.push(LinkError::ObjectFormat {
                    path: Default::default(),
                    detail: "ABS64 relocation patch site overruns its merged section".to_string(),
                });
                continue;
            }
            let value = image_base + target as u64 + reloc.addend as u64;
            merged_buf[abs_offset..abs_offset + 8].copy_from_slice(&value.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_map::GlobalSymbol;
    use tylc_object::{RelocType, SymbolKind};

    fn rvas() -> SectionRvas {
        SectionRvas { code_rva: 0x1000, data_rva: 0x2000, rodata_rva: 0x3000, edata_rva: 0, idata_rva: 0x4000 }
    }

    #[test]
    fn rel32_patches_pc_relative_displacement() {
        let mut obj = ObjectFile::new("m");
        obj.add_code(&[0xE8, 0, 0, 0, 0]); // call rel32 at offset 1
        obj.add_code_relocation(1, RelocType::Rel32, "target", 0);

        let mut globals = GlobalSymbolMap::new();
        let mut errs = Vec::new();
        globals.insert(
            "target",
            GlobalSymbol { kind: SymbolKind::Function, final_rva: 0x1050, size: 0, source_module: "m".into(), source_object: 0, weak: false },
            &mut errs,
        );

        let layouts = vec![ObjectLayout::default()];
        let mut merged_code = obj.code.clone();
        let rvas = rvas();
        let mut errors = Vec::new();
        apply_relocations(RelocationSite::Code, &mut merged_code, &[obj], &layouts, &rvas, &globals, &HashMap::new(), &mut errors);
        assert!(errors.is_empty());

        let patched = i32::from_le_bytes(merged_code[1..5].try_into().unwrap());
        // patch site RVA = codeRVA + 1 = 0x1001; target - (site+4) = 0x1050 - 0x1005
        assert_eq!(patched, 0x1050 - 0x1005);
    }

    #[test]
    fn data_anchor_resolves_to_merged_data_base_plus_addend() {
        let mut obj = ObjectFile::new("m");
        obj.add_code(&[0, 0, 0, 0]);
        obj.add_code_relocation(0, RelocType::Abs32, "__data", 8);

        let globals = GlobalSymbolMap::new();
        let layouts = vec![ObjectLayout::default()];
        let mut merged_code = obj.code.clone();
        let rvas = rvas();
        let mut errors = Vec::new();
        apply_relocations(RelocationSite::Code, &mut merged_code, &[obj], &layouts, &rvas, &globals, &HashMap::new(), &mut errors);
        assert!(errors.is_empty());
        let patched = u32::from_le_bytes(merged_code[0..4].try_into().unwrap());
        assert_eq!(patched, 0x2000 + 8);
    }

    #[test]
    fn unresolved_symbol_is_reported() {
        let mut obj = ObjectFile::new("m");
        obj.add_code(&[0, 0, 0, 0]);
        obj.add_code_relocation(0, RelocType::Abs32, "missing", 0);

        let globals = GlobalSymbolMap::new();
        let layouts = vec![ObjectLayout::default()];
        let mut merged_code = obj.code.clone();
        let rvas = rvas();
        let mut errors = Vec::new();
        apply_relocations(RelocationSite::Code, &mut merged_code, &[obj], &layouts, &rvas, &globals, &HashMap::new(), &mut errors);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LinkError::UndefinedSymbol { .. }));
    }
}
