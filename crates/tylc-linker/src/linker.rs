use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tylc_object::{Archive, DefFile, ObjectFile};

use crate::config::{LinkerConfig, ENTRY_POINT_FALLBACKS};
use crate::error::{ErrorSink, LinkError};
use crate::export_table::{self, ResolvedExport};
use crate::import_lib;
use crate::import_table;
use crate::imports::ImportMap;
use crate::layout::{self, ObjectLayout, SectionRvas};
use crate::map_file;
use crate::pe_emit::{self, PeImage};
use crate::relocate::{self, RelocationSite};
use crate::symbol_map::{is_globally_visible, GlobalSymbol, GlobalSymbolMap};

const COFF_MACHINE_AMD64: u16 = 0x8664;

/// Everything a successful link produced, beyond the file it wrote.
/// Exposed mainly so tests and the driver's verbose mode can inspect the
/// intermediate state without re-parsing the output image.
pub struct LinkOutput {
    pub image_base: u64,
    pub entry_symbol: String,
    pub entry_rva: u32,
    pub global_symbols: GlobalSymbolMap,
    pub image_bytes: Vec<u8>,
    pub map_text: Option<String>,
    pub import_library_bytes: Option<Vec<u8>>,
}

pub struct Linker {
    config: LinkerConfig,
    objects: Vec<ObjectFile>,
    static_libs: Vec<Archive>,
    def_file: Option<DefFile>,
    errors: ErrorSink,
    output: Option<LinkOutput>,
}

impl Linker {
    pub fn new(config: LinkerConfig) -> Self {
        Linker { config, objects: Vec::new(), static_libs: Vec::new(), def_file: None, errors: ErrorSink::new(), output: None }
    }

    pub fn add_object(&mut self, object: ObjectFile) {
        self.objects.push(object);
    }

    pub fn load_object(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match ObjectFile::read(path) {
            Ok(obj) => {
                self.objects.push(obj);
                true
            }
            Err(e) => {
                self.errors.push(LinkError::ObjectIo { path: path.to_path_buf(), detail: e.to_string() });
                false
            }
        }
    }

    /// Loads and validates a static library: accepted as either an `ar`
    /// archive or a single bare COFF object, per §4.2.1. Validation only —
    /// member symbols are never extracted (see the crate's open-questions
    /// record in `DESIGN.md`).
    pub fn load_static_library(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                self.errors.push(LinkError::LibraryIo { path: path.to_path_buf(), detail: e.to_string() });
                return false;
            }
        };
        match Archive::parse(&bytes) {
            Ok(archive) => {
                self.static_libs.push(archive);
                true
            }
            Err(_) => {
                self.errors.push(LinkError::LibraryFormat { path: path.to_path_buf() });
                false
            }
        }
    }

    pub fn set_def_file(&mut self, def_file: DefFile) {
        if let Some(base) = def_file.image_base {
            self.config.image_base = base;
        }
        self.def_file = Some(def_file);
    }

    pub fn errors(&self) -> &[LinkError] {
        self.errors.errors()
    }

    pub fn output(&self) -> Option<&LinkOutput> {
        self.output.as_ref()
    }

    /// Runs all five phases. Returns `true` on success; on failure, every
    /// error encountered is available from `errors()` and no file is
    /// written.
    pub fn link(&mut self) -> bool {
        let mut errors = Vec::new();

        // Phase A: collect.
        let mut globals = GlobalSymbolMap::new();
        let mut import_map = ImportMap::new();
        let mut import_function_dlls: HashMap<String, String> = HashMap::new();

        for (i, obj) in self.objects.iter().enumerate() {
            for symbol in &obj.symbols {
                if is_globally_visible(symbol) {
                    let candidate = GlobalSymbol {
                        kind: symbol.kind,
                        final_rva: 0,
                        size: symbol.size,
                        source_module: obj.module_name.clone(),
                        source_object: i,
                        weak: symbol.weak,
                    };
                    globals.insert(&symbol.name, candidate, &mut errors);
                }
            }
            for import in &obj.imports {
                import_map.insert(&import.dll, &import.function);
                import_function_dlls.insert(import.function.clone(), import.dll.clone());
            }
        }

        if !errors.is_empty() {
            self.finish_with_errors(errors);
            return false;
        }

        // Phase B: resolve.
        relocate::check_resolvable(&self.objects, &globals, &import_function_dlls, &mut errors);

        let entry_symbol = match self.pick_entry_point(&globals) {
            Ok(name) => name,
            Err(e) => {
                errors.push(e);
                String::new()
            }
        };

        if !errors.is_empty() {
            self.finish_with_errors(errors);
            return false;
        }

        // Phase C: layout.
        let (mut merged_code, mut merged_data, merged_rodata, layouts) = layout::merge_objects(&self.objects);

        let base_rvas = layout::compute_rvas(&self.config, self.config.generate_dll, merged_code.len(), merged_data.len(), merged_rodata.len(), 0);
        self.assign_final_rvas(&mut globals, &base_rvas, &layouts);

        let dll_name = self.dll_name();
        let resolved_exports = if self.config.generate_dll { self.resolve_exports(&globals, &mut errors) } else { Vec::new() };

        if !errors.is_empty() {
            self.finish_with_errors(errors);
            return false;
        }

        let mut ordinal_exports = resolved_exports;
        export_table::assign_ordinals(&mut ordinal_exports);
        let export_layout =
            if self.config.generate_dll && !ordinal_exports.is_empty() { Some(export_table::build_export_table(&dll_name, &ordinal_exports)) } else { None };
        let edata_reserve = export_layout.as_ref().map(|t| t.bytes.len() as u32).unwrap_or(0);

        let rvas =
            layout::compute_rvas(&self.config, self.config.generate_dll, merged_code.len(), merged_data.len(), merged_rodata.len(), edata_reserve);
        // Section RVAs before .edata are invariant to the reserve, but
        // recomputing keeps this call the single source of truth.
        self.assign_final_rvas(&mut globals, &rvas, &layouts);

        let import_layout = import_table::build_import_table(&import_map);

        // Phase D: relocate.
        relocate::apply_relocations(RelocationSite::Code, &mut merged_code, &self.objects, &layouts, &rvas, &globals, &import_layout.function_rvas, &mut errors);
        relocate::apply_relocations(RelocationSite::Data, &mut merged_data, &self.objects, &layouts, &rvas, &globals, &import_layout.function_rvas, &mut errors);
        relocate::apply_abs64_relocations(
            RelocationSite::Code,
            &mut merged_code,
            &self.objects,
            &layouts,
            &rvas,
            &globals,
            &import_layout.function_rvas,
            self.config.image_base,
            &mut errors,
        );
        relocate::apply_abs64_relocations(
            RelocationSite::Data,
            &mut merged_data,
            &self.objects,
            &layouts,
            &rvas,
            &globals,
            &import_layout.function_rvas,
            self.config.image_base,
            &mut errors,
        );

        if !errors.is_empty() {
            self.finish_with_errors(errors);
            return false;
        }

        // Phase E: emit.
        let entry_rva = globals.get(&entry_symbol).map(|s| s.final_rva).unwrap_or(rvas.code_rva);

        let image = PeImage {
            image_base: self.config.image_base,
            section_alignment: self.config.section_alignment,
            file_alignment: self.config.file_alignment,
            is_dll: self.config.generate_dll,
            entry_rva,
            rvas,
            code: &merged_code,
            data: &merged_data,
            rodata: &merged_rodata,
            edata: export_layout.as_ref().map(|t| t.bytes.as_slice()),
            idata: &import_layout.bytes,
            import_directory_rva: rvas.idata_rva + import_layout.idt_offset,
            import_directory_size: import_layout.idt_size,
            export_directory_rva: export_layout.as_ref().map(|t| rvas.edata_rva + t.directory_offset).unwrap_or(0),
            export_directory_size: export_layout.as_ref().map(|t| t.bytes.len() as u32).unwrap_or(0),
        };
        let image_bytes = pe_emit::emit(&image);

        if let Err(e) = std::fs::write(&self.config.output_file, &image_bytes) {
            self.finish_with_errors(vec![LinkError::OutputIo { path: self.config.output_file.clone(), detail: e.to_string() }]);
            return false;
        }

        let map_text = if self.config.generate_map {
            let text = map_file::render(&self.config.output_file.to_string_lossy(), entry_rva, &globals);
            let map_path = self.config.output_file.with_extension("map");
            if let Err(e) = std::fs::write(&map_path, &text) {
                self.finish_with_errors(vec![LinkError::OutputIo { path: map_path, detail: e.to_string() }]);
                return false;
            }
            Some(text)
        } else {
            None
        };

        let import_library_bytes = if self.config.generate_dll && self.config.generate_import_lib && !ordinal_exports.is_empty() {
            let bytes = import_lib::build_import_library(&dll_name, &ordinal_exports, COFF_MACHINE_AMD64);
            let lib_path = self.config.output_file.with_extension("lib");
            if let Err(e) = std::fs::write(&lib_path, &bytes) {
                self.finish_with_errors(vec![LinkError::OutputIo { path: lib_path, detail: e.to_string() }]);
                return false;
            }
            Some(bytes)
        } else {
            None
        };

        self.output = Some(LinkOutput {
            image_base: self.config.image_base,
            entry_symbol,
            entry_rva,
            global_symbols: globals,
            image_bytes,
            map_text,
            import_library_bytes,
        });
        true
    }

    fn finish_with_errors(&mut self, errors: Vec<LinkError>) {
        self.errors = ErrorSink::new();
        for e in errors {
            self.errors.push(e);
        }
    }

    fn pick_entry_point(&self, globals: &GlobalSymbolMap) -> Result<String, LinkError> {
        if let Some(name) = &self.config.entry_point {
            return if globals.get(name).is_some() {
                Ok(name.clone())
            } else {
                Err(LinkError::EntryPointNotFound { name: name.clone() })
            };
        }
        for candidate in ENTRY_POINT_FALLBACKS {
            if globals.get(candidate).is_some() {
                return Ok(candidate.to_string());
            }
        }
        for obj in &self.objects {
            for symbol in &obj.symbols {
                if is_globally_visible(symbol) && symbol.kind == tylc_object::SymbolKind::Function {
                    return Ok(symbol.name.clone());
                }
            }
        }
        Err(LinkError::MissingEntryPoint)
    }

    fn assign_final_rvas(&self, globals: &mut GlobalSymbolMap, rvas: &SectionRvas, layouts: &[ObjectLayout]) {
        for (i, obj) in self.objects.iter().enumerate() {
            let layout = &layouts[i];
            for symbol in &obj.symbols {
                if !is_globally_visible(symbol) {
                    continue;
                }
                let Some(global) = globals.get_mut(&symbol.name) else { continue };
                if global.source_object != i {
                    continue;
                }
                let base = match symbol.section {
                    tylc_object::SECTION_CODE => rvas.code_rva + layout.code_offset,
                    tylc_object::SECTION_DATA => rvas.data_rva + layout.data_offset,
                    tylc_object::SECTION_RODATA => rvas.rodata_rva + layout.rodata_offset,
                    _ => continue,
                };
                global.final_rva = base + symbol.offset;
            }
        }
    }

    fn resolve_exports(&self, globals: &GlobalSymbolMap, errors: &mut Vec<LinkError>) -> Vec<ResolvedExport> {
        let mut specs: Vec<(String, Option<String>, Option<u32>, bool, bool)> = Vec::new();
        if let Some(def) = &self.def_file {
            for export in &def.exports {
                specs.push((export.name.clone(), export.internal_name.clone(), export.ordinal, export.no_name, export.is_data));
            }
        }
        for name in &self.config.export_symbols {
            specs.push((name.clone(), None, None, false, false));
        }

        let mut resolved = Vec::with_capacity(specs.len());
        for (name, internal_name, ordinal, no_name, is_data) in specs {
            let lookup_name = internal_name.clone().unwrap_or_else(|| name.clone());
            match globals.get(&lookup_name) {
                Some(sym) => resolved.push(ResolvedExport { name, internal_name: lookup_name, rva: sym.final_rva, ordinal, no_name, is_data }),
                None => errors.push(LinkError::UndefinedSymbol { name: lookup_name, from_module: "<exports>".to_string() }),
            }
        }
        resolved
    }

    fn dll_name(&self) -> String {
        if let Some(def) = &self.def_file {
            if let Some(name) = &def.library_name {
                return name.clone();
            }
        }
        self.config
            .output_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output.dll".to_string())
    }
}

pub fn default_output_path(generate_dll: bool) -> PathBuf {
    PathBuf::from(if generate_dll { "a.dll" } else { "a.exe" })
}
