use std::path::PathBuf;

/// Everything the five link phases need that isn't implied by the object
/// files themselves.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub entry_point: Option<String>,
    pub output_file: PathBuf,
    pub generate_dll: bool,
    pub generate_import_lib: bool,
    pub def_file: Option<PathBuf>,
    pub generate_map: bool,
    pub export_symbols: Vec<String>,
    pub library_paths: Vec<PathBuf>,
    pub default_libs: Vec<String>,
    pub static_libs: Vec<PathBuf>,
    pub verbose: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        LinkerConfig {
            image_base: 0x1_4000_0000,
            section_alignment: 0x1000,
            file_alignment: 0x200,
            entry_point: None,
            output_file: PathBuf::from("a.exe"),
            generate_dll: false,
            generate_import_lib: false,
            def_file: None,
            generate_map: false,
            export_symbols: Vec::new(),
            library_paths: Vec::new(),
            default_libs: vec!["kernel32.dll".to_string()],
            static_libs: Vec::new(),
            verbose: false,
        }
    }
}

impl LinkerConfig {
    pub fn new(output_file: impl Into<PathBuf>) -> Self {
        LinkerConfig { output_file: output_file.into(), ..Default::default() }
    }
}

pub const ENTRY_POINT_FALLBACKS: &[&str] = &["_start", "main", "__TYL_main"];
