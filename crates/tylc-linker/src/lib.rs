pub mod config;
pub mod error;
pub mod export_table;
pub mod import_lib;
pub mod import_table;
pub mod imports;
pub mod layout;
mod linker;
pub mod map_file;
pub mod pe_emit;
pub mod relocate;
pub mod symbol_map;

pub use config::{LinkerConfig, ENTRY_POINT_FALLBACKS};
pub use error::LinkError;
pub use linker::{default_output_path, LinkOutput, Linker};
