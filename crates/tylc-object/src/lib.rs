//! Relocatable object-file container used to move code between the
//! optimizer's output and the linker's input, plus the two supporting file
//! formats the linker needs at its boundary: `ar(1)` static-library archives
//! and Windows `.def` module-definition files.

pub mod archive;
pub mod def_file;
pub mod error;
pub mod object_file;
mod strtab;

pub use archive::{Archive, ArchiveMember};
pub use def_file::{DefFile, ExportSpec};
pub use error::{ArchiveError, DefFileError, ObjectError};
pub use object_file::{
    Import, NamedRelocation, ObjectFile, RelocType, Symbol, SymbolKind, SECTION_CODE, SECTION_DATA, SECTION_RODATA,
};
