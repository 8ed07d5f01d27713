//! Single-TU PE emitter used by the code generator before the multi-object
//! linker ever runs. See `tylc-linker` for the full multi-object pipeline.

pub mod error;
pub mod pe_gen;

pub use error::PeGenError;
pub use pe_gen::{FixupKind, PeGenerator, DATA_RVA_PLACEHOLDER, IDATA_RVA_PLACEHOLDER};
