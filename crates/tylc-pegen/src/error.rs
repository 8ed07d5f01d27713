use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PeGenError {
    #[error("could not write {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },

    #[error("fixup at code offset {offset} has no corresponding placeholder in the code buffer")]
    OffsetOutOfRange { offset: u32 },

    #[error("vtable fixup data offset {offset} is out of range for the data buffer")]
    VtableOffsetOutOfRange { offset: u32 },
}
