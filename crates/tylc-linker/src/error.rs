use std::path::PathBuf;

/// Every linker error, in the four families the error-handling design
/// calls out: I/O, format, resolution, and configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("could not read object {path}: {detail}")]
    ObjectIo { path: PathBuf, detail: String },

    #[error("could not read static library {path}: {detail}")]
    LibraryIo { path: PathBuf, detail: String },

    #[error("could not write output {path}: {detail}")]
    OutputIo { path: PathBuf, detail: String },

    #[error("{path}: {detail}")]
    ObjectFormat { path: PathBuf, detail: String },

    #[error("{path}: not a recognized ar archive or COFF object")]
    LibraryFormat { path: PathBuf },

    #[error("undefined symbol `{name}` referenced from `{from_module}`")]
    UndefinedSymbol { name: String, from_module: String },

    #[error("unresolved import function `{name}`")]
    UnresolvedImport { name: String },

    #[error("duplicate strong symbol `{name}` defined in both `{first_module}` and `{second_module}`")]
    DuplicateStrongSymbol { name: String, first_module: String, second_module: String },

    #[error("no entry point: none of the auto-selection fallbacks (_start, main, __TYL_main, first function) resolved, and none was configured")]
    MissingEntryPoint,

    #[error("configured entry point `{name}` was not found among defined symbols")]
    EntryPointNotFound { name: String },
}

/// Accumulates errors across a link instead of failing fast, matching the
/// "collected, not thrown" error design: a link either succeeds with an
/// empty list or fails with every error it found.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    errors: Vec<LinkError>,
}

impl ErrorSink {
    pub fn new() -> Self {
        ErrorSink::default()
    }

    pub fn push(&mut self, err: LinkError) {
        self.errors.push(err);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[LinkError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<LinkError> {
        self.errors
    }
}
