use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("could not read object file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("could not write object file {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },

    #[error("{path}: not a tylc object file (bad magic)")]
    BadMagic { path: PathBuf },

    #[error("{path}: unsupported object version {found} (expected {expected})")]
    BadVersion { path: PathBuf, found: u16, expected: u16 },

    #[error("{path}: truncated object file ({context})")]
    Truncated { path: PathBuf, context: &'static str },

    #[error("{path}: string table offset {offset} is out of range")]
    BadStringOffset { path: PathBuf, offset: u32 },

    #[error("{path}: string table entry is not valid UTF-8")]
    InvalidUtf8 { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("not a ar(1) archive (bad magic)")]
    BadMagic,

    #[error("truncated archive member header")]
    TruncatedHeader,

    #[error("truncated archive member payload for {name:?}")]
    TruncatedMember { name: String },

    #[error("archive member {name:?} has a non-numeric size field")]
    BadSizeField { name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DefFileError {
    #[error("could not read DEF file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("line {line}: expected a number after {keyword}")]
    ExpectedNumber { line: usize, keyword: &'static str },

    #[error("line {line}: malformed EXPORTS entry {text:?}")]
    MalformedExport { line: usize, text: String },
}
