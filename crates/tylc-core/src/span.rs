//! Source locations carried by every AST node.

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Location used for nodes synthesized by an optimizer pass rather than
    /// parsed from source (temporaries, rewritten loop bodies, ...).
    pub fn synthetic() -> Self {
        Self { line: 0, column: 0 }
    }

    pub fn is_synthetic(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}
