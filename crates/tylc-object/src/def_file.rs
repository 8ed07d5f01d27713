//! Parser for Windows module-definition (`.def`) files: `LIBRARY`,
//! `DESCRIPTION`, `BASE`, `HEAPSIZE`, `STACKSIZE` and an `EXPORTS` block of
//! `name[=internal] [@ordinal] [NONAME] [DATA]` entries.

use std::path::Path;

use crate::error::DefFileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSpec {
    pub name: String,
    pub internal_name: Option<String>,
    pub ordinal: Option<u32>,
    pub no_name: bool,
    pub is_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefFile {
    pub library_name: Option<String>,
    pub description: Option<String>,
    pub image_base: Option<u64>,
    pub heap_size: Option<u32>,
    pub stack_size: Option<u32>,
    pub exports: Vec<ExportSpec>,
}

impl DefFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DefFileError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, DefFileError> {
        let mut def = DefFile::default();
        let mut in_exports = false;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = strip_keyword(line, "LIBRARY") {
                in_exports = false;
                def.library_name = Some(unquote(rest.trim()));
                continue;
            }
            if let Some(rest) = strip_keyword(line, "DESCRIPTION") {
                in_exports = false;
                def.description = Some(unquote(rest.trim()));
                continue;
            }
            if let Some(rest) = strip_keyword(line, "BASE") {
                in_exports = false;
                def.image_base = Some(parse_number(rest.trim(), line_no, "BASE")?);
                continue;
            }
            if let Some(rest) = strip_keyword(line, "HEAPSIZE") {
                in_exports = false;
                def.heap_size = Some(parse_number(rest.trim(), line_no, "HEAPSIZE")? as u32);
                continue;
            }
            if let Some(rest) = strip_keyword(line, "STACKSIZE") {
                in_exports = false;
                def.stack_size = Some(parse_number(rest.trim(), line_no, "STACKSIZE")? as u32);
                continue;
            }
            if strip_keyword(line, "EXPORTS").is_some() {
                in_exports = true;
                continue;
            }

            if in_exports {
                def.exports.push(parse_export_line(line, line_no)?);
            }
        }

        Ok(def)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    if line.len() < keyword.len() || !line[..keyword.len()].eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &line[keyword.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

fn parse_number(s: &str, line: usize, keyword: &'static str) -> Result<u64, DefFileError> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|_| DefFileError::ExpectedNumber { line, keyword })
}

/// Parses one `EXPORTS` entry: `name[=internal] [@ordinal [NONAME]] [DATA]`.
fn parse_export_line(line: &str, line_no: usize) -> Result<ExportSpec, DefFileError> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next().ok_or_else(|| DefFileError::MalformedExport { line: line_no, text: line.to_string() })?;

    let (name, internal_name) = match first.split_once('=') {
        Some((a, b)) => (a.to_string(), Some(b.to_string())),
        None => (first.to_string(), None),
    };
    if name.is_empty() {
        return Err(DefFileError::MalformedExport { line: line_no, text: line.to_string() });
    }

    let mut ordinal = None;
    let mut no_name = false;
    let mut is_data = false;

    for tok in tokens {
        if let Some(ord_str) = tok.strip_prefix('@') {
            ordinal = Some(
                ord_str
                    .parse::<u32>()
                    .map_err(|_| DefFileError::MalformedExport { line: line_no, text: line.to_string() })?,
            );
        } else if tok.eq_ignore_ascii_case("NONAME") {
            no_name = true;
        } else if tok.eq_ignore_ascii_case("DATA") {
            is_data = true;
        } else if tok.eq_ignore_ascii_case("PRIVATE") || tok.eq_ignore_ascii_case("CONSTANT") {
            // accepted, currently no effect on generated exports
        } else {
            return Err(DefFileError::MalformedExport { line: line_no, text: line.to_string() });
        }
    }

    if no_name && ordinal.is_none() {
        return Err(DefFileError::MalformedExport { line: line_no, text: line.to_string() });
    }

    Ok(ExportSpec { name, internal_name, ordinal, no_name, is_data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_keywords() {
        let text = r#"
            LIBRARY "mymod"
            DESCRIPTION "test module"
            BASE 0x10000000
            HEAPSIZE 1048576
            STACKSIZE 65536
            EXPORTS
            foo
        "#;
        let def = DefFile::parse(text).unwrap();
        assert_eq!(def.library_name.as_deref(), Some("mymod"));
        assert_eq!(def.description.as_deref(), Some("test module"));
        assert_eq!(def.image_base, Some(0x1000_0000));
        assert_eq!(def.heap_size, Some(1_048_576));
        assert_eq!(def.stack_size, Some(65_536));
    }

    #[test]
    fn parses_export_variants() {
        let text = "EXPORTS\nfoo\nbar=bar_impl\nbaz @7\nqux=qux_impl @3 NONAME DATA\n";
        let def = DefFile::parse(text).unwrap();
        assert_eq!(
            def.exports,
            vec![
                ExportSpec { name: "foo".into(), internal_name: None, ordinal: None, no_name: false, is_data: false },
                ExportSpec { name: "bar".into(), internal_name: Some("bar_impl".into()), ordinal: None, no_name: false, is_data: false },
                ExportSpec { name: "baz".into(), internal_name: None, ordinal: Some(7), no_name: false, is_data: false },
                ExportSpec { name: "qux".into(), internal_name: Some("qux_impl".into()), ordinal: Some(3), no_name: true, is_data: true },
            ]
        );
    }

    #[test]
    fn noname_without_ordinal_is_rejected() {
        let err = DefFile::parse("EXPORTS\nfoo NONAME\n").unwrap_err();
        assert!(matches!(err, DefFileError::MalformedExport { .. }));
    }

    #[test]
    fn strips_semicolon_comments() {
        let text = "; top comment\nEXPORTS\nfoo ; trailing\n";
        let def = DefFile::parse(text).unwrap();
        assert_eq!(def.exports.len(), 1);
        assert_eq!(def.exports[0].name, "foo");
    }
}
