//! INI text as written by FEI/Thermo and Tescan instruments.
//!
//! Keys keep their case; `;` and `#` start comment lines; lines without `=`
//! are ignored. Duplicate section names are an error, so FEI MultiGIS blocks
//! must go through [`rewrite_multigis_sections`] first.

use regex::Regex;
use std::sync::LazyLock;

use crate::metadata::{MetaValue, MetadataMap};

static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]\r\n]*)\]\s*$").expect("static regex"));

static MULTIGIS_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^MultiGISUnit\d+$").expect("static regex"));

static MULTIGIS_GAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^MultiGISGas\d+$").expect("static regex"));

/// Errors produced while parsing INI text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IniError {
    /// The same section header appears twice
    #[error("duplicate section [{name}] at line {line}")]
    DuplicateSection {
        /// Section name
        name: String,
        /// 1-based line number of the second header
        line: usize,
    },

    /// A key appears before the first section header
    #[error("key/value pair before any section header at line {0}")]
    MissingSectionHeader(usize),

    /// A header with an empty name
    #[error("empty section name at line {0}")]
    EmptySectionName(usize),
}

/// One `[section]` with its entries in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    /// Section name without brackets
    pub name: String,
    entries: Vec<(String, String)>,
}

impl IniSection {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value for `key`; exact match first, then ASCII case-insensitive
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .or_else(|| self.entries.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v.as_str())
    }

    /// Entries in file order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parsed INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<IniSection>,
}

impl IniDocument {
    /// Parse INI text.
    pub fn parse(text: &str) -> Result<IniDocument, IniError> {
        let mut sections: Vec<IniSection> = Vec::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = SECTION_HEADER.captures(line) {
                let name = caps[1].trim().to_string();
                if name.is_empty() {
                    return Err(IniError::EmptySectionName(line_no));
                }
                if sections.iter().any(|s| s.name == name) {
                    return Err(IniError::DuplicateSection { name, line: line_no });
                }
                sections.push(IniSection::new(name));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let current = sections
                .last_mut()
                .ok_or(IniError::MissingSectionHeader(line_no))?;
            current.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(IniDocument { sections })
    }

    /// Section by name; exact match first, then ASCII case-insensitive
    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    /// Value of `key` in `section`
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    /// Whether a section exists
    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// Sections in file order
    pub fn sections(&self) -> impl Iterator<Item = &IniSection> {
        self.sections.iter()
    }

    /// Whether the document has no sections
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// `{section: {key: text}}` view of the document
    pub fn to_metadata(&self) -> MetadataMap {
        self.sections
            .iter()
            .map(|section| {
                let entries = section
                    .entries()
                    .map(|(k, v)| (k.to_string(), MetaValue::Text(v.to_string())))
                    .collect::<MetadataMap>();
                (section.name.clone(), MetaValue::Map(entries))
            })
            .collect()
    }
}

/// Decode raw tag bytes: drop NULs, replace invalid UTF-8, normalize line endings.
pub fn sanitize(bytes: &[u8]) -> String {
    let cleaned: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&cleaned)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

/// Give every `[MultiGISGasN]` that follows a `[MultiGISUnitM]` header the
/// unique name `[MultiGISUnitM.MultiGISGasN]`.
///
/// Units are processed in file order; any other section header ends the
/// current unit. Gas sections before the first unit keep their names.
pub fn rewrite_multigis_sections(text: &str) -> String {
    let mut current_unit: Option<String> = None;
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];
        if let Some(caps) = SECTION_HEADER.captures(body) {
            let name = caps[1].trim();
            if MULTIGIS_UNIT.is_match(name) {
                current_unit = Some(name.to_string());
            } else if MULTIGIS_GAS.is_match(name) {
                if let Some(unit) = &current_unit {
                    out.push_str(&format!("[{unit}.{name}]"));
                    out.push_str(ending);
                    continue;
                }
            } else {
                current_unit = None;
            }
        }
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_keys() {
        let doc = IniDocument::parse("[User]\nDate=03/01/2024\n; comment\n[Beam]\nHV=30000\nno equals sign\n").unwrap();
        assert_eq!(doc.get("User", "Date"), Some("03/01/2024"));
        assert_eq!(doc.get("beam", "hv"), Some("30000"));
        assert!(doc.get("Beam", "Missing").is_none());
        assert_eq!(doc.sections().count(), 2);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let doc = IniDocument::parse("[A]\nExpr=a=b\n").unwrap();
        assert_eq!(doc.get("A", "Expr"), Some("a=b"));
    }

    #[test]
    fn test_duplicate_section_rejected() {
        let err = IniDocument::parse("[A]\nx=1\n[A]\ny=2\n").unwrap_err();
        assert_eq!(err, IniError::DuplicateSection { name: "A".into(), line: 3 });
    }

    #[test]
    fn test_key_before_header_rejected() {
        assert_eq!(
            IniDocument::parse("x=1\n[A]\n").unwrap_err(),
            IniError::MissingSectionHeader(1)
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(b"[A]\r\nx=1\0\0\ry=2"), "[A]\nx=1\ny=2");
    }

    #[test]
    fn test_multigis_rewrite() {
        let text = "[MultiGISUnit1]\na=1\n[MultiGISGas1]\nb=2\n[MultiGISGas2]\nc=3\n\
                    [MultiGISUnit2]\n[MultiGISGas1]\nd=4\n[Beam]\nHV=1\n";
        let rewritten = rewrite_multigis_sections(text);
        assert!(rewritten.contains("[MultiGISUnit1.MultiGISGas1]\nb=2"));
        assert!(rewritten.contains("[MultiGISUnit1.MultiGISGas2]"));
        assert!(rewritten.contains("[MultiGISUnit2.MultiGISGas1]\nd=4"));
        let doc = IniDocument::parse(&rewritten).unwrap();
        assert_eq!(doc.get("MultiGISUnit2.MultiGISGas1", "d"), Some("4"));
        assert_eq!(doc.get("Beam", "HV"), Some("1"));
    }

    #[test]
    fn test_multigis_gas_outside_unit_untouched() {
        let text = "[MultiGISGas1]\na=1\n[Beam]\n[MultiGISGas2]\n";
        assert_eq!(rewrite_multigis_sections(text), text);
    }
}
