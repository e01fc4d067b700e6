//! Small owned XML element tree.
//!
//! Vendor XML payloads are a few kilobytes at most, so they are read fully into
//! an [`XmlElement`] tree with quick-xml and navigated in memory.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::metadata::{MetaValue, MetadataMap};

/// Nesting deeper than this is rejected.
const MAX_DEPTH: usize = 256;

/// Errors that can occur while building an element tree
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// Error from the XML tokenizer
    #[error("XML parsing error: {0}")]
    Parse(#[from] quick_xml::Error),

    /// Malformed attribute
    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),

    /// No root element found
    #[error("document has no root element")]
    Empty,

    /// Document ended inside an element
    #[error("unclosed element <{0}> at end of document")]
    Unclosed(String),

    /// Elements nested beyond the supported depth
    #[error("elements nested deeper than {MAX_DEPTH}")]
    TooDeep,
}

/// One XML element with its attributes, text and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Tag name (including any prefix)
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Concatenated, trimmed text content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a document and return its root element.
    pub fn parse(text: &str) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(XmlError::TooDeep);
                    }
                    stack.push(Self::from_start(e)?);
                }
                Event::Empty(ref e) => {
                    let element = Self::from_start(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => return Ok(element),
                    }
                }
                Event::Text(ref t) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&t.unescape()?);
                    }
                }
                Event::CData(ref c) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(&String::from_utf8_lossy(c));
                    }
                }
                Event::End(_) => {
                    let Some(done) = stack.pop() else {
                        continue;
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                Event::Eof => {
                    return match stack.pop() {
                        Some(open) => Err(XmlError::Unclosed(open.name)),
                        None => Err(XmlError::Empty),
                    };
                }
                _ => {}
            }
        }
    }

    /// Parse raw bytes, tolerating trailing NUL padding and invalid UTF-8.
    pub fn parse_bytes(bytes: &[u8]) -> Result<XmlElement, XmlError> {
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        Self::parse(&String::from_utf8_lossy(&bytes[..end]))
    }

    fn from_start(e: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(XmlElement {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    /// First direct child named `name`
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children named `name`
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant named `name`, depth-first, excluding `self`
    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        self.children
            .iter()
            .find_map(|c| if c.name == name { Some(c) } else { c.find_descendant(name) })
    }

    /// Follow a path of child names
    pub fn at_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&XmlElement> {
        path.iter()
            .try_fold(self, |node, name| node.child(name.as_ref()))
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text content, `None` when empty
    pub fn text(&self) -> Option<&str> {
        (!self.text.is_empty()).then_some(self.text.as_str())
    }

    /// Convert to a nested metadata value.
    ///
    /// Leaf elements without attributes become text. Otherwise attributes are
    /// stored as `@name`, text as `#text`, and repeated children as lists.
    pub fn to_metadata(&self) -> MetaValue {
        if self.attributes.is_empty() && self.children.is_empty() {
            return if self.text.is_empty() {
                MetaValue::Null
            } else {
                MetaValue::Text(self.text.clone())
            };
        }
        let mut map = MetadataMap::new();
        for (key, value) in &self.attributes {
            map.insert(format!("@{key}"), MetaValue::Text(value.clone()));
        }
        for child in &self.children {
            let value = child.to_metadata();
            match map.get_mut(&child.name) {
                Some(MetaValue::List(items)) => items.push(value),
                Some(existing) => {
                    let first = std::mem::replace(existing, MetaValue::Null);
                    *existing = MetaValue::List(vec![first, value]);
                }
                None => {
                    map.insert(child.name.clone(), value);
                }
            }
        }
        if !self.text.is_empty() {
            map.insert("#text".into(), MetaValue::Text(self.text.clone()));
        }
        MetaValue::Map(map)
    }

    /// Metadata map with the root element name as the single key
    pub fn to_metadata_map(&self) -> MetadataMap {
        MetadataMap::from([(self.name.clone(), self.to_metadata())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIBICS: &str = r#"<?xml version="1.0"?>
<Fibics version="1.0">
  <Application><Version>Fibics NPVE v4.5</Version></Application>
  <DetectorInfo>
    <item name="Collector Voltage">=500.0 V</item>
    <item name="Stage Bias Voltage">=0 V</item>
  </DetectorInfo>
</Fibics>"#;

    #[test]
    fn test_parse_tree() {
        let root = XmlElement::parse(FIBICS).unwrap();
        assert_eq!(root.name, "Fibics");
        assert_eq!(root.attribute("version"), Some("1.0"));
        assert_eq!(
            root.at_path(&["Application", "Version"]).and_then(XmlElement::text),
            Some("Fibics NPVE v4.5")
        );
        let detector = root.child("DetectorInfo").unwrap();
        let item = detector
            .children_named("item")
            .find(|i| i.attribute("name") == Some("Collector Voltage"))
            .unwrap();
        assert_eq!(item.text(), Some("=500.0 V"));
        assert!(root.find_descendant("item").is_some());
    }

    #[test]
    fn test_to_metadata_groups_repeated_children() {
        let root = XmlElement::parse(FIBICS).unwrap();
        let map = root.to_metadata_map();
        let fibics = map["Fibics"].as_map().unwrap();
        assert_eq!(fibics["@version"], MetaValue::from("1.0"));
        let items = match &fibics["DetectorInfo"].as_map().unwrap()["item"] {
            MetaValue::List(items) => items,
            other => panic!("expected list, got {other:?}"),
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_map().unwrap()["#text"], MetaValue::from("=500.0 V"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(XmlElement::parse("<a><b></b>"), Err(XmlError::Unclosed(_))));
        assert!(matches!(XmlElement::parse(""), Err(XmlError::Empty)));
        assert!(XmlElement::parse("<a></b>").is_err());
        assert!(XmlElement::parse("not xml at all").is_err());
    }

    #[test]
    fn test_parse_bytes_trims_padding() {
        let root = XmlElement::parse_bytes(b"<ImageTags><X>1</X></ImageTags>\0\0\0").unwrap();
        assert_eq!(root.name, "ImageTags");
    }
}
