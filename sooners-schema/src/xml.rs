//! Minimal XML element tree used by version and patch documents.
//!
//! Documents in the history directory are small and fully structural, so a
//! plain owned tree is a better fit than streaming: the canonical form of a
//! tree is what gets hashed, and patch generation walks two trees in
//! parallel.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{SchemaError, SchemaResult};

/// One XML element: name, attributes in declaration order, child elements.
///
/// Text content is not modeled; the schema documents carry all data in
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    /// Element name.
    pub name: String,
    /// Attributes in declaration order.
    pub attrs: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Create an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Look up an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Look up an attribute value, failing when absent.
    pub fn require_attr(&self, name: &str) -> SchemaResult<&str> {
        self.attr(name).ok_or_else(|| {
            SchemaError::invalid_document(format!(
                "element <{}> is missing attribute '{}'",
                self.name, name
            ))
        })
    }

    /// Set or replace an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Iterate children with a given element name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Serialize without any whitespace. This is the canonical form the
    /// checksum is computed over.
    pub fn to_canonical_string(&self) -> SchemaResult<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_into(&mut writer)?;
        let bytes = writer.into_inner();
        String::from_utf8(bytes)
            .map_err(|e| SchemaError::invalid_document(format!("non-UTF8 serialization: {e}")))
    }

    /// Serialize with an XML declaration and two-space indentation, for the
    /// files written under `history/`.
    pub fn to_pretty_string(&self) -> SchemaResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        self.write_into(&mut writer)?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes)
            .map_err(|e| SchemaError::invalid_document(format!("non-UTF8 serialization: {e}")))
    }

    fn write_into<W: std::io::Write>(&self, writer: &mut Writer<W>) -> SchemaResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (name, value) in &self.attrs {
            start.push_attribute((name.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            for child in &self.children {
                child.write_into(writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        }
        Ok(())
    }

    /// Parse the single root element of an XML document.
    pub fn parse_str(text: &str) -> SchemaResult<XmlNode> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    stack.push(node_from_start(&start)?);
                }
                Event::Empty(start) => {
                    let node = node_from_start(&start)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let node = stack.pop().ok_or_else(|| {
                        SchemaError::invalid_document("unbalanced closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Eof => break,
                // Declarations, comments and (trimmed) text are structural noise.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(SchemaError::invalid_document(
                "unclosed element at end of document".to_string(),
            ));
        }
        root.ok_or_else(|| SchemaError::invalid_document("empty document".to_string()))
    }
}

fn node_from_start(start: &BytesStart<'_>) -> SchemaResult<XmlNode> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut node = XmlNode::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(
    stack: &mut Vec<XmlNode>,
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> SchemaResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(SchemaError::invalid_document(
            "multiple root elements".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlNode {
        let mut root = XmlNode::new("MetaData");
        let mut table = XmlNode::new("Table");
        table.set_attr("name", "t0");
        let mut column = XmlNode::new("Column");
        column.set_attr("name", "id");
        column.set_attr("type", "Integer");
        table.children.push(column);
        root.children.push(table);
        root
    }

    #[test]
    fn test_canonical_round_trip() {
        let root = sample();
        let text = root.to_canonical_string().unwrap();
        assert_eq!(
            text,
            "<MetaData><Table name=\"t0\"><Column name=\"id\" type=\"Integer\"/></Table></MetaData>"
        );
        let parsed = XmlNode::parse_str(&text).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn test_pretty_round_trip() {
        let root = sample();
        let text = root.to_pretty_string().unwrap();
        assert!(text.starts_with("<?xml"));
        let parsed = XmlNode::parse_str(&text).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn test_attribute_escaping() {
        let mut node = XmlNode::new("Check");
        node.set_attr("expression", "a < b & c > \"d\"");
        let text = node.to_canonical_string().unwrap();
        let parsed = XmlNode::parse_str(&text).unwrap();
        assert_eq!(parsed.attr("expression"), Some("a < b & c > \"d\""));
    }

    #[test]
    fn test_require_attr_missing() {
        let node = XmlNode::new("Table");
        assert!(node.require_attr("name").is_err());
    }

    #[test]
    fn test_multiple_roots_rejected() {
        assert!(XmlNode::parse_str("<A/><B/>").is_err());
    }
}
