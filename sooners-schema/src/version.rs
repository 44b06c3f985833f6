//! Versioned schema documents.
//!
//! A version document is the canonical XML snapshot of a component's
//! declared tables at a numbered version. The checksum is the base64url
//! SHA3-384 of the canonical serialization, computed on the attribute-free
//! structural form before the pretty-printed file is written, so two
//! documents with equal checksums have equal structural content.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use sha3::{Digest, Sha3_384};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::model::TableDef;
use crate::xml::XmlNode;

/// Length of a base64url-encoded SHA3-384 digest.
pub const CHECKSUM_LEN: usize = 64;

/// Compute the document checksum of a body string.
pub fn checksum_of(body: &str) -> String {
    let digest = Sha3_384::digest(body.as_bytes());
    URL_SAFE.encode(digest)
}

/// A component's schema at a numbered version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionDocument {
    /// Owning component.
    pub component: SmolStr,
    /// Version number (≥ 1 once written).
    pub version: u32,
    /// Checksum over the canonical serialization.
    pub checksum: String,
    /// Logical tables in canonical order.
    pub tables: Vec<TableDef>,
}

impl VersionDocument {
    /// Snapshot the declared models of a component. Returns `None` when the
    /// component declares zero tables.
    pub fn from_models(component: impl Into<SmolStr>, models: &[TableDef]) -> Option<Self> {
        if models.is_empty() {
            return None;
        }
        let tables = order_tables(models);
        let mut doc = Self {
            component: component.into(),
            version: 0,
            checksum: String::new(),
            tables,
        };
        doc.checksum = doc.compute_checksum();
        Some(doc)
    }

    /// The attribute-free structural form the checksum is computed over.
    pub fn structural_node(&self) -> XmlNode {
        let mut root = XmlNode::new("MetaData");
        for table in &self.tables {
            root.children.push(table.to_node());
        }
        root
    }

    /// Recompute the checksum from the current structural content.
    pub fn compute_checksum(&self) -> String {
        // The canonical writer cannot fail on an in-memory tree.
        let body = self
            .structural_node()
            .to_canonical_string()
            .unwrap_or_default();
        checksum_of(&body)
    }

    /// The full document element as written to disk, carrying the engine
    /// source tag and the version/checksum attributes.
    pub fn document_node(&self, source_tag: &str) -> XmlNode {
        let mut root = self.structural_node();
        root.attrs.insert(0, ("sooners".to_string(), source_tag.to_string()));
        root.attrs
            .insert(1, ("component".to_string(), self.component.to_string()));
        root.attrs
            .insert(2, ("version".to_string(), format!("{:04}", self.version)));
        root.attrs
            .insert(3, ("checksum".to_string(), self.checksum.clone()));
        root
    }

    /// Reconstruct a document from its root element, re-verifying the
    /// stored checksum against the recomputed canonical hash.
    pub fn parse_node(node: &XmlNode) -> SchemaResult<Self> {
        if node.name != "MetaData" {
            return Err(SchemaError::invalid_document(format!(
                "expected <MetaData>, found <{}>",
                node.name
            )));
        }
        let component = SmolStr::new(node.require_attr("component")?);
        let version_text = node.require_attr("version")?;
        let version: u32 = version_text
            .parse()
            .map_err(|_| SchemaError::invalid_attribute("version", version_text))?;
        let stored = node.require_attr("checksum")?.to_string();

        let mut tables = Vec::new();
        for child in &node.children {
            tables.push(TableDef::from_node(child)?);
        }

        let doc = Self {
            component: component.clone(),
            version,
            checksum: stored.clone(),
            tables,
        };
        let computed = doc.compute_checksum();
        if computed != stored {
            return Err(SchemaError::ChecksumMismatch {
                component: component.to_string(),
                version,
                stored,
                computed,
            });
        }
        Ok(doc)
    }

    /// Parse a document from file text.
    pub fn parse_str(text: &str) -> SchemaResult<Self> {
        Self::parse_node(&XmlNode::parse_str(text)?)
    }

    /// Look up a logical table by name.
    pub fn find_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Canonical table order: prioritized tables first (lexicographically),
/// then declaration order.
fn order_tables(models: &[TableDef]) -> Vec<TableDef> {
    let mut tables: Vec<TableDef> = models.to_vec();
    tables.sort_by_key(|table| (table.priority.is_none(), table.priority.clone()));
    tables
}
