//! Components and their on-disk history.
//!
//! A component is a named unit of schema ownership with a `history/`
//! directory of numbered version documents and adjacent patch files.
//! Parsed documents are cached per process; the caches are append-only.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::version::VersionDocument;
use crate::xml::XmlNode;

/// A schema-owning component.
#[derive(Debug)]
pub struct Component {
    /// Unique component name.
    pub name: SmolStr,
    /// Owned by this repository (as opposed to vendored).
    pub is_local: bool,
    root: PathBuf,
    history_dir: PathBuf,
    cached_versions: RefCell<HashMap<u32, Rc<VersionDocument>>>,
    cached_patches: RefCell<HashMap<(u32, u32), Rc<XmlNode>>>,
}

impl Component {
    /// A component rooted at `root`; its history lives in `root/history`.
    pub fn new(name: impl Into<SmolStr>, root: impl Into<PathBuf>, is_local: bool) -> Self {
        let root = root.into();
        let history_dir = root.join("history");
        Self {
            name: name.into(),
            is_local,
            root,
            history_dir,
            cached_versions: RefCell::new(HashMap::new()),
            cached_patches: RefCell::new(HashMap::new()),
        }
    }

    /// Component root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// History directory.
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    /// File name of a version document.
    pub fn version_fname(version: u32) -> String {
        format!("version.{version:04}.xml")
    }

    /// Path of a version document.
    pub fn version_path(&self, version: u32) -> PathBuf {
        self.history_dir.join(Self::version_fname(version))
    }

    /// File name of a patch document.
    pub fn patch_fname(version0: u32, version1: u32) -> String {
        format!("patch.{version0:04}.{version1:04}.xml")
    }

    /// Path of a patch document.
    pub fn patch_path(&self, version0: u32, version1: u32) -> PathBuf {
        self.history_dir.join(Self::patch_fname(version0, version1))
    }

    /// All version numbers present in the history, ascending.
    pub fn version_numbers(&self) -> SchemaResult<Vec<u32>> {
        let mut versions = Vec::new();
        if !self.history_dir.is_dir() {
            return Ok(versions);
        }
        for entry in fs::read_dir(&self.history_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let mut parts = name.split('.');
            if parts.next() != Some("version") {
                continue;
            }
            let (Some(number), Some("xml"), None) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if let Ok(version) = number.parse::<u32>() {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Parse a version document, verifying its checksum, component and
    /// version number. Cached.
    pub fn version_parse(&self, version: u32) -> SchemaResult<Rc<VersionDocument>> {
        if let Some(doc) = self.cached_versions.borrow().get(&version) {
            return Ok(Rc::clone(doc));
        }
        let path = self.version_path(version);
        if !path.is_file() {
            return Err(SchemaError::VersionNotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(&path)?;
        let doc = VersionDocument::parse_str(&text)?;
        if doc.component != self.name {
            return Err(SchemaError::invalid_document(format!(
                "{}: document belongs to component '{}', expected '{}'",
                path.display(),
                doc.component,
                self.name
            )));
        }
        if doc.version != version {
            return Err(SchemaError::invalid_document(format!(
                "{}: document carries version {}, expected {}",
                path.display(),
                doc.version,
                version
            )));
        }
        let doc = Rc::new(doc);
        self.cached_versions
            .borrow_mut()
            .insert(version, Rc::clone(&doc));
        Ok(doc)
    }

    /// Parse every version in the history, ascending.
    pub fn version_parse_all(&self) -> SchemaResult<Vec<Rc<VersionDocument>>> {
        self.version_numbers()?
            .into_iter()
            .map(|version| self.version_parse(version))
            .collect()
    }

    /// Write a version document under `history/`, stamping the document
    /// attributes. The checksum was computed before this pretty-print.
    pub fn version_write(
        &self,
        doc: &mut VersionDocument,
        version: u32,
        source_tag: &str,
    ) -> SchemaResult<PathBuf> {
        doc.version = version;
        fs::create_dir_all(&self.history_dir)?;
        let path = self.version_path(version);
        let text = doc.document_node(source_tag).to_pretty_string()?;
        fs::write(&path, text)?;
        self.cached_versions
            .borrow_mut()
            .insert(version, Rc::new(doc.clone()));
        tracing::info!(component = %self.name, version, "wrote version document");
        Ok(path)
    }

    /// Parse a patch document's root element. Cached. Interpretation is up
    /// to the caller.
    pub fn patch_parse(&self, version0: u32, version1: u32) -> SchemaResult<Rc<XmlNode>> {
        let key = (version0, version1);
        if let Some(node) = self.cached_patches.borrow().get(&key) {
            return Ok(Rc::clone(node));
        }
        let path = self.patch_path(version0, version1);
        if !path.is_file() {
            return Err(SchemaError::VersionNotFound(path.display().to_string()));
        }
        let node = Rc::new(XmlNode::parse_str(&fs::read_to_string(&path)?)?);
        self.cached_patches
            .borrow_mut()
            .insert(key, Rc::clone(&node));
        Ok(node)
    }

    /// Write a patch document under `history/`, stamping the document
    /// attributes.
    pub fn patch_write(
        &self,
        node: &mut XmlNode,
        version0: u32,
        version1: u32,
        source_tag: &str,
    ) -> SchemaResult<PathBuf> {
        node.set_attr("sooners", source_tag);
        node.set_attr("component", self.name.as_str());
        node.set_attr("version0", format!("{version0:04}"));
        node.set_attr("version1", format!("{version1:04}"));
        fs::create_dir_all(&self.history_dir)?;
        let path = self.patch_path(version0, version1);
        fs::write(&path, node.to_pretty_string()?)?;
        self.cached_patches
            .borrow_mut()
            .insert((version0, version1), Rc::new(node.clone()));
        tracing::info!(component = %self.name, version0, version1, "wrote patch document");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, TableDef};
    use crate::types::ColumnType;

    fn sample_doc(component: &str) -> VersionDocument {
        VersionDocument::from_models(
            component,
            &[TableDef::new("t0").column(ColumnDef::new("id", ColumnType::Integer).primary_key())],
        )
        .unwrap()
    }

    #[test]
    fn test_version_write_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let component = Component::new("sample1", dir.path(), true);
        let mut doc = sample_doc("sample1");
        component.version_write(&mut doc, 1, "sooners-0.1").unwrap();

        let loaded = component.version_parse(1).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.checksum, doc.checksum);
        assert_eq!(component.version_numbers().unwrap(), vec![1]);
    }

    #[test]
    fn test_version_parse_rejects_foreign_component() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Component::new("sample1", dir.path(), true);
        let mut doc = sample_doc("sample1");
        writer.version_write(&mut doc, 1, "sooners-0.1").unwrap();

        let reader = Component::new("other", dir.path(), true);
        assert!(reader.version_parse(1).is_err());
    }

    #[test]
    fn test_missing_version_reported() {
        let dir = tempfile::tempdir().unwrap();
        let component = Component::new("sample1", dir.path(), true);
        assert!(matches!(
            component.version_parse(7),
            Err(SchemaError::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_patch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let component = Component::new("sample1", dir.path(), true);
        let mut patch = XmlNode::new("Patch");
        let mut entry = XmlNode::new("TableCreate");
        entry.set_attr("name", "t0");
        patch.children.push(entry);
        component
            .patch_write(&mut patch, 1, 2, "sooners-0.1")
            .unwrap();

        let loaded = component.patch_parse(1, 2).unwrap();
        assert_eq!(loaded.attr("component"), Some("sample1"));
        assert_eq!(loaded.attr("version0"), Some("0001"));
        assert_eq!(loaded.children.len(), 1);
    }

    #[test]
    fn test_version_numbers_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let component = Component::new("sample1", dir.path(), true);
        for version in [3u32, 1, 2] {
            let mut doc = sample_doc("sample1");
            component
                .version_write(&mut doc, version, "sooners-0.1")
                .unwrap();
        }
        assert_eq!(component.version_numbers().unwrap(), vec![1, 2, 3]);
    }
}
