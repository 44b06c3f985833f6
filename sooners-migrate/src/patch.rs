//! Patch documents: the structural diff between two adjacent versions.
//!
//! The grammar is four entry kinds per sub-entity kind K: `KCreate`, `K`
//! (unchanged), `KRename`, `KDrop`. Unchanged and renamed table entries
//! recurse: their bodies repeat the same grammar for the next nesting level
//! (columns, constraints, indexes).

use smol_str::SmolStr;

use sooners_schema::xml::XmlNode;

use crate::error::{MigrateResult, MigrationError};

/// The sub-entity kinds a patch can mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Table,
    ShardTable,
    Column,
    PrimaryKeyConstraint,
    ForeignKeyConstraint,
    UniqueConstraint,
    CheckConstraint,
    Index,
}

impl EntityKind {
    /// Kinds at the document level. Shard tables resolve first so that a
    /// plain-to-sharded split creates every entity table before the
    /// original drops.
    pub const METADATA: [EntityKind; 2] = [EntityKind::ShardTable, EntityKind::Table];

    /// Kinds inside a table entry, in emission order.
    pub const TABLE: [EntityKind; 6] = [
        EntityKind::Column,
        EntityKind::PrimaryKeyConstraint,
        EntityKind::ForeignKeyConstraint,
        EntityKind::UniqueConstraint,
        EntityKind::CheckConstraint,
        EntityKind::Index,
    ];

    /// Base element name of this kind.
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Table => "Table",
            Self::ShardTable => "ShardTable",
            Self::Column => "Column",
            Self::PrimaryKeyConstraint => "PrimaryKeyConstraint",
            Self::ForeignKeyConstraint => "ForeignKeyConstraint",
            Self::UniqueConstraint => "UniqueConstraint",
            Self::CheckConstraint => "CheckConstraint",
            Self::Index => "Index",
        }
    }

    /// Whether entries of this kind carry a nested entry level.
    pub fn recurses(&self) -> bool {
        matches!(self, Self::Table | Self::ShardTable)
    }
}

/// What happened to one named entity between the two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    Create,
    Unchanged,
    Rename,
    Drop,
}

impl PatchAction {
    fn suffix(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Unchanged => "",
            Self::Rename => "Rename",
            Self::Drop => "Drop",
        }
    }
}

/// One patch entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchEntry {
    /// Entity kind.
    pub kind: EntityKind,
    /// Action.
    pub action: PatchAction,
    /// Name on the before side (`None` for creates).
    pub name0: Option<SmolStr>,
    /// Name on the after side (`None` for drops).
    pub name1: Option<SmolStr>,
    /// Nested entries for unchanged/renamed table entries.
    pub children: Vec<PatchEntry>,
}

impl PatchEntry {
    /// A `KCreate` entry.
    pub fn create(kind: EntityKind, name: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            action: PatchAction::Create,
            name0: None,
            name1: Some(name.into()),
            children: Vec::new(),
        }
    }

    /// An unchanged `K` entry.
    pub fn unchanged(kind: EntityKind, name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        Self {
            kind,
            action: PatchAction::Unchanged,
            name0: Some(name.clone()),
            name1: Some(name),
            children: Vec::new(),
        }
    }

    /// A `KRename` entry.
    pub fn rename(
        kind: EntityKind,
        name0: impl Into<SmolStr>,
        name1: impl Into<SmolStr>,
    ) -> Self {
        Self {
            kind,
            action: PatchAction::Rename,
            name0: Some(name0.into()),
            name1: Some(name1.into()),
            children: Vec::new(),
        }
    }

    /// A `KDrop` entry.
    pub fn drop(kind: EntityKind, name: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            action: PatchAction::Drop,
            name0: Some(name.into()),
            name1: None,
            children: Vec::new(),
        }
    }

    /// Element name of this entry.
    pub fn node_name(&self) -> String {
        format!("{}{}", self.kind.base_name(), self.action.suffix())
    }

    /// The before-side name; every action except `Create` carries one.
    pub fn source_name(&self) -> MigrateResult<&SmolStr> {
        self.name0.as_ref().ok_or_else(|| {
            MigrationError::invalid_patch(format!(
                "<{}> has no before-side name",
                self.node_name()
            ))
        })
    }

    /// The after-side name; every action except `Drop` carries one.
    pub fn target_name(&self) -> MigrateResult<&SmolStr> {
        self.name1.as_ref().ok_or_else(|| {
            MigrationError::invalid_patch(format!(
                "<{}> has no after-side name",
                self.node_name()
            ))
        })
    }

    /// Serialize to an element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new(self.node_name());
        match self.action {
            PatchAction::Create => {
                node.set_attr("name", self.name1.as_deref().unwrap_or_default());
            }
            PatchAction::Unchanged | PatchAction::Drop => {
                node.set_attr("name", self.name0.as_deref().unwrap_or_default());
            }
            PatchAction::Rename => {
                node.set_attr("name0", self.name0.as_deref().unwrap_or_default());
                node.set_attr("name1", self.name1.as_deref().unwrap_or_default());
            }
        }
        for child in &self.children {
            node.children.push(child.to_node());
        }
        node
    }

    fn from_node(node: &XmlNode, kinds: &[EntityKind]) -> MigrateResult<Self> {
        let (kind, action) = kinds
            .iter()
            .find_map(|kind| {
                let base = kind.base_name();
                let action = match node.name.as_str() {
                    name if name == base => PatchAction::Unchanged,
                    name if name.strip_prefix(base) == Some("Create") => PatchAction::Create,
                    name if name.strip_prefix(base) == Some("Rename") => PatchAction::Rename,
                    name if name.strip_prefix(base) == Some("Drop") => PatchAction::Drop,
                    _ => return None,
                };
                Some((*kind, action))
            })
            .ok_or_else(|| {
                MigrationError::invalid_patch(format!("unknown patch element <{}>", node.name))
            })?;

        let mut entry = match action {
            PatchAction::Create => Self::create(kind, attr(node, "name")?),
            PatchAction::Unchanged => Self::unchanged(kind, attr(node, "name")?),
            PatchAction::Rename => {
                Self::rename(kind, attr(node, "name0")?, attr(node, "name1")?)
            }
            PatchAction::Drop => Self::drop(kind, attr(node, "name")?),
        };

        if !node.children.is_empty() {
            if !kind.recurses() || !matches!(action, PatchAction::Unchanged | PatchAction::Rename)
            {
                return Err(MigrationError::invalid_patch(format!(
                    "<{}> must not carry nested entries",
                    node.name
                )));
            }
            for child in &node.children {
                entry
                    .children
                    .push(Self::from_node(child, &EntityKind::TABLE)?);
            }
        }
        Ok(entry)
    }
}

fn attr(node: &XmlNode, name: &str) -> MigrateResult<SmolStr> {
    node.attr(name).map(SmolStr::new).ok_or_else(|| {
        MigrationError::invalid_patch(format!(
            "element <{}> is missing attribute '{name}'",
            node.name
        ))
    })
}

/// The structural diff between `version0` and `version1` of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchDocument {
    /// Owning component.
    pub component: SmolStr,
    /// The lower version of the pair.
    pub version0: u32,
    /// The higher version of the pair.
    pub version1: u32,
    /// Document-level entries, in generation order.
    pub entries: Vec<PatchEntry>,
}

impl PatchDocument {
    /// Serialize to a `<Patch>` element (without the engine source tag;
    /// the component history writer stamps it).
    pub fn to_node(&self) -> XmlNode {
        let mut root = XmlNode::new("Patch");
        root.set_attr("component", self.component.as_str());
        root.set_attr("version0", format!("{:04}", self.version0));
        root.set_attr("version1", format!("{:04}", self.version1));
        for entry in &self.entries {
            root.children.push(entry.to_node());
        }
        root
    }

    /// Reconstruct from a `<Patch>` element.
    pub fn from_node(node: &XmlNode) -> MigrateResult<Self> {
        if node.name != "Patch" {
            return Err(MigrationError::invalid_patch(format!(
                "expected <Patch>, found <{}>",
                node.name
            )));
        }
        let version0 = parse_version(node, "version0")?;
        let version1 = parse_version(node, "version1")?;
        let mut entries = Vec::new();
        for child in &node.children {
            entries.push(PatchEntry::from_node(child, &EntityKind::METADATA)?);
        }
        Ok(Self {
            component: attr(node, "component")?,
            version0,
            version1,
            entries,
        })
    }
}

fn parse_version(node: &XmlNode, name: &str) -> MigrateResult<u32> {
    let text = attr(node, name)?;
    text.parse::<u32>()
        .map_err(|_| MigrationError::invalid_patch(format!("invalid {name}: {text:?}")))
}
