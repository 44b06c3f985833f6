//! Declarative table model.
//!
//! Applications declare their data model as plain [`TableDef`] values; the
//! engine consumes them directly. A `TableDef` is the logical declaration;
//! sharded tables expand into one physical entity table per shard suffix
//! when a snapshot is materialized.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::types::{ColumnType, bool_text, parse_bool};
use crate::xml::XmlNode;

/// A foreign key declared on a single column, referencing `table.column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Target as `table.column`.
    pub target: SmolStr,
    /// Optional constraint name.
    #[serde(default)]
    pub name: Option<SmolStr>,
    /// ON UPDATE action.
    #[serde(default)]
    pub onupdate: Option<SmolStr>,
    /// ON DELETE action.
    #[serde(default)]
    pub ondelete: Option<SmolStr>,
}

impl ForeignKeyRef {
    /// Reference `table.column` with no actions.
    pub fn new(target: impl Into<SmolStr>) -> Self {
        Self {
            target: target.into(),
            name: None,
            onupdate: None,
            ondelete: None,
        }
    }

    /// Set the ON DELETE action.
    pub fn ondelete(mut self, action: impl Into<SmolStr>) -> Self {
        self.ondelete = Some(action.into());
        self
    }

    /// Set the ON UPDATE action.
    pub fn onupdate(mut self, action: impl Into<SmolStr>) -> Self {
        self.onupdate = Some(action.into());
        self
    }

    /// The referenced table name.
    pub fn target_table(&self) -> &str {
        self.target.split('.').next().unwrap_or(&self.target)
    }

    /// The referenced column name.
    pub fn target_column(&self) -> &str {
        self.target.rsplit('.').next().unwrap_or(&self.target)
    }

    fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("ForeignKey");
        node.set_attr("column", self.target.as_str());
        if let Some(name) = &self.name {
            node.set_attr("name", name.as_str());
        }
        if let Some(onupdate) = &self.onupdate {
            node.set_attr("onupdate", onupdate.as_str());
        }
        if let Some(ondelete) = &self.ondelete {
            node.set_attr("ondelete", ondelete.as_str());
        }
        node
    }

    fn from_node(node: &XmlNode) -> SchemaResult<Self> {
        Ok(Self {
            target: SmolStr::new(node.require_attr("column")?),
            name: node.attr("name").map(SmolStr::new),
            onupdate: node.attr("onupdate").map(SmolStr::new),
            ondelete: node.attr("ondelete").map(SmolStr::new),
        })
    }
}

/// A column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: SmolStr,
    /// Column type.
    #[serde(flatten)]
    pub column_type: ColumnType,
    /// Part of the (column-level) primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Column-level unique constraint.
    #[serde(default)]
    pub unique: bool,
    /// Nullable unless declared otherwise. Primary keys are implicitly
    /// non-nullable.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default value in the type's canonical text form.
    #[serde(default)]
    pub default: Option<String>,
    /// Column comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Foreign keys on this column.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRef>,
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    /// A nullable column of the given type.
    pub fn new(name: impl Into<SmolStr>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            unique: false,
            nullable: true,
            default: None,
            comment: None,
            foreign_keys: Vec::new(),
        }
    }

    /// Mark as primary key. Primary keys are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value (canonical text form).
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the column comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Add a foreign key.
    pub fn foreign_key(mut self, foreign_key: ForeignKeyRef) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Serialize to a `<Column>` element. Foreign keys emit sorted by
    /// target fullname so the canonical form is declaration-order free.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Column");
        node.set_attr("name", self.name.as_str());
        self.column_type.save_to_node(&mut node);
        if self.primary_key {
            node.set_attr("primary_key", bool_text(true));
        } else if self.unique {
            node.set_attr("unique", bool_text(true));
        } else if !self.nullable {
            node.set_attr("nullable", bool_text(false));
        }
        if let Some(default) = &self.default {
            node.set_attr("default", default.as_str());
        }
        if let Some(comment) = &self.comment {
            node.set_attr("comment", comment.as_str());
        }
        let mut foreign_keys: Vec<&ForeignKeyRef> = self.foreign_keys.iter().collect();
        foreign_keys.sort_by(|a, b| a.target.cmp(&b.target));
        for foreign_key in foreign_keys {
            node.children.push(foreign_key.to_node());
        }
        node
    }

    /// Reconstruct from a `<Column>` element.
    pub fn from_node(node: &XmlNode) -> SchemaResult<Self> {
        let primary_key = match node.attr("primary_key") {
            Some(text) => parse_bool("primary_key", text)?,
            None => false,
        };
        let unique = match node.attr("unique") {
            Some(text) => parse_bool("unique", text)?,
            None => false,
        };
        let nullable = match node.attr("nullable") {
            Some(text) => parse_bool("nullable", text)?,
            None => !primary_key,
        };
        let mut foreign_keys = Vec::new();
        for child in node.children_named("ForeignKey") {
            foreign_keys.push(ForeignKeyRef::from_node(child)?);
        }
        Ok(Self {
            name: SmolStr::new(node.require_attr("name")?),
            column_type: ColumnType::from_node(node)?,
            primary_key,
            unique,
            nullable,
            default: node.attr("default").map(str::to_string),
            comment: node.attr("comment").map(str::to_string),
            foreign_keys,
        })
    }
}

/// A named table constraint.
///
/// Only named constraints enter version documents; single-column primary
/// keys and uniques stay column attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConstraintDef {
    PrimaryKey {
        name: SmolStr,
        columns: Vec<SmolStr>,
    },
    ForeignKey {
        name: SmolStr,
        columns: Vec<SmolStr>,
        ref_table: SmolStr,
        ref_columns: Vec<SmolStr>,
        #[serde(default)]
        onupdate: Option<SmolStr>,
        #[serde(default)]
        ondelete: Option<SmolStr>,
    },
    Unique {
        name: SmolStr,
        columns: Vec<SmolStr>,
    },
    Check {
        name: SmolStr,
        expression: String,
    },
}

impl ConstraintDef {
    /// Constraint name.
    pub fn name(&self) -> &SmolStr {
        match self {
            Self::PrimaryKey { name, .. }
            | Self::ForeignKey { name, .. }
            | Self::Unique { name, .. }
            | Self::Check { name, .. } => name,
        }
    }

    /// Fixed serialization priority: primary key < foreign key < unique <
    /// check.
    pub fn type_priority(&self) -> u8 {
        match self {
            Self::PrimaryKey { .. } => 0,
            Self::ForeignKey { .. } => 1,
            Self::Unique { .. } => 2,
            Self::Check { .. } => 3,
        }
    }

    /// Element name in version documents.
    pub fn node_name(&self) -> &'static str {
        match self {
            Self::PrimaryKey { .. } => "PrimaryKeyConstraint",
            Self::ForeignKey { .. } => "ForeignKeyConstraint",
            Self::Unique { .. } => "UniqueConstraint",
            Self::Check { .. } => "CheckConstraint",
        }
    }

    /// Serialize to a constraint element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new(self.node_name());
        node.set_attr("name", self.name().as_str());
        match self {
            Self::PrimaryKey { columns, .. } | Self::Unique { columns, .. } => {
                node.set_attr("columns", join_names(columns));
            }
            Self::ForeignKey {
                columns,
                ref_table,
                ref_columns,
                onupdate,
                ondelete,
                ..
            } => {
                node.set_attr("columns", join_names(columns));
                node.set_attr("ref_table", ref_table.as_str());
                node.set_attr("ref_columns", join_names(ref_columns));
                if let Some(onupdate) = onupdate {
                    node.set_attr("onupdate", onupdate.as_str());
                }
                if let Some(ondelete) = ondelete {
                    node.set_attr("ondelete", ondelete.as_str());
                }
            }
            Self::Check { expression, .. } => {
                node.set_attr("expression", expression.as_str());
            }
        }
        node
    }

    /// Reconstruct from a constraint element.
    pub fn from_node(node: &XmlNode) -> SchemaResult<Self> {
        let name = SmolStr::new(node.require_attr("name")?);
        let parsed = match node.name.as_str() {
            "PrimaryKeyConstraint" => Self::PrimaryKey {
                name,
                columns: split_names(node.require_attr("columns")?),
            },
            "ForeignKeyConstraint" => Self::ForeignKey {
                name,
                columns: split_names(node.require_attr("columns")?),
                ref_table: SmolStr::new(node.require_attr("ref_table")?),
                ref_columns: split_names(node.require_attr("ref_columns")?),
                onupdate: node.attr("onupdate").map(SmolStr::new),
                ondelete: node.attr("ondelete").map(SmolStr::new),
            },
            "UniqueConstraint" => Self::Unique {
                name,
                columns: split_names(node.require_attr("columns")?),
            },
            "CheckConstraint" => Self::Check {
                name,
                expression: node.require_attr("expression")?.to_string(),
            },
            other => {
                return Err(SchemaError::invalid_document(format!(
                    "unknown constraint element <{other}>"
                )));
            }
        };
        Ok(parsed)
    }
}

fn join_names(names: &[SmolStr]) -> String {
    names
        .iter()
        .map(SmolStr::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn split_names(text: &str) -> Vec<SmolStr> {
    text.split(',')
        .filter(|part| !part.is_empty())
        .map(SmolStr::new)
        .collect()
}

/// An index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: SmolStr,
    /// Indexed columns in order.
    pub columns: Vec<SmolStr>,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// A non-unique index.
    pub fn new(name: impl Into<SmolStr>, columns: Vec<SmolStr>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Serialize to an `<Index>` element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new("Index");
        node.set_attr("name", self.name.as_str());
        node.set_attr("columns", join_names(&self.columns));
        if self.unique {
            node.set_attr("unique", bool_text(true));
        }
        node
    }

    /// Reconstruct from an `<Index>` element.
    pub fn from_node(node: &XmlNode) -> SchemaResult<Self> {
        Ok(Self {
            name: SmolStr::new(node.require_attr("name")?),
            columns: split_names(node.require_attr("columns")?),
            unique: match node.attr("unique") {
                Some(text) => parse_bool("unique", text)?,
                None => false,
            },
        })
    }
}

/// A logical table declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Logical table name. Sharded tables append `_{suffix}` per physical
    /// entity.
    pub name: SmolStr,
    /// Columns in declaration order.
    #[serde(default, rename = "column")]
    pub columns: Vec<ColumnDef>,
    /// Named table constraints.
    #[serde(default, rename = "constraint")]
    pub constraints: Vec<ConstraintDef>,
    /// Indexes.
    #[serde(default, rename = "index")]
    pub indexes: Vec<IndexDef>,
    /// Sharded: one physical table per `(database, suffix)` map entry.
    #[serde(default)]
    pub sharded: bool,
    /// Creation-order priority; prioritized tables are created before
    /// unprioritized ones, lexicographically.
    #[serde(default)]
    pub priority: Option<SmolStr>,
}

impl TableDef {
    /// An empty table declaration.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            sharded: false,
            priority: None,
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a named constraint.
    pub fn constraint(mut self, constraint: ConstraintDef) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add an index.
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Mark the table as sharded.
    pub fn sharded(mut self) -> Self {
        self.sharded = true;
        self
    }

    /// Set the creation-order priority.
    pub fn priority(mut self, priority: impl Into<SmolStr>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Element name in version documents.
    pub fn node_name(&self) -> &'static str {
        if self.sharded { "ShardTable" } else { "Table" }
    }

    /// Normalize a deserialized declaration: primary-key columns are never
    /// nullable.
    pub fn normalize(&mut self) {
        for column in &mut self.columns {
            if column.primary_key {
                column.nullable = false;
            }
        }
    }

    /// Look up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Look up an index by name.
    pub fn find_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Look up a named constraint.
    pub fn find_constraint(&self, name: &str) -> Option<&ConstraintDef> {
        self.constraints
            .iter()
            .find(|constraint| constraint.name() == name)
    }

    /// Serialize the table subtree: columns in declaration order, then
    /// constraints sorted by type priority, then indexes.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::new(self.node_name());
        node.set_attr("name", self.name.as_str());
        for column in &self.columns {
            node.children.push(column.to_node());
        }
        let mut constraints: Vec<&ConstraintDef> = self.constraints.iter().collect();
        constraints.sort_by_key(|constraint| (constraint.type_priority(), constraint.name().clone()));
        for constraint in constraints {
            node.children.push(constraint.to_node());
        }
        for index in &self.indexes {
            node.children.push(index.to_node());
        }
        node
    }

    /// Reconstruct from a `<Table>` or `<ShardTable>` element.
    pub fn from_node(node: &XmlNode) -> SchemaResult<Self> {
        let sharded = match node.name.as_str() {
            "Table" => false,
            "ShardTable" => true,
            other => {
                return Err(SchemaError::invalid_document(format!(
                    "unknown table element <{other}>"
                )));
            }
        };
        let mut table = TableDef::new(SmolStr::new(node.require_attr("name")?));
        table.sharded = sharded;
        for child in &node.children {
            match child.name.as_str() {
                "Column" => table.columns.push(ColumnDef::from_node(child)?),
                "Index" => table.indexes.push(IndexDef::from_node(child)?),
                "PrimaryKeyConstraint" | "ForeignKeyConstraint" | "UniqueConstraint"
                | "CheckConstraint" => table.constraints.push(ConstraintDef::from_node(child)?),
                other => {
                    return Err(SchemaError::invalid_document(format!(
                        "unexpected element <{other}> inside table '{}'",
                        table.name
                    )));
                }
            }
        }
        Ok(table)
    }
}
