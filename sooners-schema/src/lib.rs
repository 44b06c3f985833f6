//! # sooners-schema
//!
//! Schema model and versioned metadata documents for the sooners migration
//! engine.
//!
//! This crate provides:
//! - The declarative table model ([`model::TableDef`] and friends) that
//!   applications hand to the engine
//! - Column types with a stable document representation ([`types`])
//! - Deployment params mapping tables to databases and shard suffixes
//!   ([`params`])
//! - Canonical, checksummed version documents and their on-disk history
//!   ([`version`], [`component`])
//! - Snapshot materialization, including shard expansion ([`snapshot`])
//!
//! The diffing, operation and execution layers live in `sooners-migrate`.

pub mod component;
pub mod error;
pub mod model;
pub mod params;
pub mod snapshot;
pub mod types;
pub mod version;
pub mod xml;

/// Engine source tag stamped on every written document.
pub const SOURCE_TAG: &str = "sooners-0.1";

// Re-exports
pub use component::Component;
pub use error::{SchemaError, SchemaResult};
pub use model::{ColumnDef, ConstraintDef, ForeignKeyRef, IndexDef, TableDef};
pub use params::{SchemaParams, TableParams};
pub use snapshot::{ComponentVersion, PhysicalTable, SchemaSnapshot, ShardInfo};
pub use types::{ColumnType, EnumMember};
pub use version::{CHECKSUM_LEN, VersionDocument, checksum_of};
pub use xml::XmlNode;
