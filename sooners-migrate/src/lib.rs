//! # sooners-migrate
//!
//! Migration engine for the sooners schema system.
//!
//! This crate provides:
//! - Patch documents and the interactive patch generator ([`patch`],
//!   [`diff`])
//! - The typed operation model with stable typeids and inverses
//!   ([`operations`])
//! - Dialect-specific DDL emission for SQLite, MySQL and PostgreSQL
//!   ([`dialect`])
//! - The persisted bookkeeping tables ([`bookkeeping`]) behind abstract
//!   store traits ([`store`])
//! - The resumable, reversible migration core ([`migration`], [`plan`],
//!   [`resume`])
//! - The milestone driver ([`milestone`]) and shard-weight allocation
//!   ([`shard`])
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐    ┌───────────────┐    ┌──────────────┐
//! │ Version docs   │───▶│ Patch (diff)  │───▶│ Operations   │
//! └────────────────┘    └───────────────┘    └──────────────┘
//!         │                                         │
//!         ▼                                         ▼
//! ┌────────────────┐    ┌───────────────┐    ┌──────────────┐
//! │ Bookkeeping    │◀───│ Migration     │───▶│ Dialect DDL  │
//! └────────────────┘    └───────────────┘    └──────────────┘
//! ```
//!
//! A milestone step points the migration at a target `(versions, params)`
//! pair; the core diffs the persisted before-state against it, plans
//! ordered operations per component per database, and logs each applied
//! operation so a broken run can continue or withdraw.

pub mod bookkeeping;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod migration;
pub mod milestone;
pub mod operations;
pub mod patch;
pub mod plan;
pub mod resume;
pub mod shard;
pub mod store;

// Re-exports
pub use bookkeeping::{ConfType, OperationRecord, VersionRecord, VersionRecords};
pub use dialect::SqlDialect;
pub use diff::{DenyPrompt, Doubt, PatchPrompt, ScriptedPrompt, make_patch};
pub use error::{AnswerError, MigrateResult, MigrationError};
pub use migration::{Migration, run_delayed};
pub use milestone::{
    AlwaysConfirm, DbSchemaStep, Milestone, Step, StepConfirm, StepKind, StepPatterns,
};
pub use operations::{Operation, OperationKey};
pub use patch::{EntityKind, PatchAction, PatchDocument, PatchEntry};
pub use shard::{ShardWeight, choose_by_weight};
pub use store::{
    DatabaseSession, EngineConfig, MigrationContext, OperationExecutor, SchemaIntrospector,
    SessionStore,
};
