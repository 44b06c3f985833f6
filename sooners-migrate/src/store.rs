//! Abstract database collaborators and the migration context.
//!
//! The engine never talks SQL drivers directly. It consumes three
//! capabilities per database: a [`SchemaIntrospector`] (does a table
//! exist?), an [`OperationExecutor`] (run a DDL statement) and a
//! [`SessionStore`] (transactional row access to the bookkeeping tables).
//! A backend implements all three on one session object.

use std::collections::BTreeMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use smol_str::SmolStr;

use sooners_schema::Component;

use crate::bookkeeping::{ConfType, OperationRecord, VersionRecord};
use crate::dialect::SqlDialect;
use crate::error::{MigrateResult, MigrationError};

/// Table existence on a live database.
pub trait SchemaIntrospector {
    /// Whether a table currently exists. Implementations must not serve
    /// stale answers across DDL executed through the same session.
    fn has_table(&mut self, table: &str) -> MigrateResult<bool>;
}

/// DDL execution on a live database.
pub trait OperationExecutor {
    /// Execute one DDL statement.
    fn execute_ddl(&mut self, statement: &str) -> MigrateResult<()>;
}

/// Transactional row access to the bookkeeping tables.
///
/// The operation log lives on every database; the configuration and
/// version tables only on the default database. A store is only asked
/// about tables that exist (callers introspect first).
pub trait SessionStore {
    /// Commit the session.
    fn commit(&mut self) -> MigrateResult<()>;

    /// All logged operations of a component on this database.
    fn load_operations(&mut self, component: &str) -> MigrateResult<Vec<OperationRecord>>;

    /// Append one operation record.
    fn insert_operation(&mut self, record: &OperationRecord) -> MigrateResult<()>;

    /// Delete one operation record (withdraw unlogs as it unwinds).
    fn delete_operation(&mut self, record: &OperationRecord) -> MigrateResult<()>;

    /// Clear a component's log.
    fn clear_operations(&mut self, component: &str) -> MigrateResult<()>;

    /// Configuration parts of one type, ordered by part order.
    fn load_configuration_parts(
        &mut self,
        conf_type: ConfType,
    ) -> MigrateResult<Vec<(u32, String)>>;

    /// Insert or update one configuration part.
    fn upsert_configuration_part(
        &mut self,
        conf_type: ConfType,
        order: u32,
        part: &str,
    ) -> MigrateResult<()>;

    /// Delete all parts at or beyond `order`.
    fn delete_configuration_parts_from(
        &mut self,
        conf_type: ConfType,
        order: u32,
    ) -> MigrateResult<()>;

    /// All version rows.
    fn load_version_rows(&mut self) -> MigrateResult<Vec<VersionRecord>>;

    /// Insert or update one version row.
    fn upsert_version_row(&mut self, record: &VersionRecord) -> MigrateResult<()>;
}

/// The full per-database session: all three capabilities on one object.
pub trait DatabaseSession: SchemaIntrospector + OperationExecutor + SessionStore {}

impl<T: SchemaIntrospector + OperationExecutor + SessionStore> DatabaseSession for T {}

/// Static engine configuration: databases, their dialects, components.
/// Constructed once at startup and passed in explicitly.
pub struct EngineConfig {
    /// The unique database holding configuration and version bookkeeping.
    pub default_database: String,
    /// Database name to dialect, in name order.
    pub databases: BTreeMap<String, SqlDialect>,
    /// Components in installation order.
    pub components: IndexMap<SmolStr, Component>,
    /// Directory milestone definitions are loaded from.
    pub milestones_dir: PathBuf,
}

impl EngineConfig {
    /// Look up a component.
    pub fn component(&self, name: &str) -> MigrateResult<&Component> {
        self.components
            .get(name)
            .ok_or_else(|| MigrationError::config(format!("unknown component '{name}'")))
    }

    /// Look up a database's dialect.
    pub fn dialect(&self, database: &str) -> MigrateResult<SqlDialect> {
        self.databases
            .get(database)
            .copied()
            .ok_or_else(|| MigrationError::config(format!("unknown database '{database}'")))
    }
}

/// Everything one migration run owns: the static config, one open session
/// per database, and run flags. Sessions are acquired at run start and
/// released when the context drops, on every exit path.
pub struct MigrationContext<'cfg> {
    /// Static configuration.
    pub config: &'cfg EngineConfig,
    sessions: BTreeMap<String, Box<dyn DatabaseSession>>,
    /// When false, milestone steps report what they would do and stop.
    pub do_action: bool,
    /// Elevate per-statement logging for schema debugging.
    pub debug_schema: bool,
}

impl<'cfg> MigrationContext<'cfg> {
    /// Build a context over one session per configured database.
    pub fn new(
        config: &'cfg EngineConfig,
        sessions: BTreeMap<String, Box<dyn DatabaseSession>>,
    ) -> MigrateResult<Self> {
        if !sessions.contains_key(&config.default_database) {
            return Err(MigrationError::config(format!(
                "no session for default database '{}'",
                config.default_database
            )));
        }
        for name in sessions.keys() {
            config.dialect(name)?;
        }
        Ok(Self {
            config,
            sessions,
            do_action: true,
            debug_schema: false,
        })
    }

    /// Run-flag builder.
    pub fn with_flags(mut self, do_action: bool, debug_schema: bool) -> Self {
        self.do_action = do_action;
        self.debug_schema = debug_schema;
        self
    }

    /// Database names with open sessions, ascending.
    pub fn database_names(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// The session of one database.
    pub fn session(&mut self, database: &str) -> MigrateResult<&mut (dyn DatabaseSession + '_)> {
        match self.sessions.get_mut(database) {
            Some(session) => Ok(session.as_mut()),
            None => Err(MigrationError::config(format!(
                "no session for database '{database}'"
            ))),
        }
    }

    /// The default database's session.
    pub fn default_session(&mut self) -> MigrateResult<&mut (dyn DatabaseSession + '_)> {
        let name = self.config.default_database.clone();
        self.session(&name)
    }

    /// Commit every open session.
    pub fn commit_all(&mut self) -> MigrateResult<()> {
        for session in self.sessions.values_mut() {
            session.commit()?;
        }
        Ok(())
    }
}
