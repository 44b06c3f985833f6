//! The migration core.
//!
//! A [`Migration`] loads the persisted bookkeeping, materializes the
//! before/after metadata snapshots, plans ordered operations per component
//! per database and applies them, writing progress into the operation log
//! after every success. A crash or failure mid-run leaves the log
//! consistent: re-driving the same plan skips everything already logged.

use std::collections::{BTreeSet, HashMap};

use smol_str::SmolStr;

use sooners_schema::params::SchemaParams;
use sooners_schema::snapshot::SchemaSnapshot;

use crate::bookkeeping::{
    self, BOOKKEEPING_TABLES, CONFIGURATION_TABLE, ConfType, OPERATION_TABLE, OperationRecord,
    VERSION_TABLE, VersionRecords,
};
use crate::error::{MigrateResult, MigrationError};
use crate::operations::{Operation, OperationKey};
use crate::patch::PatchDocument;
use crate::plan;
use crate::store::{EngineConfig, MigrationContext};

/// Which side of the before/after pair a snapshot is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Optional restriction of execution to a subset of databases.
pub type DatabaseFilter<'a> = Option<&'a BTreeSet<String>>;

/// One migration run over the persisted bookkeeping.
pub struct Migration {
    /// Params text the databases currently reflect.
    pub params0_text: Option<String>,
    /// Target params text.
    pub params1_text: Option<String>,
    /// The per-component version rows.
    pub version_records: VersionRecords,
    /// Metadata the databases currently reflect (`None` before the first
    /// ever migration).
    pub snapshot0: Option<SchemaSnapshot>,
    /// Target metadata.
    pub snapshot1: Option<SchemaSnapshot>,
    patches: HashMap<SmolStr, PatchDocument>,
    /// Records of operations applied while the log table did not exist
    /// yet, per database; flushed into the log the moment it exists.
    pending_records: HashMap<String, Vec<OperationRecord>>,
}

impl Migration {
    /// Load a migration from the bookkeeping tables. Absent tables mean a
    /// first-ever migration: empty rows, no before-snapshot.
    pub fn load(ctx: &mut MigrationContext<'_>) -> MigrateResult<Self> {
        let session = ctx.default_session()?;
        let params0_text = bookkeeping::load_configuration(session, ConfType::SchemaParams0)?;
        let params1_text = bookkeeping::load_configuration(session, ConfType::SchemaParams1)?;
        let version_records = VersionRecords::load(session)?;

        let mut migration = Self {
            params0_text,
            params1_text,
            version_records,
            snapshot0: None,
            snapshot1: None,
            patches: HashMap::new(),
            pending_records: HashMap::new(),
        };
        migration.snapshot0 = migration.build_snapshot(ctx.config, Side::Before)?;
        migration.snapshot1 = if migration.is_clean() {
            migration.snapshot0.clone()
        } else {
            migration.build_snapshot(ctx.config, Side::After)?
        };
        migration.load_patches(ctx.config)?;
        Ok(migration)
    }

    /// A migration is clean when params and every version row agree on
    /// both sides.
    pub fn is_clean(&self) -> bool {
        if self.params0_text != self.params1_text {
            return false;
        }
        self.version_records.iter().all(|record| record.is_same())
    }

    /// `(forward, backward)` signatures over all version rows. Both at
    /// once is fatal at planning time.
    pub fn direction(&self) -> (bool, bool) {
        let mut forward = false;
        let mut backward = false;
        for record in self.version_records.iter() {
            match (record.version0, record.version1) {
                (Some(version0), Some(version1)) if version0 < version1 => forward = true,
                (Some(version0), Some(version1)) if version0 > version1 => backward = true,
                (None, Some(_)) => forward = true,
                (Some(_), None) => backward = true,
                _ => {}
            }
        }
        (forward, backward)
    }

    /// Point the after side at a new target (or clear it), persisting what
    /// storage currently allows.
    pub fn set_target(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        target: Option<SchemaSnapshot>,
    ) -> MigrateResult<()> {
        match &target {
            None => {
                self.params1_text = None;
                for record in self.version_records.iter_mut() {
                    record.save1_none();
                }
            }
            Some(snapshot) => {
                self.params1_text = Some(snapshot.params.to_text()?);
                let mut targeted: BTreeSet<SmolStr> = BTreeSet::new();
                for (index, component) in snapshot.components.values().enumerate() {
                    self.version_records
                        .entry(&component.name)
                        .save1(index as u32, component);
                    targeted.insert(component.name.clone());
                }
                for record in self.version_records.iter_mut() {
                    if !targeted.contains(&record.component_name) {
                        record.save1_none();
                    }
                }
            }
        }
        self.snapshot1 = target;
        self.smart_save(ctx)?;
        self.load_patches(ctx.config)
    }

    /// Run the migration in whichever direction the bookkeeping demands.
    /// Returns the deferred operations (drops of the bookkeeping tables
    /// themselves) for the caller to run after all accounting.
    pub fn run(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        filter: DatabaseFilter<'_>,
    ) -> MigrateResult<Vec<Operation>> {
        match self.direction() {
            (true, true) => Err(MigrationError::InconsistentDirection),
            (true, false) => self.run_side(ctx, filter, Side::After),
            (false, true) => self.run_side(ctx, filter, Side::Before),
            (false, false) => Ok(Vec::new()),
        }
    }

    fn run_side(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        filter: DatabaseFilter<'_>,
        side: Side,
    ) -> MigrateResult<Vec<Operation>> {
        let components = self.component_order(side)?;
        let mut delayed = Vec::new();
        for component in &components {
            self.execute_component(ctx, component, filter, &mut delayed)?;
        }
        for component in &components {
            self.clear_component_log(ctx, component, filter)?;
        }
        self.finish(ctx)?;
        Ok(delayed)
    }

    /// Component traversal order: the after snapshot's index order going
    /// forward, the reverse of the before snapshot's going backward.
    fn component_order(&self, side: Side) -> MigrateResult<Vec<SmolStr>> {
        let snapshot = match side {
            Side::After => self.snapshot1.as_ref(),
            Side::Before => self.snapshot0.as_ref(),
        };
        let snapshot = snapshot.ok_or_else(|| {
            MigrationError::bookkeeping("direction demands a snapshot that is absent".to_string())
        })?;
        let mut names: Vec<SmolStr> = snapshot.components.keys().cloned().collect();
        if side == Side::Before {
            names.reverse();
        }
        Ok(names)
    }

    /// The ordered operations of one component, derived from the snapshot
    /// pair and the patch documents.
    pub fn component_operations(&self, component: &str) -> MigrateResult<Vec<Operation>> {
        match (&self.snapshot0, &self.snapshot1) {
            (None, None) => Ok(Vec::new()),
            (None, Some(after)) => Ok(plan::plan_create_component(after, component)),
            (Some(before), None) => Ok(plan::plan_drop_component(before, component)),
            (Some(before), Some(after)) => {
                match (
                    before.components.get(component),
                    after.components.get(component),
                ) {
                    (None, None) => Ok(Vec::new()),
                    (None, Some(_)) => Ok(plan::plan_create_component(after, component)),
                    (Some(_), None) => Ok(plan::plan_drop_component(before, component)),
                    (Some(component0), Some(component1)) => {
                        if component0.version < component1.version {
                            let patch = self.require_patch(component)?;
                            plan::plan_forward(patch, before, after)
                        } else if component0.version > component1.version {
                            let patch = self.require_patch(component)?;
                            plan::plan_backward(patch, before, after)
                        } else if self.params0_text != self.params1_text {
                            plan::plan_params_update(&component0.document, before, after)
                        } else {
                            Ok(Vec::new())
                        }
                    }
                }
            }
        }
    }

    fn require_patch(&self, component: &str) -> MigrateResult<&PatchDocument> {
        self.patches.get(component).ok_or_else(|| {
            MigrationError::bookkeeping(format!("no patch loaded for component '{component}'"))
        })
    }

    fn execute_component(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        component: &str,
        filter: DatabaseFilter<'_>,
        delayed: &mut Vec<Operation>,
    ) -> MigrateResult<()> {
        let operations = self.component_operations(component)?;
        let mut logged: HashMap<String, HashMap<OperationKey, OperationRecord>> = HashMap::new();

        for operation in operations {
            let database = operation.database().to_string();
            if let Some(filter) = filter {
                if !filter.contains(&database) {
                    continue;
                }
            }
            let cache = match logged.entry(database.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(load_logged(ctx, &database, component)?)
                }
            };
            if cache.contains_key(&operation.key()) {
                tracing::debug!(operation = %operation.describe(), "already logged, skipping");
                continue;
            }
            if is_delayed(&operation) {
                tracing::debug!(operation = %operation.describe(), "deferred past accounting");
                delayed.push(operation);
                continue;
            }
            let record = self.execute_operation(ctx, component, &operation)?;
            cache.insert(record.key(), record);
        }
        Ok(())
    }

    fn execute_operation(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        component: &str,
        operation: &Operation,
    ) -> MigrateResult<OperationRecord> {
        let dialect = ctx.config.dialect(operation.database())?;
        let statements = dialect.render(operation);
        let post_statements = dialect.post_statements(operation);
        let debug_schema = ctx.debug_schema;
        tracing::info!(operation = %operation.describe(), "applying");

        let database = operation.database().to_string();
        let session = ctx.session(&database)?;
        for statement in statements.iter().chain(post_statements.iter()) {
            if debug_schema {
                tracing::info!(%statement);
            } else {
                tracing::debug!(%statement);
            }
            session.execute_ddl(statement).map_err(|err| {
                MigrationError::DdlFailure {
                    database: database.clone(),
                    operation: operation.describe(),
                    message: err.to_string(),
                }
            })?;
        }

        let record = OperationRecord::from_operation(component, operation);
        if session.has_table(OPERATION_TABLE)? {
            // The plan may have just created the log table; flush records
            // that applied while it was absent.
            if let Some(pending) = self.pending_records.remove(&database) {
                for pending_record in &pending {
                    session.insert_operation(pending_record)?;
                }
            }
            session.insert_operation(&record)?;
        } else {
            self.pending_records
                .entry(database.clone())
                .or_default()
                .push(record.clone());
        }
        session.commit()?;

        // The plan can create the storage for the very bookkeeping kept in
        // memory so far; persist it the moment the table exists.
        if let Operation::CreateTable { table, .. } = operation {
            if table.name == CONFIGURATION_TABLE {
                self.save_params(ctx)?;
            } else if table.name == VERSION_TABLE {
                let session = ctx.default_session()?;
                self.version_records.save(session)?;
                session.commit()?;
            }
        }
        Ok(record)
    }

    fn clear_component_log(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        component: &str,
        filter: DatabaseFilter<'_>,
    ) -> MigrateResult<()> {
        for database in ctx.database_names() {
            if let Some(filter) = filter {
                if !filter.contains(&database) {
                    continue;
                }
            }
            let session = ctx.session(&database)?;
            if !session.has_table(OPERATION_TABLE)? {
                continue;
            }
            session.clear_operations(component)?;
            session.commit()?;
        }
        Ok(())
    }

    /// Promote the after side into the before side and persist.
    fn finish(&mut self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
        self.params0_text = self.params1_text.clone();
        for record in self.version_records.iter_mut() {
            record.promote();
        }
        self.smart_save(ctx)?;
        self.snapshot0 = self.snapshot1.clone();
        self.patches.clear();
        self.pending_records.clear();
        Ok(())
    }

    fn save_params(&mut self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
        let session = ctx.default_session()?;
        bookkeeping::save_configuration(
            session,
            ConfType::SchemaParams0,
            self.params0_text.as_deref(),
        )?;
        bookkeeping::save_configuration(
            session,
            ConfType::SchemaParams1,
            self.params1_text.as_deref(),
        )?;
        session.commit()?;
        Ok(())
    }

    /// Persist params and version rows as far as current storage allows.
    pub(crate) fn smart_save(&mut self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
        let session = ctx.default_session()?;
        bookkeeping::save_configuration(
            session,
            ConfType::SchemaParams0,
            self.params0_text.as_deref(),
        )?;
        bookkeeping::save_configuration(
            session,
            ConfType::SchemaParams1,
            self.params1_text.as_deref(),
        )?;
        self.version_records.save(session)?;
        session.commit()?;
        Ok(())
    }

    fn build_snapshot(
        &self,
        config: &EngineConfig,
        side: Side,
    ) -> MigrateResult<Option<SchemaSnapshot>> {
        let mut rows: Vec<(u32, SmolStr, u32, Option<String>)> = self
            .version_records
            .iter()
            .filter_map(|record| match side {
                Side::Before => record.version0.map(|version| {
                    (
                        record.index0,
                        record.component_name.clone(),
                        version,
                        record.checksum0.clone(),
                    )
                }),
                Side::After => record.version1.map(|version| {
                    (
                        record.index1,
                        record.component_name.clone(),
                        version,
                        record.checksum1.clone(),
                    )
                }),
            })
            .collect();
        if rows.is_empty() {
            return Ok(None);
        }
        rows.sort_by_key(|(index, name, _, _)| (*index, name.clone()));

        let params_text = match side {
            Side::Before => self.params0_text.as_deref(),
            Side::After => self.params1_text.as_deref(),
        };
        let params = match params_text {
            Some(text) => SchemaParams::from_text(text)?,
            None => SchemaParams::new(),
        };

        let mut snapshot = SchemaSnapshot::new(config.default_database.clone(), params);
        for (_, name, version, checksum) in rows {
            let component = config.component(&name)?;
            let document = component.version_parse(version)?;
            if let Some(checksum) = checksum {
                if checksum != document.checksum {
                    return Err(MigrationError::bookkeeping(format!(
                        "component '{name}' version {version}: bookkeeping checksum \
                         disagrees with the version document"
                    )));
                }
            }
            snapshot.add_component(document)?;
        }
        Ok(Some(snapshot))
    }

    fn load_patches(&mut self, config: &EngineConfig) -> MigrateResult<()> {
        self.patches.clear();
        for record in self.version_records.iter() {
            if !record.need_patch() {
                continue;
            }
            let (version0, version1) = match (record.version0, record.version1) {
                (Some(version0), Some(version1)) if version0 < version1 => (version0, version1),
                (Some(version0), Some(version1)) => (version1, version0),
                _ => continue,
            };
            let component = config.component(&record.component_name)?;
            let node = component.patch_parse(version0, version1)?;
            let patch = PatchDocument::from_node(&node)?;
            self.patches
                .insert(record.component_name.clone(), patch);
        }
        Ok(())
    }
}

/// Whether an operation must be deferred past accounting: dropping one of
/// the bookkeeping tables while they are still being written would saw off
/// the branch the run sits on.
pub fn is_delayed(operation: &Operation) -> bool {
    match operation {
        Operation::DropTable { table, .. } => {
            BOOKKEEPING_TABLES.contains(&table.name.as_str())
        }
        _ => false,
    }
}

fn load_logged(
    ctx: &mut MigrationContext<'_>,
    database: &str,
    component: &str,
) -> MigrateResult<HashMap<OperationKey, OperationRecord>> {
    let session = ctx.session(database)?;
    if !session.has_table(OPERATION_TABLE)? {
        return Ok(HashMap::new());
    }
    let mut cache = HashMap::new();
    for record in session.load_operations(component)? {
        cache.insert(record.key(), record);
    }
    Ok(cache)
}

/// Execute operations that were deferred past accounting. They are not
/// logged: their storage is exactly what they drop.
pub fn run_delayed(
    ctx: &mut MigrationContext<'_>,
    delayed: &[Operation],
) -> MigrateResult<()> {
    for operation in delayed {
        let dialect = ctx.config.dialect(operation.database())?;
        let statements = dialect.render(operation);
        let post_statements = dialect.post_statements(operation);
        tracing::info!(operation = %operation.describe(), "applying deferred");
        let database = operation.database().to_string();
        let session = ctx.session(&database)?;
        for statement in statements.iter().chain(post_statements.iter()) {
            session.execute_ddl(statement).map_err(|err| {
                MigrationError::DdlFailure {
                    database: database.clone(),
                    operation: operation.describe(),
                    message: err.to_string(),
                }
            })?;
        }
        session.commit()?;
    }
    Ok(())
}
