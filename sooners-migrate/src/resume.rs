//! Resuming a broken migration: continue or withdraw.
//!
//! Continue re-drives the same plan; the operation log makes every
//! already-applied operation a skip, so exactly the unapplied suffix runs.
//! Withdraw unwinds instead: the plan replays reversed with every
//! operation inverted, gated on the log, so only operations that actually
//! applied are undone. Each log row is deleted as its inverse succeeds,
//! so a crash mid-withdraw resumes cleanly too.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::bookkeeping::OPERATION_TABLE;
use crate::error::{MigrateResult, MigrationError};
use crate::migration::{DatabaseFilter, Migration, is_delayed};
use crate::operations::Operation;
use crate::store::MigrationContext;

impl Migration {
    /// Finish a broken migration: re-drive the plan, skipping everything
    /// the log already holds. Returns the deferred operations.
    pub fn run_continue(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        filter: DatabaseFilter<'_>,
    ) -> MigrateResult<Vec<Operation>> {
        // The idempotence boundary of the ordinary run is exactly the
        // continue semantics.
        self.run(ctx, filter)
    }

    /// Unwind a broken migration and restore the before side as the
    /// persisted-after state. Returns the deferred operations.
    pub fn run_withdraw(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        filter: DatabaseFilter<'_>,
    ) -> MigrateResult<Vec<Operation>> {
        let components = match self.direction() {
            (true, true) => return Err(MigrationError::InconsistentDirection),
            (false, false) => Vec::new(),
            // Withdrawing reverses the broken run's traversal: a forward
            // run walked the after snapshot in order, a backward run the
            // before snapshot reversed.
            (true, false) => {
                let mut names = self.after_component_names()?;
                names.reverse();
                names
            }
            (false, true) => self.before_component_names()?,
        };

        let mut delayed = Vec::new();
        for component in &components {
            self.withdraw_component(ctx, component, filter, &mut delayed)?;
        }

        // Restore the before side as the persisted-after state.
        self.params1_text = self.params0_text.clone();
        for record in self.version_records.iter_mut() {
            record.index1 = record.index0;
            record.version1 = record.version0;
            record.checksum1 = record.checksum0.clone();
        }
        self.smart_save(ctx)?;
        for component in &components {
            self.clear_withdraw_log(ctx, component, filter)?;
        }
        self.snapshot1 = self.snapshot0.clone();
        Ok(delayed)
    }

    fn after_component_names(&self) -> MigrateResult<Vec<SmolStr>> {
        Ok(self
            .snapshot1
            .as_ref()
            .ok_or_else(|| MigrationError::bookkeeping("forward run without target metadata"))?
            .components
            .keys()
            .cloned()
            .collect())
    }

    fn before_component_names(&self) -> MigrateResult<Vec<SmolStr>> {
        Ok(self
            .snapshot0
            .as_ref()
            .ok_or_else(|| MigrationError::bookkeeping("backward run without before metadata"))?
            .components
            .keys()
            .cloned()
            .collect())
    }

    fn withdraw_component(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        component: &str,
        filter: DatabaseFilter<'_>,
        delayed: &mut Vec<Operation>,
    ) -> MigrateResult<()> {
        let operations = self.component_operations(component)?;
        let mut logged: HashMap<String, HashMap<crate::operations::OperationKey, crate::bookkeeping::OperationRecord>> =
            HashMap::new();

        for operation in operations.iter().rev() {
            let database = operation.database().to_string();
            if let Some(filter) = filter {
                if !filter.contains(&database) {
                    continue;
                }
            }
            let cache = match logged.entry(database.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let session = ctx.session(&database)?;
                    let cache = if session.has_table(OPERATION_TABLE)? {
                        session
                            .load_operations(component)?
                            .into_iter()
                            .map(|record| (record.key(), record))
                            .collect()
                    } else {
                        HashMap::new()
                    };
                    entry.insert(cache)
                }
            };

            // Only operations that actually applied get undone.
            let Some(record) = cache.remove(&operation.key()) else {
                tracing::debug!(operation = %operation.describe(), "never applied, skipping");
                continue;
            };

            let inverse = operation.inverse();
            if is_delayed(&inverse) {
                tracing::debug!(operation = %inverse.describe(), "deferred past accounting");
                self.unlog(ctx, &database, &record)?;
                delayed.push(inverse);
                continue;
            }

            let dialect = ctx.config.dialect(&database)?;
            let statements = dialect.render(&inverse);
            let post_statements = dialect.post_statements(&inverse);
            tracing::info!(operation = %inverse.describe(), "withdrawing");
            let session = ctx.session(&database)?;
            for statement in statements.iter().chain(post_statements.iter()) {
                session.execute_ddl(statement).map_err(|err| {
                    MigrationError::DdlFailure {
                        database: database.clone(),
                        operation: inverse.describe(),
                        message: err.to_string(),
                    }
                })?;
            }
            self.unlog(ctx, &database, &record)?;
        }
        Ok(())
    }

    fn unlog(
        &mut self,
        ctx: &mut MigrationContext<'_>,
        database: &str,
        record: &crate::bookkeeping::OperationRecord,
    ) -> MigrateResult<()> {
        let session = ctx.session(database)?;
        if session.has_table(OPERATION_TABLE)? {
            session.delete_operation(record)?;
        }
        session.commit()?;
        Ok(())
    }

    fn clear_withdraw_log(
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
}
