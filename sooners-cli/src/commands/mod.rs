//! Command implementations.

pub mod makepatch;
pub mod makeversion;
pub mod msbackward;
pub mod msforward;
pub mod skcontinue;
pub mod skwithdraw;

use std::path::{Path, PathBuf};

use sooners_migrate::error::{MigrateResult, MigrationError};
use sooners_migrate::migration::{Migration, run_delayed};
use sooners_migrate::milestone::StepPatterns;
use sooners_migrate::store::{EngineConfig, MigrationContext};
use sooners_schema::version::VersionDocument;

use crate::cli::{MilestoneArgs, SchemaArgs};
use crate::config::Config;
use crate::milestones::load_milestone;
use crate::output;
use crate::prompts::TerminalConfirm;

/// The loaded project: config file plus derived engine configuration.
pub(crate) struct Project {
    pub base_dir: PathBuf,
    pub config: Config,
    pub engine: EngineConfig,
}

impl Project {
    pub fn load(config_path: &Path) -> MigrateResult<Self> {
        let base_dir = config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let config = Config::load(config_path)?;
        let engine = config.engine_config(&base_dir)?;
        Ok(Self {
            base_dir,
            config,
            engine,
        })
    }

    pub fn context(
        &self,
        do_action: bool,
        debug_schema: bool,
    ) -> MigrateResult<MigrationContext<'_>> {
        let sessions = self.config.open_sessions(&self.base_dir)?;
        Ok(MigrationContext::new(&self.engine, sessions)?.with_flags(do_action, debug_schema))
    }
}

/// Shared body of `msforward` and `msbackward`.
pub(crate) fn run_milestone(
    config_path: &Path,
    args: &MilestoneArgs,
    backward: bool,
) -> MigrateResult<()> {
    let project = Project::load(config_path)?;
    let milestone = load_milestone(&project.engine.milestones_dir, &args.milestone)?;

    if args.show {
        for line in milestone.show() {
            output::line(&line);
        }
        return Ok(());
    }

    let patterns: Vec<String> = if args.patterns.is_empty() {
        vec!["*".to_string()]
    } else {
        args.patterns.clone()
    };
    let patterns = StepPatterns::new(args.confirm, &patterns)?;

    let mut ctx = project.context(!args.no_action, args.debug_schema)?;
    warn_stale_components(&project, &mut ctx)?;
    let mut confirm = TerminalConfirm;
    if backward {
        milestone.backward(&patterns, &mut ctx, &mut confirm)
    } else {
        milestone.forward(&patterns, &mut ctx, &mut confirm)
    }
}

/// Warn about components whose declared models differ from the persisted
/// target checksums: their current code is not what the milestone will
/// migrate to.
fn warn_stale_components(
    project: &Project,
    ctx: &mut MigrationContext<'_>,
) -> MigrateResult<()> {
    let migration = Migration::load(ctx)?;
    for entry in &project.config.components {
        let Some(models) = project
            .config
            .component_models(&project.base_dir, &entry.name)?
        else {
            continue;
        };
        let Some(doc) = VersionDocument::from_models(entry.name.as_str(), &models) else {
            continue;
        };
        let stale = match migration.version_records.get(&entry.name) {
            Some(record) => record.checksum1.as_deref() != Some(doc.checksum.as_str()),
            None => true,
        };
        if stale {
            output::warn(&format!(
                "component '{}' declares models not saved as its target version; \
                 consider running makeversion",
                entry.name
            ));
        }
    }
    Ok(())
}

/// Shared body of `skcontinue` and `skwithdraw`.
pub(crate) fn run_resume(
    config_path: &Path,
    args: &SchemaArgs,
    withdraw: bool,
) -> MigrateResult<()> {
    let project = Project::load(config_path)?;
    let mut ctx = project.context(!args.no_action, args.debug_schema)?;
    let mut migration = Migration::load(&mut ctx)?;
    if migration.is_clean() {
        return Err(MigrationError::bookkeeping("the migration is clean now"));
    }

    if args.no_action {
        let mut names: Vec<_> = migration
            .version_records
            .iter()
            .map(|record| record.component_name.clone())
            .collect();
        names.sort();
        for name in names {
            for operation in migration.component_operations(&name)? {
                output::line(&operation.describe());
            }
        }
        return Ok(());
    }

    let delayed = if withdraw {
        migration.run_withdraw(&mut ctx, None)?
    } else {
        migration.run_continue(&mut ctx, None)?
    };
    run_delayed(&mut ctx, &delayed)?;
    output::success(if withdraw {
        "migration withdrawn"
    } else {
        "migration finished"
    });
    Ok(())
}
