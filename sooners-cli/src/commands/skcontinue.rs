//! `skcontinue`: finish a broken database schema migration.

use std::path::Path;

use sooners_migrate::error::MigrateResult;

use crate::cli::SchemaArgs;
use crate::commands::run_resume;

pub fn run(config_path: &Path, args: &SchemaArgs) -> MigrateResult<()> {
    run_resume(config_path, args, false)
}
