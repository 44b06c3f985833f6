//! `msbackward`: do milestone steps in backward direction.

use std::path::Path;

use sooners_migrate::error::MigrateResult;

use crate::cli::MilestoneArgs;
use crate::commands::run_milestone;

pub fn run(config_path: &Path, args: &MilestoneArgs) -> MigrateResult<()> {
    run_milestone(config_path, args, true)
}
