//! Milestone definition files.
//!
//! A milestone is a TOML file under the milestones directory: an optional
//! `previous` milestone name plus ordered `[[step]]` entries. The only
//! step kind is `dbschema`, pinning a `(versions, params)` target.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;

use sooners_migrate::error::{MigrateResult, MigrationError};
use sooners_migrate::milestone::{DbSchemaStep, Milestone, StepKind};
use sooners_schema::params::SchemaParams;

/// Guard against a `previous` cycle in milestone files.
const MAX_CHAIN_DEPTH: usize = 64;

#[derive(Debug, Deserialize)]
struct MilestoneFile {
    #[serde(default)]
    previous: Option<String>,
    #[serde(default, rename = "step")]
    steps: Vec<StepFile>,
}

#[derive(Debug, Deserialize)]
struct StepFile {
    kind: String,
    #[serde(default)]
    versions: IndexMap<SmolStr, u32>,
    #[serde(default)]
    params: SchemaParams,
}

/// Load a milestone and its whole `previous` chain.
pub fn load_milestone(dir: &Path, name: &str) -> MigrateResult<Rc<Milestone>> {
    load_chained(dir, name, 0)
}

fn load_chained(dir: &Path, name: &str, depth: usize) -> MigrateResult<Rc<Milestone>> {
    if depth >= MAX_CHAIN_DEPTH {
        return Err(MigrationError::config(format!(
            "milestone chain through '{name}' is too deep (cycle?)"
        )));
    }
    let path = dir.join(format!("{name}.toml"));
    let text = fs::read_to_string(&path).map_err(|err| {
        MigrationError::config(format!("cannot read milestone {}: {err}", path.display()))
    })?;
    let file: MilestoneFile = toml::from_str(&text)
        .map_err(|err| MigrationError::config(format!("{}: {err}", path.display())))?;

    let previous = match &file.previous {
        None => None,
        Some(previous) => Some(load_chained(dir, previous, depth + 1)?),
    };

    let mut kinds = Vec::new();
    for (index, step) in file.steps.iter().enumerate() {
        match step.kind.as_str() {
            "dbschema" => kinds.push(StepKind::DbSchema(DbSchemaStep {
                versions: step.versions.clone(),
                params: step.params.clone(),
            })),
            other => {
                return Err(MigrationError::config(format!(
                    "{}: step {index} has unknown kind {other:?}",
                    path.display()
                )));
            }
        }
    }
    if kinds.is_empty() {
        return Err(MigrationError::config(format!(
            "{}: milestone declares no steps",
            path.display()
        )));
    }
    Ok(Rc::new(Milestone::new(name, previous, kinds)))
}
