//! `makepatch`: generate the patch between two saved versions.

use std::path::Path;

use sooners_migrate::diff::make_patch;
use sooners_migrate::error::MigrateResult;
use sooners_schema::{Component, SOURCE_TAG};

use crate::cli::MakePatchArgs;
use crate::commands::Project;
use crate::output;
use crate::prompts::TerminalPrompt;

pub fn run(config_path: &Path, args: &MakePatchArgs) -> MigrateResult<()> {
    let project = Project::load(config_path)?;
    let component = project.engine.component(&args.component)?;

    let doc0 = component.version_parse(args.version0)?;
    let doc1 = component.version_parse(args.version1)?;
    let patch = make_patch(&doc0, &doc1, &mut TerminalPrompt)?;

    let mut node = patch.to_node();
    component.patch_write(&mut node, args.version0, args.version1, SOURCE_TAG)?;
    output::bold(&format!(
        "{:?}: written for {}.",
        Component::patch_fname(args.version0, args.version1),
        component.name
    ));
    Ok(())
}
