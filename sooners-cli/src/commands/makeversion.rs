//! `makeversion`: snapshot each component's declared models into its
//! history, writing the adjacent patch when a previous version exists.

use std::path::Path;

use sooners_migrate::diff::make_patch;
use sooners_migrate::error::{MigrateResult, MigrationError};
use sooners_schema::version::VersionDocument;
use sooners_schema::{Component, SOURCE_TAG};

use crate::cli::MakeVersionArgs;
use crate::commands::Project;
use crate::output;
use crate::prompts::TerminalPrompt;

pub fn run(config_path: &Path, args: &MakeVersionArgs) -> MigrateResult<()> {
    let project = Project::load(config_path)?;

    let selected: Vec<String> = if args.component.is_empty() {
        project
            .config
            .components
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    } else {
        for name in &args.component {
            project.engine.component(name)?;
        }
        args.component.clone()
    };

    for name in &selected {
        let Some(models) = project.config.component_models(&project.base_dir, name)? else {
            output::info(&format!("{name}: no models declared, skipped."));
            continue;
        };
        let component = project.engine.component(name)?;
        one_component(component, &models)?;
    }
    Ok(())
}

fn one_component(
    component: &Component,
    models: &[sooners_schema::model::TableDef],
) -> MigrateResult<()> {
    let Some(mut doc) = VersionDocument::from_models(component.name.clone(), models) else {
        return Ok(());
    };
    let existing = component.version_parse_all()?;

    // An unchanged model reports the matching version instead of writing.
    let matched: Vec<_> = existing
        .iter()
        .filter(|version| version.checksum == doc.checksum)
        .collect();
    if let Some(version) = matched.first() {
        if matched.len() > 1 {
            return Err(MigrationError::bookkeeping(format!(
                "component '{}' has {} versions with the same checksum",
                component.name,
                matched.len()
            )));
        }
        output::info(&format!(
            "{:?}: matched for {}.",
            Component::version_fname(version.version),
            component.name
        ));
        return Ok(());
    }

    let Some(last) = existing.last() else {
        component.version_write(&mut doc, 1, SOURCE_TAG)?;
        output::bold(&format!(
            "{:?}: written for {}.",
            Component::version_fname(1),
            component.name
        ));
        return Ok(());
    };

    let version = last.version + 1;
    component.version_write(&mut doc, version, SOURCE_TAG)?;
    output::bold(&format!(
        "{:?}: written for {}.",
        Component::version_fname(version),
        component.name
    ));

    let patch = make_patch(last, &doc, &mut TerminalPrompt)?;
    let mut node = patch.to_node();
    component.patch_write(&mut node, last.version, version, SOURCE_TAG)?;
    output::bold(&format!(
        "{:?}: written for {}.",
        Component::patch_fname(last.version, version),
        component.name
    ));
    Ok(())
}
