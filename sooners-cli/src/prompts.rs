//! Interactive prompt implementations backed by dialoguer.

use std::io::{BufRead, IsTerminal};

use dialoguer::{Confirm, Input};

use sooners_migrate::diff::{Doubt, PatchPrompt};
use sooners_migrate::error::{MigrateResult, MigrationError};
use sooners_migrate::milestone::StepConfirm;

use crate::output;

fn prompt_err(err: dialoguer::Error) -> MigrationError {
    MigrationError::Interrupted(err.to_string())
}

/// Terminal prompt for ambiguous diffs.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl PatchPrompt for TerminalPrompt {
    fn ask(&mut self, doubt: &Doubt) -> MigrateResult<String> {
        output::line(&doubt.path);
        output::line(&format!(
            "From({}): {:?}",
            doubt.kind.base_name(),
            doubt.names0
        ));
        output::line(&format!(
            "To  ({}): {:?}",
            doubt.kind.base_name(),
            doubt.names1
        ));
        for (index, shortcut) in doubt.shortcuts.iter().enumerate() {
            output::line(&format!("  Shortcut[{index}]: {shortcut}"));
        }
        if std::io::stdin().is_terminal() {
            let answer: String = Input::new()
                .with_prompt("Command")
                .interact_text()
                .map_err(prompt_err)?;
            return Ok(answer);
        }
        // Piped input: answers come one per line.
        let mut answer = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|err| MigrationError::Interrupted(err.to_string()))?;
        if read == 0 {
            return Err(MigrationError::Interrupted(
                "no answer on stdin".to_string(),
            ));
        }
        Ok(answer.trim_end().to_string())
    }

    fn report(&mut self, message: &str) {
        output::warn(message);
    }
}

/// Terminal confirmation for `--confirm` milestone runs.
#[derive(Debug, Default)]
pub struct TerminalConfirm;

impl StepConfirm for TerminalConfirm {
    fn confirm(
        &mut self,
        step: &str,
        direction: &str,
        matched: &[String],
    ) -> MigrateResult<bool> {
        Confirm::new()
            .with_prompt(format!("{step}.{direction}: {matched:?}, confirm to do it?"))
            .default(false)
            .interact()
            .map_err(prompt_err)
    }
}
