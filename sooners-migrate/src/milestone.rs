//! The milestone driver.
//!
//! A milestone is an ordered list of steps, optionally chained to a named
//! previous milestone. Steps run forward in declaration order or backward
//! in reverse; pattern tokens (globs, or `first-last` glob ranges) select
//! which steps act, optionally with per-step confirmation. Each step drives
//! a fresh migration and hands its deferred operations to a post-step
//! phase.

use std::rc::Rc;

use glob::Pattern;
use indexmap::IndexMap;
use smol_str::SmolStr;

use sooners_schema::params::SchemaParams;
use sooners_schema::snapshot::SchemaSnapshot;

use crate::error::{MigrateResult, MigrationError};
use crate::migration::{Migration, run_delayed};
use crate::operations::Operation;
use crate::store::{EngineConfig, MigrationContext};

/// The one step kind: migrate the database schema to a pinned
/// `(versions, params)` target.
#[derive(Debug, Clone)]
pub struct DbSchemaStep {
    /// Component name to version number.
    pub versions: IndexMap<SmolStr, u32>,
    /// Deployment params of the target.
    pub params: SchemaParams,
}

impl DbSchemaStep {
    /// Materialize the step's target snapshot.
    fn snapshot(&self, config: &EngineConfig) -> MigrateResult<SchemaSnapshot> {
        let mut snapshot =
            SchemaSnapshot::new(config.default_database.clone(), self.params.clone());
        for (name, version) in &self.versions {
            let component = config.component(name)?;
            snapshot.add_component(component.version_parse(*version)?)?;
        }
        Ok(snapshot)
    }

    fn description(&self) -> String {
        let versions = self
            .versions
            .iter()
            .map(|(name, version)| format!("{name}={version}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("({versions})-({} tables)", self.params.len())
    }
}

/// The kinds of milestone steps.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// A database schema transition.
    DbSchema(DbSchemaStep),
}

/// One step of a milestone.
#[derive(Debug, Clone)]
pub struct Step {
    /// Position within the milestone.
    pub index: usize,
    /// The step's behavior.
    pub kind: StepKind,
}

impl Step {
    /// Short type abbreviation used in the display form.
    pub fn abbrev(&self) -> &'static str {
        match self.kind {
            StepKind::DbSchema(_) => "dbss",
        }
    }

    /// Whether the step implements the forward direction.
    pub fn can_forward(&self) -> bool {
        match self.kind {
            StepKind::DbSchema(_) => true,
        }
    }

    /// Whether the step implements the backward direction.
    pub fn can_backward(&self) -> bool {
        match self.kind {
            StepKind::DbSchema(_) => true,
        }
    }

    /// Display form `abbrev.NN.{f|x}{b|x}`, what patterns match against.
    pub fn display(&self) -> String {
        format!(
            "{}.{:02}.{}{}",
            self.abbrev(),
            self.index,
            if self.can_forward() { "f" } else { "x" },
            if self.can_backward() { "b" } else { "x" },
        )
    }

    /// Human description for `--show`.
    pub fn description(&self) -> String {
        match &self.kind {
            StepKind::DbSchema(step) => step.description(),
        }
    }

    /// The step's target metadata.
    pub fn metadata1(&self, config: &EngineConfig) -> MigrateResult<Option<SchemaSnapshot>> {
        match &self.kind {
            StepKind::DbSchema(step) => Ok(Some(step.snapshot(config)?)),
        }
    }
}

/// A pattern token: a plain glob, or a `first-last` range of globs.
#[derive(Debug, Clone)]
enum PatternToken {
    Single(Pattern),
    Range(Pattern, Pattern),
}

/// The step selection of one milestone invocation.
#[derive(Debug, Clone)]
pub struct StepPatterns {
    /// Ask before acting on each matched step.
    pub confirm: bool,
    tokens: Vec<(String, PatternToken)>,
}

impl StepPatterns {
    /// Parse pattern tokens. A token containing `-` splits into a range.
    pub fn new<I, S>(confirm: bool, patterns: I) -> MigrateResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = Vec::new();
        for pattern in patterns {
            let text = pattern.as_ref().to_string();
            let token = match text.split_once('-') {
                Some((first, last)) => {
                    PatternToken::Range(compile(first)?, compile(last)?)
                }
                None => PatternToken::Single(compile(&text)?),
            };
            tokens.push((text, token));
        }
        Ok(Self { confirm, tokens })
    }

    /// Match all steps by running a stateful scan in execution order.
    /// Returns, per step, the pattern texts that selected it.
    fn scan<'a>(&self, steps: impl Iterator<Item = &'a Step>) -> Vec<(usize, Vec<String>)> {
        let mut open_ranges: Vec<bool> = vec![false; self.tokens.len()];
        let mut matched = Vec::new();
        for step in steps {
            let display = step.display();
            let mut hits = Vec::new();
            for (slot, (text, token)) in self.tokens.iter().enumerate() {
                match token {
                    PatternToken::Single(pattern) => {
                        if pattern.matches(&display) {
                            hits.push(text.clone());
                        }
                    }
                    PatternToken::Range(first, last) => {
                        let mut inside = open_ranges[slot];
                        if first.matches(&display) {
                            inside = true;
                            open_ranges[slot] = true;
                        }
                        if last.matches(&display) {
                            open_ranges[slot] = false;
                            inside = true;
                        }
                        if inside {
                            hits.push(text.clone());
                        }
                    }
                }
            }
            if !hits.is_empty() {
                matched.push((step.index, hits));
            }
        }
        matched
    }
}

fn compile(text: &str) -> MigrateResult<Pattern> {
    Pattern::new(text)
        .map_err(|err| MigrationError::config(format!("bad pattern {text:?}: {err}")))
}

/// Confirmation capability for `--confirm` runs.
pub trait StepConfirm {
    /// Whether to act on a matched step.
    fn confirm(
        &mut self,
        step: &str,
        direction: &str,
        matched: &[String],
    ) -> MigrateResult<bool>;
}

/// Confirms every step. For non-interactive runs.
#[derive(Debug, Default)]
pub struct AlwaysConfirm;

impl StepConfirm for AlwaysConfirm {
    fn confirm(&mut self, _step: &str, _direction: &str, _matched: &[String]) -> MigrateResult<bool> {
        Ok(true)
    }
}

/// An ordered list of steps, chained to an optional previous milestone.
pub struct Milestone {
    /// Milestone name (its file stem).
    pub name: String,
    /// The milestone this one continues from.
    pub previous: Option<Rc<Milestone>>,
    /// Steps in declaration order.
    pub steps: Vec<Step>,
}

impl Milestone {
    /// Build a milestone; step indices are assigned by position.
    pub fn new(
        name: impl Into<String>,
        previous: Option<Rc<Milestone>>,
        kinds: Vec<StepKind>,
    ) -> Self {
        let steps = kinds
            .into_iter()
            .enumerate()
            .map(|(index, kind)| Step { index, kind })
            .collect();
        Self {
            name: name.into(),
            previous,
            steps,
        }
    }

    /// The `--show` listing.
    pub fn show(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| format!("{}: {}.", step.display(), step.description()))
            .collect()
    }

    /// A step's before-metadata: the previous step's target, falling back
    /// through the previous milestone chain.
    pub fn step_metadata0(
        &self,
        index: usize,
        config: &EngineConfig,
    ) -> MigrateResult<Option<SchemaSnapshot>> {
        if index > 0 {
            return self.steps[index - 1].metadata1(config);
        }
        match &self.previous {
            None => Ok(None),
            Some(previous) => match previous.steps.last() {
                None => Ok(None),
                Some(step) => step.metadata1(config),
            },
        }
    }

    /// Run matched steps forward, in declaration order.
    pub fn forward(
        &self,
        patterns: &StepPatterns,
        ctx: &mut MigrationContext<'_>,
        confirm: &mut dyn StepConfirm,
    ) -> MigrateResult<()> {
        self.traverse(patterns, ctx, confirm, false)
    }

    /// Run matched steps backward, in reverse declaration order.
    pub fn backward(
        &self,
        patterns: &StepPatterns,
        ctx: &mut MigrationContext<'_>,
        confirm: &mut dyn StepConfirm,
    ) -> MigrateResult<()> {
        self.traverse(patterns, ctx, confirm, true)
    }

    fn traverse(
        &self,
        patterns: &StepPatterns,
        ctx: &mut MigrationContext<'_>,
        confirm: &mut dyn StepConfirm,
        backward: bool,
    ) -> MigrateResult<()> {
        let direction = if backward { "backward" } else { "forward" };
        let ordered: Vec<&Step> = if backward {
            self.steps.iter().rev().collect()
        } else {
            self.steps.iter().collect()
        };
        let matched = patterns.scan(ordered.iter().copied());

        // A matched step lacking the requested direction fails the whole
        // run before any action.
        for (index, _) in &matched {
            let step = &self.steps[*index];
            let runnable = if backward {
                step.can_backward()
            } else {
                step.can_forward()
            };
            if !runnable {
                return Err(MigrationError::StepBanned {
                    step: step.display(),
                    direction: if backward { "backward" } else { "forward" },
                });
            }
        }

        for (index, hits) in matched {
            let step = &self.steps[index];
            if patterns.confirm && !confirm.confirm(&step.display(), direction, &hits)? {
                continue;
            }
            if !ctx.do_action {
                tracing::info!(
                    step = %step.display(),
                    direction,
                    "planned (no action): {}",
                    step.description()
                );
                continue;
            }
            tracing::info!(
                step = %step.display(),
                direction,
                "running: {}",
                step.description()
            );
            let delayed = self.run_step(step, ctx, backward)?;
            run_delayed(ctx, &delayed)?;
            ctx.commit_all()?;
        }
        Ok(())
    }

    fn run_step(
        &self,
        step: &Step,
        ctx: &mut MigrationContext<'_>,
        backward: bool,
    ) -> MigrateResult<Vec<Operation>> {
        let target = if backward {
            self.step_metadata0(step.index, ctx.config)?
        } else {
            step.metadata1(ctx.config)?
        };
        let mut migration = Migration::load(ctx)?;
        migration.set_target(ctx, target)?;
        migration.run(ctx, None)
    }
}
