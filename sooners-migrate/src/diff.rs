//! Patch generation: pairing two version documents into a patch.
//!
//! At every nesting level the generator compares the name sets of each
//! sub-entity kind. Equal sets diff silently; one-sided sets become pure
//! creates or drops; anything else is a doubt that only a human (or a
//! scripted answer queue) can resolve into some mix of create, unchanged,
//! rename and drop entries.

use std::collections::{BTreeSet, VecDeque};

use smol_str::SmolStr;

use sooners_schema::model::TableDef;
use sooners_schema::version::VersionDocument;

use crate::error::{AnswerError, MigrateResult, MigrationError};
use crate::patch::{EntityKind, PatchAction, PatchDocument, PatchEntry};

/// Maximum number of shortcut suggestions offered per doubt.
const MAX_SHORTCUTS: usize = 10;

/// Similarity cutoff for rename suggestions.
const CLOSE_MATCH_CUTOFF: f64 = 0.6;

/// Rename suggestions offered per dropped-looking name.
const CLOSE_MATCHES_PER_NAME: usize = 3;

/// An ambiguous diff level, surfaced for interactive disambiguation.
#[derive(Debug, Clone)]
pub struct Doubt {
    /// Where in the document the ambiguity sits, e.g. `Patch->Table(u)`.
    pub path: String,
    /// Entity kind under diff.
    pub kind: EntityKind,
    /// Names on the before side, sorted.
    pub names0: Vec<SmolStr>,
    /// Names on the after side, sorted.
    pub names1: Vec<SmolStr>,
    /// Up to ten suggested answers, best first.
    pub shortcuts: Vec<String>,
}

impl Doubt {
    fn new(path: String, kind: EntityKind, set0: &BTreeSet<SmolStr>, set1: &BTreeSet<SmolStr>) -> Self {
        let mut shortcuts = Vec::new();

        let common: Vec<&SmolStr> = set0.intersection(set1).collect();
        if !common.is_empty() {
            let joined = common
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            shortcuts.push(format!("unchanged {joined}"));
        }
        for name0 in set0.difference(set1) {
            for name1 in close_matches(name0, set1.difference(set0)) {
                shortcuts.push(format!("rename {name0}/{name1}"));
            }
        }
        for name1 in set1.difference(set0) {
            shortcuts.push(format!("create {name1}"));
        }
        for name0 in set0.difference(set1) {
            shortcuts.push(format!("drop {name0}"));
        }
        shortcuts.truncate(MAX_SHORTCUTS);

        Self {
            path,
            kind,
            names0: set0.iter().cloned().collect(),
            names1: set1.iter().cloned().collect(),
            shortcuts,
        }
    }

    fn ambiguous(&self) -> MigrationError {
        MigrationError::AmbiguousDiff {
            kind: self.kind.base_name(),
            path: self.path.clone(),
            names0: self.names0.iter().map(|name| name.to_string()).collect(),
            names1: self.names1.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// The interactive capability the generator asks doubts through.
pub trait PatchPrompt {
    /// Present a doubt and return the user's answer line.
    fn ask(&mut self, doubt: &Doubt) -> MigrateResult<String>;

    /// Echo a recoverable answer error before re-prompting.
    fn report(&mut self, message: &str);
}

/// A prompt that refuses every doubt. For non-interactive runs.
#[derive(Debug, Default)]
pub struct DenyPrompt;

impl PatchPrompt for DenyPrompt {
    fn ask(&mut self, doubt: &Doubt) -> MigrateResult<String> {
        Err(doubt.ambiguous())
    }

    fn report(&mut self, _message: &str) {}
}

/// A prompt answering from a fixed queue. For tests and scripted runs.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    /// Answer errors reported back, for assertions.
    pub reported: Vec<String>,
}

impl ScriptedPrompt {
    /// Queue up answers in ask order.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            reported: Vec::new(),
        }
    }
}

impl PatchPrompt for ScriptedPrompt {
    fn ask(&mut self, doubt: &Doubt) -> MigrateResult<String> {
        self.answers.pop_front().ok_or_else(|| doubt.ambiguous())
    }

    fn report(&mut self, message: &str) {
        self.reported.push(message.to_string());
    }
}

/// Generate the patch between two versions of the same component.
///
/// Deterministic given identical answers; answers are only consulted where
/// the name sets make rename vs. create+drop ambiguous.
pub fn make_patch(
    doc0: &VersionDocument,
    doc1: &VersionDocument,
    prompt: &mut dyn PatchPrompt,
) -> MigrateResult<PatchDocument> {
    if doc0.component != doc1.component {
        return Err(MigrationError::invalid_patch(format!(
            "cannot patch across components '{}' and '{}'",
            doc0.component, doc1.component
        )));
    }
    let mut entries = Vec::new();
    for kind in EntityKind::METADATA {
        let names0 = table_names(doc0, kind);
        let names1 = table_names(doc1, kind);
        for mut entry in resolve_level("Patch".to_string(), kind, &names0, &names1, prompt)? {
            if kind.recurses() && matches!(entry.action, PatchAction::Unchanged | PatchAction::Rename)
            {
                let name0 = entry.name0.clone().unwrap_or_default();
                let name1 = entry.name1.clone().unwrap_or_default();
                let table0 = require_table(doc0, &name0)?;
                let table1 = require_table(doc1, &name1)?;
                let path = format!("Patch->{}({})", entry.node_name(), name1);
                entry.children = diff_table_children(path, table0, table1, prompt)?;
            }
            entries.push(entry);
        }
    }
    Ok(PatchDocument {
        component: doc0.component.clone(),
        version0: doc0.version,
        version1: doc1.version,
        entries,
    })
}

fn require_table<'a>(doc: &'a VersionDocument, name: &str) -> MigrateResult<&'a TableDef> {
    doc.find_table(name).ok_or_else(|| {
        MigrationError::invalid_patch(format!(
            "version {} of '{}' has no table '{name}'",
            doc.version, doc.component
        ))
    })
}

fn table_names(doc: &VersionDocument, kind: EntityKind) -> Vec<SmolStr> {
    doc.tables
        .iter()
        .filter(|table| {
            table.sharded == matches!(kind, EntityKind::ShardTable)
        })
        .map(|table| table.name.clone())
        .collect()
}

fn diff_table_children(
    path: String,
    table0: &TableDef,
    table1: &TableDef,
    prompt: &mut dyn PatchPrompt,
) -> MigrateResult<Vec<PatchEntry>> {
    let mut entries = Vec::new();
    for kind in EntityKind::TABLE {
        let names0 = child_names(table0, kind);
        let names1 = child_names(table1, kind);
        entries.extend(resolve_level(path.clone(), kind, &names0, &names1, prompt)?);
    }
    Ok(entries)
}

fn child_names(table: &TableDef, kind: EntityKind) -> Vec<SmolStr> {
    match kind {
        EntityKind::Column => table.columns.iter().map(|column| column.name.clone()).collect(),
        EntityKind::Index => table.indexes.iter().map(|index| index.name.clone()).collect(),
        EntityKind::PrimaryKeyConstraint
        | EntityKind::ForeignKeyConstraint
        | EntityKind::UniqueConstraint
        | EntityKind::CheckConstraint => table
            .constraints
            .iter()
            .filter(|constraint| constraint.node_name() == kind.base_name())
            .map(|constraint| constraint.name().clone())
            .collect(),
        EntityKind::Table | EntityKind::ShardTable => Vec::new(),
    }
}

fn resolve_level(
    path: String,
    kind: EntityKind,
    names0: &[SmolStr],
    names1: &[SmolStr],
    prompt: &mut dyn PatchPrompt,
) -> MigrateResult<Vec<PatchEntry>> {
    let set0: BTreeSet<SmolStr> = names0.iter().cloned().collect();
    let set1: BTreeSet<SmolStr> = names1.iter().cloned().collect();

    if set0.is_empty() {
        return Ok(names1
            .iter()
            .map(|name| PatchEntry::create(kind, name.clone()))
            .collect());
    }
    if set1.is_empty() {
        return Ok(names0
            .iter()
            .map(|name| PatchEntry::drop(kind, name.clone()))
            .collect());
    }
    if set0 == set1 {
        return Ok(names0
            .iter()
            .map(|name| PatchEntry::unchanged(kind, name.clone()))
            .collect());
    }

    // Rename vs. create+drop cannot be inferred; ask. A malformed answer
    // re-prompts indefinitely.
    let doubt = Doubt::new(path, kind, &set0, &set1);
    loop {
        let answer = prompt.ask(&doubt)?;
        match apply_answer(&doubt, kind, &set0, &set1, &answer) {
            Ok(entries) => return Ok(entries),
            Err(err) => prompt.report(&err.to_string()),
        }
    }
}

fn apply_answer(
    doubt: &Doubt,
    kind: EntityKind,
    set0: &BTreeSet<SmolStr>,
    set1: &BTreeSet<SmolStr>,
    answer: &str,
) -> Result<Vec<PatchEntry>, AnswerError> {
    let commands = parse_answer(doubt, answer)?;

    let mut consumed0: BTreeSet<SmolStr> = BTreeSet::new();
    let mut produced1: BTreeSet<SmolStr> = BTreeSet::new();
    let mut entries = Vec::new();

    for command in commands {
        match command {
            AnswerCommand::Create(name) => {
                if !set1.contains(&name) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name:?} is not a target name."
                    )));
                }
                if !produced1.insert(name.clone()) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name:?} exists already."
                    )));
                }
                entries.push(PatchEntry::create(kind, name));
            }
            AnswerCommand::Unchanged(name) => {
                if !set0.contains(&name) || !set1.contains(&name) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name:?} is not on both sides."
                    )));
                }
                if !consumed0.insert(name.clone()) || !produced1.insert(name.clone()) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name:?} is accounted twice."
                    )));
                }
                entries.push(PatchEntry::unchanged(kind, name));
            }
            AnswerCommand::Rename(name0, name1) => {
                if !set0.contains(&name0) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name0:?} is not a source name."
                    )));
                }
                if !set1.contains(&name1) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name1:?} is not a target name."
                    )));
                }
                if !consumed0.insert(name0.clone()) || !produced1.insert(name1.clone()) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name0:?}/{name1:?} is accounted twice."
                    )));
                }
                entries.push(PatchEntry::rename(kind, name0, name1));
            }
            AnswerCommand::Drop(name) => {
                if !set0.contains(&name) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name:?} is not a source name."
                    )));
                }
                if !consumed0.insert(name.clone()) {
                    return Err(AnswerError::new(format!(
                        "Answer conflict detected: {name:?} is accounted twice."
                    )));
                }
                entries.push(PatchEntry::drop(kind, name));
            }
        }
    }

    if consumed0 != *set0 || produced1 != *set1 {
        let missing0: Vec<&SmolStr> = set0.difference(&consumed0).collect();
        let missing1: Vec<&SmolStr> = set1.difference(&produced1).collect();
        return Err(AnswerError::new(format!(
            "Answer incomplete: unaccounted source names {missing0:?}, target names {missing1:?}."
        )));
    }
    Ok(entries)
}

enum AnswerCommand {
    Create(SmolStr),
    Unchanged(SmolStr),
    Rename(SmolStr, SmolStr),
    Drop(SmolStr),
}

fn parse_answer(doubt: &Doubt, answer: &str) -> Result<Vec<AnswerCommand>, AnswerError> {
    let tokens: Vec<&str> = answer.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(AnswerError::new("Empty answer."));
    }

    // A line of bare numbers picks shortcuts by index.
    if tokens.iter().all(|token| token.chars().all(|ch| ch.is_ascii_digit())) {
        let mut words = Vec::new();
        for token in &tokens {
            let index: usize = token
                .parse()
                .map_err(|_| AnswerError::new(format!("{token:?} is not a shortcut index.")))?;
            let shortcut = doubt.shortcuts.get(index).ok_or_else(|| {
                AnswerError::new(format!(
                    "{index} is not in 0..{}.",
                    doubt.shortcuts.len()
                ))
            })?;
            words.extend(shortcut.split_whitespace().map(str::to_string));
        }
        return parse_words(&words);
    }

    parse_words(&tokens.iter().map(|token| token.to_string()).collect::<Vec<_>>())
}

#[derive(Clone, Copy)]
enum CommandWord {
    Create,
    Unchanged,
    Rename,
    Drop,
}

fn parse_words(words: &[String]) -> Result<Vec<AnswerCommand>, AnswerError> {
    let mut commands = Vec::new();
    let mut current: Option<CommandWord> = None;
    for word in words {
        match word.to_ascii_lowercase().as_str() {
            "create" => current = Some(CommandWord::Create),
            "unchanged" => current = Some(CommandWord::Unchanged),
            "rename" => current = Some(CommandWord::Rename),
            "drop" => current = Some(CommandWord::Drop),
            _ => match current {
                Some(CommandWord::Create) => {
                    commands.push(AnswerCommand::Create(SmolStr::new(word)));
                }
                Some(CommandWord::Unchanged) => {
                    commands.push(AnswerCommand::Unchanged(SmolStr::new(word)));
                }
                Some(CommandWord::Rename) => {
                    let (name0, name1) = word.split_once('/').ok_or_else(|| {
                        AnswerError::new(format!("Rename {word:?} must be 'name0/name1'."))
                    })?;
                    commands
                        .push(AnswerCommand::Rename(SmolStr::new(name0), SmolStr::new(name1)));
                }
                Some(CommandWord::Drop) => {
                    commands.push(AnswerCommand::Drop(SmolStr::new(word)));
                }
                None => {
                    return Err(AnswerError::new(format!("Unsupported answer: {word:?}.")));
                }
            },
        }
    }
    if commands.is_empty() {
        return Err(AnswerError::new("Answer names nothing."));
    }
    Ok(commands)
}

/// Similarity ratio based on the longest common subsequence.
fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut row = vec![0usize; b.len() + 1];
    for ch_a in &a {
        let mut prev_diag = 0;
        for (j, ch_b) in b.iter().enumerate() {
            let prev_row = row[j + 1];
            row[j + 1] = if ch_a == ch_b {
                prev_diag + 1
            } else {
                row[j + 1].max(row[j])
            };
            prev_diag = prev_row;
        }
    }
    (2 * row[b.len()]) as f64 / (a.len() + b.len()) as f64
}

/// Candidates similar to `name`, best first.
fn close_matches<'a, I>(name: &SmolStr, candidates: I) -> Vec<SmolStr>
where
    I: IntoIterator<Item = &'a SmolStr>,
{
    let mut scored: Vec<(f64, SmolStr)> = candidates
        .into_iter()
        .map(|candidate| (lcs_ratio(name, candidate), candidate.clone()))
        .filter(|(ratio, _)| *ratio >= CLOSE_MATCH_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(CLOSE_MATCHES_PER_NAME)
        .map(|(_, name)| name)
        .collect()
}
