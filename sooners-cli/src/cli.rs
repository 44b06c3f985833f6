//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// sooners - declarative, reversible, multi-database schema migrations
#[derive(Parser, Debug)]
#[command(name = "sooners")]
#[command(version)]
#[command(about = "Declarative, reversible, multi-database schema migrations", long_about = None)]
pub struct Cli {
    /// Path to the project configuration file
    #[arg(long, default_value = "sooners.toml", global = true)]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Do milestone steps in forward direction
    Msforward(MilestoneArgs),

    /// Do milestone steps in backward direction
    Msbackward(MilestoneArgs),

    /// Finish a broken database schema migration
    Skcontinue(SchemaArgs),

    /// Withdraw a broken database schema migration
    Skwithdraw(SchemaArgs),

    /// Save the current database schema version for each component
    Makeversion(MakeVersionArgs),

    /// Make the patch between two saved versions of a component
    Makepatch(MakePatchArgs),
}

/// Arguments shared by `msforward` and `msbackward`
#[derive(Args, Debug)]
pub struct MilestoneArgs {
    /// Milestone name (a file stem under the milestones directory)
    pub milestone: String,

    /// Only steps whose display form matches a pattern (or `first-last`
    /// range) are planned to action
    pub patterns: Vec<String>,

    /// Show the steps of the specified milestone and exit
    #[arg(long)]
    pub show: bool,

    /// Confirm before every step
    #[arg(long)]
    pub confirm: bool,

    /// Just show the planned actions, do not act
    #[arg(long)]
    pub no_action: bool,

    /// Log every emitted DDL statement
    #[arg(long)]
    pub debug_schema: bool,
}

/// Arguments shared by `skcontinue` and `skwithdraw`
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Just show the planned actions, do not act
    #[arg(long)]
    pub no_action: bool,

    /// Log every emitted DDL statement
    #[arg(long)]
    pub debug_schema: bool,
}

/// Arguments for `makeversion`
#[derive(Args, Debug)]
pub struct MakeVersionArgs {
    /// Components to snapshot (all components when omitted)
    pub component: Vec<String>,
}

/// Arguments for `makepatch`
#[derive(Args, Debug)]
pub struct MakePatchArgs {
    /// Component to patch
    pub component: String,

    /// The lower version of the pair
    pub version0: u32,

    /// The higher version of the pair
    pub version1: u32,
}
