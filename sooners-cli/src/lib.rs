//! # sooners-cli
//!
//! Command-line interface for the sooners schema migration engine: the
//! milestone drivers (`msforward`/`msbackward`), the resume commands
//! (`skcontinue`/`skwithdraw`) and the history tooling
//! (`makeversion`/`makepatch`), over a `sooners.toml` project
//! configuration.

pub mod cli;
pub mod commands;
pub mod config;
pub mod cron;
pub mod milestones;
pub mod output;
pub mod prompts;
