//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema model or document error.
    #[error(transparent)]
    Schema(#[from] sooners_schema::SchemaError),

    /// Backend/database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// A structural diff could not be resolved into a patch.
    #[error("Ambiguous diff for {kind} at {path}: {names0:?} -> {names1:?}")]
    AmbiguousDiff {
        /// Entity kind under diff.
        kind: &'static str,
        /// Document path of the ambiguous level.
        path: String,
        /// Names on the before side.
        names0: Vec<String>,
        /// Names on the after side.
        names1: Vec<String>,
    },

    /// Both forward and backward signatures appear in the same migration.
    #[error("Migration requires forward and backward at the same time")]
    InconsistentDirection,

    /// A single DDL operation failed; the log keeps everything applied so
    /// far, so the run can continue or withdraw.
    #[error("DDL failed on '{database}' for {operation}: {message}")]
    DdlFailure {
        /// Database the operation ran against.
        database: String,
        /// Display form of the operation.
        operation: String,
        /// Backend error text.
        message: String,
    },

    /// A milestone pattern selected a step lacking the requested direction.
    #[error("Step {step} can not do {direction}")]
    StepBanned {
        /// Step display form.
        step: String,
        /// Requested direction.
        direction: &'static str,
    },

    /// A patch document did not match the expected grammar.
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// Migration metadata is inconsistent with the bookkeeping tables.
    #[error("Inconsistent bookkeeping: {0}")]
    Bookkeeping(String),

    /// Configuration or milestone definition error.
    #[error("Config error: {0}")]
    Config(String),

    /// The operation was interrupted by the user.
    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an invalid-patch error.
    pub fn invalid_patch(msg: impl Into<String>) -> Self {
        Self::InvalidPatch(msg.into())
    }

    /// Create a bookkeeping error.
    pub fn bookkeeping(msg: impl Into<String>) -> Self {
        Self::Bookkeeping(msg.into())
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// A malformed answer to an interactive disambiguation prompt. Recoverable:
/// the prompt repeats.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AnswerError(pub String);

impl AnswerError {
    /// Create an answer error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
