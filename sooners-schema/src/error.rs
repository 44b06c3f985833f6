//! Error types for the schema model.

use thiserror::Error;

/// Result type alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building, serializing or loading schema
/// documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML reading or writing error.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A document did not match the expected structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A stored checksum disagrees with the recomputed canonical hash.
    #[error(
        "Checksum mismatch for component '{component}' version {version}: \
         stored {stored}, computed {computed}"
    )]
    ChecksumMismatch {
        /// Component name.
        component: String,
        /// Version number of the offending document.
        version: u32,
        /// Checksum attribute found in the file.
        stored: String,
        /// Checksum recomputed from the canonical serialization.
        computed: String,
    },

    /// An unregistered column type name was encountered.
    #[error("Unknown column type: {0}")]
    UnknownColumnType(String),

    /// An attribute value could not be parsed.
    #[error("Invalid value for attribute '{attribute}': {value:?}")]
    InvalidAttribute {
        /// Attribute name.
        attribute: String,
        /// Offending text.
        value: String,
    },

    /// Schema deployment params are malformed or incomplete.
    #[error("Invalid schema params: {0}")]
    Params(String),

    /// A version file is missing from the component history.
    #[error("Version file not found: {0}")]
    VersionNotFound(String),
}

impl SchemaError {
    /// Create an invalid-document error.
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Create a params error.
    pub fn params(msg: impl Into<String>) -> Self {
        Self::Params(msg.into())
    }

    /// Create an invalid-attribute error.
    pub fn invalid_attribute(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}
