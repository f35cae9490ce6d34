use crate::path::PathParseError;
use std::fmt;
use std::io;

/// Unified error type for the entire crate.
///
/// This error type centralizes all hard failures that can occur while
/// navigating or mutating a tree. Missing optional data is never an error:
/// lookups report absence through the `None` sentinel so that chained
/// queries flow silently (see `Entry::fetch`).
///
/// Each variant represents a specific category of errors, with associated
/// context to help with debugging and error reporting.
#[derive(Debug)]
pub enum DataTreeError {
    /// An array-of-structures update required an identifier that the value
    /// does not carry
    MissingIdentifier(String),

    /// Mutation attempted on a read-only or otherwise unsupported backend
    UnsupportedOperation(String),

    /// Attempt to change a node's category after it was fixed
    /// (e.g. Mapping to Sequence). Terminal for the node.
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    /// No mapping descriptor file exists for a schema pair
    MappingNotFound(String),

    /// No implementation registered under the requested name
    PluginNotFound(String),

    /// A registered implementation does not satisfy the requested
    /// capability set
    TypeNotCompatible(String),

    /// Malformed backing content (parse/format errors); surfaces at
    /// connection construction time, never at first query
    Malformed(String),

    /// Errors from the embedded store
    Database(String),

    /// Errors related to IO operations
    Io(io::Error),

    /// Errors related to serialization/deserialization
    Serialization(String),

    /// A poisoned lock while accessing shared state
    Lock(String),
}

impl fmt::Display for DataTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIdentifier(msg) => write!(f, "Missing identifier: {}", msg),
            Self::UnsupportedOperation(msg) => write!(f, "Unsupported operation: {}", msg),
            Self::IllegalTransition { from, to } => {
                write!(f, "Illegal category transition: {} -> {}", from, to)
            }
            Self::MappingNotFound(msg) => write!(f, "Mapping not found: {}", msg),
            Self::PluginNotFound(msg) => write!(f, "Plugin not found: {}", msg),
            Self::TypeNotCompatible(msg) => write!(f, "Type not compatible: {}", msg),
            Self::Malformed(msg) => write!(f, "Malformed content: {}", msg),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Lock(msg) => write!(f, "Lock error: {}", msg),
        }
    }
}

impl std::error::Error for DataTreeError {}

impl From<io::Error> for DataTreeError {
    fn from(error: io::Error) -> Self {
        DataTreeError::Io(error)
    }
}

impl From<serde_json::Error> for DataTreeError {
    fn from(error: serde_json::Error) -> Self {
        DataTreeError::Serialization(error.to_string())
    }
}

impl From<sled::Error> for DataTreeError {
    fn from(error: sled::Error) -> Self {
        DataTreeError::Database(error.to_string())
    }
}

impl From<PathParseError> for DataTreeError {
    fn from(error: PathParseError) -> Self {
        DataTreeError::Malformed(error.to_string())
    }
}

/// Result type alias for operations that can fail with a DataTreeError
pub type DataTreeResult<T> = Result<T, DataTreeError>;
