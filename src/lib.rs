//! # srcfacts - Incremental Program-Fact Repository
//!
//! A persistent, incrementally updating store of program facts extracted
//! from syntactic source markup (srcML-style XML file units for C, C++,
//! Java, and C#).
//!
//! srcfacts provides:
//! - A language-independent scope graph of declarations, statements, and
//!   expressions, merged across file units into one global view
//! - Lexical, qualified, and import/alias-aware name resolution
//! - A concurrent parse-then-merge ingest pipeline driven by file events
//! - Whole-graph binary snapshots with a version check
//! - Location-based queries (containing scope, method calls, resolution)

pub mod config;
pub mod events;
pub mod language;
pub mod location;
pub mod parser;
pub mod pipeline;
pub mod repository;
pub mod scope;
pub mod snapshot;
pub mod watcher;

// Re-exports for convenient access
pub use events::{FileEvent, FileEventKind, RepoEvent};
pub use language::Language;
pub use location::Location;
pub use parser::{FileUnit, ParserRegistry, UnitParser};
pub use repository::FactRepository;
pub use scope::graph::ScopeGraph;
pub use scope::model::{ScopeId, ScopeKind};

/// Result type alias for srcfacts operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for srcfacts operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lowering a single file unit failed; the unit contributes nothing.
    #[error("parse error at {xpath}: {message}")]
    Parse { xpath: String, message: String },

    /// Snapshot save/load failed (bad magic, version mismatch, codec error).
    #[error("snapshot error: {0}")]
    Serialization(String),

    /// A name use could not be placed in the graph (detached from any
    /// statement), so its environment is unknowable.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A public query was handed an unusable input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The file unit's language tag has no registered parser.
    #[error("no parser registered for language tag '{0}'")]
    UnknownLanguage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph-wide invariant violation. The repository becomes unready and
    /// must be cleared before further use.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// Parse error constructor used throughout lowering.
    pub fn parse(xpath: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            xpath: xpath.into(),
            message: message.into(),
        }
    }

    /// Whether ingest recovers from this error (the file contributes
    /// nothing and processing continues) or the caller must see it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. } | Error::Serialization(_) | Error::UnknownLanguage(_)
        )
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::Serialization(e.to_string())
    }
}
