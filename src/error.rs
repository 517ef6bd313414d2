use std::{fmt, io};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::node::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum SylvaError {
    #[error("Adapter error: {0}")]
    Adapter(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Engine invariant violated: {0}")]
    Invariant(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SylvaError {
    fn from(src: toml::de::Error) -> SylvaError {
        SylvaError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for SylvaError {
    fn from(src: toml::ser::Error) -> SylvaError {
        SylvaError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for SylvaError {
    fn from(src: JsonError) -> SylvaError {
        SylvaError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<RegexError> for SylvaError {
    fn from(x: RegexError) -> Self {
        SylvaError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<io::Error> for SylvaError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => SylvaError::NotFound(format!("{x}")),
            _ => SylvaError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

/// Which kind of load a recorded failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorScope {
    Root,
    Children,
    Page,
    Navigation,
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorScope::Root => write!(f, "root"),
            ErrorScope::Children => write!(f, "children"),
            ErrorScope::Page => write!(f, "page"),
            ErrorScope::Navigation => write!(f, "navigation"),
        }
    }
}

/// A failure reported by the host for one of the engine's requests.
///
/// These are recorded in engine state and surfaced through
/// [`TreeCommand::EmitLoadError`](crate::commands::TreeCommand::EmitLoadError); they are never
/// returned as `Err` from dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLoadError {
    pub scope: ErrorScope,
    pub node_id: Option<NodeId>,
    pub page_index: Option<usize>,
    pub reason: String,
    pub timestamp_ms: u64,
}

impl fmt::Display for TreeLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} load failed", self.scope)?;
        if let Some(id) = &self.node_id {
            write!(f, " for {id}")?;
        }
        if let Some(page) = self.page_index {
            write!(f, " (page {page})")?;
        }
        write!(f, ": {}", self.reason)
    }
}
