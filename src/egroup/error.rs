use crate::directory::client::DirectoryError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("At least one group name is required")]
    EmptyInput,

    #[error("Directory lookup for '{name}' failed: {source}")]
    Directory {
        name: String,
        #[source]
        source: DirectoryError,
    },

    #[error("'{name}' not found under '{base}'. Check the name spelling or the directory layout.")]
    NotFound { name: String, base: String },

    #[error("'{name}' matched {count} directory entries where exactly one was expected")]
    Ambiguous { name: String, count: usize },

    #[error("'{name}' has no '{attribute}' attribute")]
    MissingAttribute { name: String, attribute: String },

    #[error("'{name}' returned a paged '{attribute}' value list; groups above the server's value limit are not supported")]
    RangedAttribute { name: String, attribute: String },

    #[error("Group '{group}' is nested deeper than the limit of {limit} levels")]
    DepthExceeded { group: String, limit: usize },

    #[error("Invalid directory layout: {0}")]
    InvalidLayout(String),
}

impl From<regex::Error> for ResolveError {
    fn from(error: regex::Error) -> Self {
        ResolveError::InvalidLayout(error.to_string())
    }
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ResolveError::Directory {
                source: DirectoryError::Connection(_),
                ..
            }
        )
    }
}
