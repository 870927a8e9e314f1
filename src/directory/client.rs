use crate::directory::filter::Filter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Directory connection failed: {0}. Check the LDAP server URL and bind credentials.")]
    Connection(String),

    #[error("Directory search failed: {0}")]
    Search(String),

    #[error("Directory search did not complete within {0:?}")]
    Timeout(Duration),
}

/// Single whole-subtree search against the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base: impl Into<String>, filter: Filter, attributes: &[&str]) -> Self {
        Self {
            base: base.into(),
            filter,
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A directory entry as returned by a search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_values<I, S>(mut self, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(attribute.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Values of an attribute in server order. Attribute names compare
    /// case-insensitively, as LDAP attribute descriptions do.
    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// Name of a `<attribute>;range=<low>-<high>` variant, which the server
    /// returns instead of the plain attribute when the value list is paged.
    pub fn ranged_attribute(&self, attribute: &str) -> Option<&str> {
        let prefix = format!("{};range=", attribute.to_ascii_lowercase());
        self.attributes
            .keys()
            .find(|name| name.to_ascii_lowercase().starts_with(&prefix))
            .map(String::as_str)
    }
}

/// Whether `returned` is `requested`, possibly carrying attribute options
/// such as `;range=0-1499` or `;binary`
pub fn is_attribute_variant(returned: &str, requested: &str) -> bool {
    match returned.split_once(';') {
        Some((base, _)) => base.eq_ignore_ascii_case(requested),
        None => returned.eq_ignore_ascii_case(requested),
    }
}

/// Search capability the resolver depends on. Authentication, pooling and
/// transport are the implementor's concern.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}
