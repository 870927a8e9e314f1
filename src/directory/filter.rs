//! Typed LDAP search filters.
//!
//! Filters are built from typed parts and rendered to RFC 4515 text only at
//! the wire boundary, with every assertion value escaped. A group name such as
//! `it-*` therefore matches the literal name and never turns into a wildcard.

use crate::directory::client::DirectoryEntry;
use ldap3::ldap_escape;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equal { attribute: String, value: String },
    And(Vec<Filter>),
}

impl Filter {
    pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equal {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// `(&(objectClass=group)(CN=<name>))`
    pub fn group_named(name: &str) -> Self {
        Filter::And(vec![
            Filter::equal("objectClass", "group"),
            Filter::equal("CN", name),
        ])
    }

    /// `(CN=<name>)`
    pub fn entry_named(name: &str) -> Self {
        Filter::equal("CN", name)
    }

    /// Evaluate the filter locally. Equality is case-insensitive on both the
    /// attribute name and the value, matching the directory's matching rules
    /// for `cn` and `objectClass`.
    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::Equal { attribute, value } => entry
                .values(attribute)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equal { attribute, value } => {
                write!(f, "({}={})", attribute, ldap_escape(value.as_str()))
            }
            Filter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
        }
    }
}
