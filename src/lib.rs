// Re-export modules for testing and external use
pub mod directory {
    pub mod client;
    pub mod filter;
    pub mod ldap;
    pub mod memory;

    // Re-export commonly used items
    pub use client::{Directory, DirectoryEntry, DirectoryError, SearchRequest};
    pub use filter::Filter;
    pub use ldap::LdapDirectory;
    pub use memory::InMemoryDirectory;
}

pub mod egroup {
    pub mod dn;
    pub mod error;
    pub mod resolver;

    pub use dn::{DirectoryLayout, DnClassifier, MemberRef, GROUP_BASE_DN, USER_BASE_DN};
    pub use error::ResolveError;
    pub use resolver::{GroupResolver, Resolution, ResolveOptions};
}

pub mod shared {
    pub mod logging;
}

pub mod core {
    pub mod service;
}

pub mod config;

// Re-export commonly used types for easier testing and external use
pub use config::Config;
pub use core::service::{EgroupQuery, EgroupReport, EgroupService};
pub use egroup::{GroupResolver, ResolveError, Resolution};
