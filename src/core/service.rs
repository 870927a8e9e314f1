use crate::config::Config;
use crate::directory::client::Directory;
use crate::directory::ldap::LdapDirectory;
use crate::egroup::error::ResolveError;
use crate::egroup::resolver::GroupResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EgroupQuery {
    pub groups: Vec<String>,
    #[serde(default)]
    pub query_mails: bool,
}

/// Membership of the queried e-groups. `mails` is only populated when mail
/// lookup was requested and is otherwise empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EgroupReport {
    pub groups: Vec<String>,
    pub members: Vec<String>,
    pub visited: BTreeSet<String>,
    pub mails: Vec<String>,
}

pub struct EgroupService {
    config: Config,
    resolver: GroupResolver,
    ldap: Option<Arc<LdapDirectory>>,
}

impl EgroupService {
    /// Connect to the configured LDAP server
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let options = config.resolver.options();
        let mut directory = LdapDirectory::connect(&config.ldap).await?;
        if let Some(timeout) = options.search_timeout {
            directory = directory.with_operation_timeout(timeout);
        }
        let ldap = Arc::new(directory);
        let resolver = GroupResolver::new(ldap.clone(), config.layout.clone(), options)?;

        Ok(Self {
            config,
            resolver,
            ldap: Some(ldap),
        })
    }

    /// Use an already established directory, e.g. an offline snapshot
    pub fn with_directory(config: Config, directory: Arc<dyn Directory>) -> anyhow::Result<Self> {
        let resolver =
            GroupResolver::new(directory, config.layout.clone(), config.resolver.options())?;
        Ok(Self {
            config,
            resolver,
            ldap: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn query(&self, query: &EgroupQuery) -> Result<EgroupReport, ResolveError> {
        info!(
            "Querying e-groups {:?} (mails: {})",
            query.groups, query.query_mails
        );
        let resolution = self.resolver.resolve(&query.groups).await?;

        let mails = if query.query_mails {
            self.resolver.resolve_mails(&resolution.users).await?
        } else {
            Vec::new()
        };

        Ok(EgroupReport {
            groups: query.groups.clone(),
            members: resolution.users,
            visited: resolution.visited,
            mails,
        })
    }

    pub async fn mails(&self, users: &[String]) -> Result<Vec<String>, ResolveError> {
        self.resolver.resolve_mails(users).await
    }

    /// Unbind from the LDAP server if this service opened the connection
    pub async fn shutdown(self) {
        if let Some(ldap) = self.ldap {
            if let Err(e) = ldap.close().await {
                warn!("Failed to unbind from {}: {}", ldap.server(), e);
            }
        }
    }
}
