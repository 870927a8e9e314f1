use crate::config::LdapConfig;
use crate::directory::client::{Directory, DirectoryEntry, DirectoryError, SearchRequest};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Directory backed by an `ldap3` async connection
pub struct LdapDirectory {
    ldap: Ldap,
    server: String,
    operation_timeout: Option<Duration>,
}

impl LdapDirectory {
    /// Open a connection and bind. Without bind credentials the connection
    /// stays anonymous.
    pub async fn connect(config: &LdapConfig) -> Result<Self, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(config.connect_timeout_secs))
            .set_starttls(config.starttls);

        debug!("Connecting to LDAP server {}", config.server);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &config.server)
            .await
            .map_err(|e| DirectoryError::Connection(format!("{}: {}", config.server, e)))?;

        let server = config.server.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection to {} terminated: {}", server, e);
            }
        });

        if let (Some(dn), Some(password)) = (&config.bind_dn, &config.bind_password) {
            ldap.simple_bind(dn, password)
                .await
                .and_then(|result| result.success())
                .map_err(|e| DirectoryError::Connection(format!("bind as {} failed: {}", dn, e)))?;
            info!("Bound to {} as {}", config.server, dn);
        } else {
            info!("Connected to {} anonymously", config.server);
        }

        Ok(Self {
            ldap,
            server: config.server.clone(),
            operation_timeout: None,
        })
    }

    /// Apply a server-side operation timeout to every search issued through this handle
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub async fn close(&self) -> Result<(), DirectoryError> {
        debug!("Unbinding from {}", self.server);
        let mut ldap = self.ldap.clone();
        ldap.unbind()
            .await
            .map_err(|e| DirectoryError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut ldap = self.ldap.clone();
        if let Some(timeout) = self.operation_timeout {
            ldap.with_timeout(timeout);
        }

        let filter = request.filter.to_string();
        let (entries, _) = ldap
            .search(&request.base, Scope::Subtree, &filter, request.attributes.clone())
            .await
            .and_then(|result| result.success())
            .map_err(|e| DirectoryError::Search(format!("{} under {}: {}", filter, request.base, e)))?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry = SearchEntry::construct(entry);
                DirectoryEntry {
                    dn: entry.dn,
                    attributes: entry.attrs,
                }
            })
            .collect())
    }
}
