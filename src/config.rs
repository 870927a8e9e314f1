use crate::egroup::dn::DirectoryLayout;
use crate::egroup::resolver::ResolveOptions;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_LDAP_SERVER: &str = "ldap://xldap.cern.ch:389";

const CONFIG_DIR: &str = "cern-egroup";
const CONFIG_FILE: &str = "config.json";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapConfig {
    pub server: String,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    pub connect_timeout_secs: u64,
    pub starttls: bool,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_LDAP_SERVER.to_string(),
            bind_dn: None,
            bind_password: None,
            connect_timeout_secs: 10,
            starttls: false,
        }
    }
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("server", &self.server)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "<redacted>"),
            )
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("starttls", &self.starttls)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub max_depth: usize,
    /// 0 disables the per-search deadline
    pub search_timeout_secs: u64,
    pub mail_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            search_timeout_secs: 30,
            mail_concurrency: 4,
        }
    }
}

impl ResolverConfig {
    pub fn options(&self) -> ResolveOptions {
        ResolveOptions {
            max_depth: self.max_depth,
            search_timeout: (self.search_timeout_secs > 0)
                .then(|| Duration::from_secs(self.search_timeout_secs)),
            mail_concurrency: self.mail_concurrency,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ldap: LdapConfig,
    pub layout: DirectoryLayout,
    pub resolver: ResolverConfig,
}

impl Config {
    /// Load from an explicit path, else the user config file if present,
    /// else defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    info!("No config file found, using default configuration");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `CERN_*` overrides using the given variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup("CERN_LDAP_SERVER") {
            debug!("Using LDAP server from CERN_LDAP_SERVER: {}", server);
            self.ldap.server = server;
        }
        if let Some(dn) = lookup("CERN_LDAP_BIND_DN") {
            self.ldap.bind_dn = Some(dn);
        }
        if let Some(password) = lookup("CERN_LDAP_BIND_PASSWORD") {
            self.ldap.bind_password = Some(password);
        }
        if let Some(depth) = lookup("CERN_EGROUP_MAX_DEPTH") {
            self.resolver.max_depth = depth
                .parse()
                .with_context(|| format!("CERN_EGROUP_MAX_DEPTH is not a number: {}", depth))?;
        }
        if let Some(secs) = lookup("CERN_EGROUP_SEARCH_TIMEOUT") {
            self.resolver.search_timeout_secs = secs
                .parse()
                .with_context(|| format!("CERN_EGROUP_SEARCH_TIMEOUT is not a number: {}", secs))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let scheme_ok = ["ldap://", "ldaps://", "ldapi://"]
            .iter()
            .any(|scheme| self.ldap.server.starts_with(scheme));
        if !scheme_ok {
            bail!(
                "LDAP server must be an ldap://, ldaps:// or ldapi:// URL, got '{}'",
                self.ldap.server
            );
        }
        if self.ldap.bind_dn.is_some() != self.ldap.bind_password.is_some() {
            bail!("bind_dn and bind_password must be configured together");
        }
        if self.resolver.max_depth == 0 {
            bail!("resolver.max_depth must be at least 1");
        }
        if self.layout.group_base.trim().is_empty() || self.layout.user_base.trim().is_empty() {
            bail!("layout.group_base and layout.user_base must not be empty");
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
