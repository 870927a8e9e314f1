use crate::directory::client::{
    is_attribute_variant, Directory, DirectoryEntry, DirectoryError, SearchRequest,
};
use crate::egroup::dn::DirectoryLayout;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    entries: Vec<DirectoryEntry>,
}

/// Directory held entirely in memory. Serves offline snapshots and records
/// every request it answers.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: Vec<DirectoryEntry>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).context("Invalid directory snapshot")?;
        Ok(Self {
            entries: snapshot.entries,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read directory snapshot {}", path.display()))?;
        let directory = Self::from_json_str(&content)
            .with_context(|| format!("Failed to load directory snapshot {}", path.display()))?;
        debug!(
            "Loaded {} directory entries from {}",
            directory.entries.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn with_entry(mut self, entry: DirectoryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Add a group whose `member` attribute lists the given DNs in order
    pub fn with_group<I, S>(self, layout: &DirectoryLayout, name: &str, member_dns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = DirectoryEntry::new(layout.group_dn(name))
            .with_values("cn", [name])
            .with_values("objectClass", ["top", "group"])
            .with_values("member", member_dns);
        self.with_entry(entry)
    }

    pub fn with_user<I, S>(self, layout: &DirectoryLayout, name: &str, mails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = DirectoryEntry::new(layout.user_dn(name))
            .with_values("cn", [name])
            .with_values("objectClass", ["top", "person", "user"])
            .with_values("mail", mails);
        self.with_entry(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Requests served so far, in arrival order
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn search_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Number of searches whose filter names `cn`
    pub fn searches_for(&self, cn: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| {
                let needle = format!("(CN={})", cn);
                request.filter.to_string().contains(&needle)
            })
            .count()
    }
}

fn within_base(dn: &str, base: &str) -> bool {
    let dn = dn.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    dn == base || dn.ends_with(&format!(",{}", base))
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        Ok(self
            .entries
            .iter()
            .filter(|entry| within_base(&entry.dn, &request.base))
            .filter(|entry| request.filter.matches(entry))
            .map(|entry| DirectoryEntry {
                dn: entry.dn.clone(),
                attributes: entry
                    .attributes
                    .iter()
                    .filter(|(name, _)| {
                        request
                            .attributes
                            .iter()
                            .any(|wanted| is_attribute_variant(name, wanted))
                    })
                    .map(|(name, values)| (name.clone(), values.clone()))
                    .collect(),
            })
            .collect())
    }
}
