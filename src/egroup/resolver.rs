use crate::directory::client::{Directory, DirectoryEntry, DirectoryError, SearchRequest};
use crate::directory::filter::Filter;
use crate::egroup::dn::{DirectoryLayout, DnClassifier, MemberRef};
use crate::egroup::error::ResolveError;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

const MEMBER_ATTR: &str = "member";
const MAIL_ATTR: &str = "mail";

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Deepest nesting level followed below the requested groups
    pub max_depth: usize,
    /// Deadline for each individual directory search
    pub search_timeout: Option<Duration>,
    /// Mail lookups issued concurrently
    pub mail_concurrency: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_depth: 32,
            search_timeout: Some(Duration::from_secs(30)),
            mail_concurrency: 4,
        }
    }
}

/// Flattened membership of one top-level resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Usernames in depth-first directory order. A user reachable through
    /// several nested groups appears once per path.
    pub users: Vec<String>,
    /// Expanded groups, spelled as first reached
    pub visited: BTreeSet<String>,
}

/// Accumulator moved through the recursive expansion
#[derive(Debug, Default)]
struct Expansion {
    resolution: Resolution,
    /// Lowercased names of expanded groups
    seen: HashSet<String>,
}

/// Expands e-groups into their transitive user membership
pub struct GroupResolver {
    directory: Arc<dyn Directory>,
    layout: DirectoryLayout,
    classifier: DnClassifier,
    options: ResolveOptions,
}

impl GroupResolver {
    pub fn new(
        directory: Arc<dyn Directory>,
        layout: DirectoryLayout,
        options: ResolveOptions,
    ) -> Result<Self, ResolveError> {
        let classifier = DnClassifier::new(&layout)?;
        Ok(Self {
            directory,
            layout,
            classifier,
            options: ResolveOptions {
                mail_concurrency: options.mail_concurrency.clamp(1, 16),
                ..options
            },
        })
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Resolve the given groups into the usernames reachable through them.
    /// The first directory failure aborts the whole call.
    pub async fn resolve(&self, groups: &[String]) -> Result<Resolution, ResolveError> {
        if groups.is_empty() {
            return Err(ResolveError::EmptyInput);
        }

        let start_time = Instant::now();
        let resolution = self
            .expand(groups.to_vec(), Expansion::default(), 0)
            .await?
            .resolution;

        info!(
            "Resolved {:?} to {} members across {} groups in {:?}",
            groups,
            resolution.users.len(),
            resolution.visited.len(),
            start_time.elapsed()
        );
        Ok(resolution)
    }

    fn expand<'a>(
        &'a self,
        groups: Vec<String>,
        mut acc: Expansion,
        depth: usize,
    ) -> BoxFuture<'a, Result<Expansion, ResolveError>> {
        async move {
            for group in groups {
                // cn matching is case-insensitive, so spellings of one group share a key
                let key = group.to_ascii_lowercase();
                if acc.seen.contains(&key) {
                    debug!("Skipping already expanded group {}", group);
                    continue;
                }
                if depth > self.options.max_depth {
                    return Err(ResolveError::DepthExceeded {
                        group,
                        limit: self.options.max_depth,
                    });
                }
                acc.seen.insert(key);
                acc.resolution.visited.insert(group.clone());

                let entry = self.lookup_group(&group).await?;
                for member in entry.values(MEMBER_ATTR) {
                    match self.classifier.classify(member) {
                        MemberRef::User(user) => acc.resolution.users.push(user),
                        MemberRef::Group(nested) => {
                            acc = self.expand(vec![nested], acc, depth + 1).await?;
                        }
                        MemberRef::Unrecognized => {
                            trace!("Ignoring member {} of {}", member, group);
                        }
                    }
                }
            }
            Ok(acc)
        }
        .boxed()
    }

    async fn lookup_group(&self, group: &str) -> Result<DirectoryEntry, ResolveError> {
        let request = SearchRequest::new(
            self.layout.group_base.as_str(),
            Filter::group_named(group),
            &[MEMBER_ATTR],
        );
        let entry = self.search_one(group, &request).await?;

        // Active Directory pages large member lists as `member;range=0-1499`
        if let Some(attribute) = entry.ranged_attribute(MEMBER_ATTR) {
            return Err(ResolveError::RangedAttribute {
                name: group.to_string(),
                attribute: attribute.to_string(),
            });
        }

        debug!(
            "Group {} has {} direct members",
            group,
            entry.values(MEMBER_ATTR).len()
        );
        Ok(entry)
    }

    /// Resolve the mail address of each user, preserving input order
    pub async fn resolve_mails(&self, users: &[String]) -> Result<Vec<String>, ResolveError> {
        let start_time = Instant::now();
        let mut mails = Vec::with_capacity(users.len());

        for chunk in users.chunks(self.options.mail_concurrency) {
            let results = join_all(chunk.iter().map(|user| self.lookup_mail(user))).await;
            for result in results {
                mails.push(result?);
            }
        }

        debug!(
            "Resolved {} mail addresses in {:?}",
            mails.len(),
            start_time.elapsed()
        );
        Ok(mails)
    }

    async fn lookup_mail(&self, user: &str) -> Result<String, ResolveError> {
        let request = SearchRequest::new(
            self.layout.user_base.as_str(),
            Filter::entry_named(user),
            &[MAIL_ATTR],
        );
        let entry = self.search_one(user, &request).await?;
        entry
            .values(MAIL_ATTR)
            .first()
            .cloned()
            .ok_or_else(|| ResolveError::MissingAttribute {
                name: user.to_string(),
                attribute: MAIL_ATTR.to_string(),
            })
    }

    /// Run a search that must return exactly one entry
    async fn search_one(
        &self,
        name: &str,
        request: &SearchRequest,
    ) -> Result<DirectoryEntry, ResolveError> {
        debug!("Searching {} under {}", request.filter, request.base);

        let search = self.directory.search(request);
        let result = match self.options.search_timeout {
            Some(limit) => match tokio::time::timeout(limit, search).await {
                Ok(result) => result,
                Err(_) => Err(DirectoryError::Timeout(limit)),
            },
            None => search.await,
        };

        let mut entries = result.map_err(|source| {
            warn!("Directory lookup for {} failed: {}", name, source);
            ResolveError::Directory {
                name: name.to_string(),
                source,
            }
        })?;

        match entries.len() {
            0 => Err(ResolveError::NotFound {
                name: name.to_string(),
                base: request.base.clone(),
            }),
            1 => Ok(entries.remove(0)),
            count => Err(ResolveError::Ambiguous {
                name: name.to_string(),
                count,
            }),
        }
    }
}
