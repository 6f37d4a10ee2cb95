//! Turns a flat recursive listing into a [`Snapshot`].

use std::sync::Arc;

use anyhow::{Context, Error};
use futures::future::join_all;
use vfs_ratelimit::{ConcurrencyLimiter, RequestLimiter};

use crate::config::TreeCacheConfig;
use crate::entry::{Entry, Node, Snapshot};
use crate::error::BuildError;
use crate::mode::parse_mode;
use crate::path;
use crate::repository::{RemoteKind, RemoteTreeEntry, RepositoryHandle};

/// Metadata that has to be fetched separately for one listed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuxFetch {
    /// Ask the host for the submodule's origin URL.
    Submodule { path: String },
    /// Read the link target, which is stored as blob content.
    Symlink {
        path: String,
        dir: String,
        content_hash: String,
    },
}

impl AuxFetch {
    pub fn path(&self) -> &str {
        match self {
            AuxFetch::Submodule { path } | AuxFetch::Symlink { path, .. } => path,
        }
    }
}

#[derive(Debug)]
enum AuxOutcome {
    Submodule { path: String, url: Option<String> },
    Symlink { path: String, target: String },
}

pub struct TreeBuilder {
    repo: Arc<dyn RepositoryHandle>,
    limiter: Arc<dyn RequestLimiter>,
    follow_symlinks: bool,
}

impl std::fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("repo", &self.repo)
            .field("limiter_capacity", &self.limiter.capacity())
            .field("follow_symlinks", &self.follow_symlinks)
            .finish()
    }
}

impl TreeBuilder {
    pub fn new(repo: Arc<dyn RepositoryHandle>, config: &TreeCacheConfig) -> Self {
        TreeBuilder {
            repo,
            limiter: Arc::new(ConcurrencyLimiter::new(config.aux_fetch_concurrency.max(1))),
            follow_symlinks: config.follow_symlinks,
        }
    }

    /// Use a caller-provided limiter for auxiliary fetches, e.g. one shared
    /// with other clients of the same API.
    pub fn with_limiter(self, limiter: Arc<dyn RequestLimiter>) -> Self {
        TreeBuilder { limiter, ..self }
    }

    /// Build the snapshot for `commit` and resolve all auxiliary metadata.
    ///
    /// Auxiliary fetch failures are logged and leave the corresponding
    /// field unset; only a malformed listing fails the build.
    #[tracing::instrument(level = "debug", skip_all, fields(%commit, entries = items.len()))]
    pub async fn build(
        &self,
        reference: &str,
        commit: &str,
        items: &[RemoteTreeEntry],
    ) -> Result<Snapshot, BuildError> {
        let (mut root, fetches) = self.assemble(items)?;

        let outcomes = join_all(fetches.iter().map(|fetch| self.run_fetch(reference, fetch))).await;

        let requested = fetches.len();
        let mut resolved = 0;
        for outcome in outcomes.into_iter().flatten() {
            resolved += 1;
            apply(&mut root, outcome);
        }

        tracing::debug!(requested, resolved, "tree built");
        Ok(Snapshot::new(commit, root))
    }

    /// The synchronous half of [`TreeBuilder::build`]: place every listed
    /// entry and collect the auxiliary fetches it needs.
    pub fn assemble(
        &self,
        items: &[RemoteTreeEntry],
    ) -> Result<(Entry, Vec<AuxFetch>), BuildError> {
        let mut root = Entry::root();
        // Populated up front so an empty repository lists as an empty root.
        root.children_mut();
        let mut fetches = Vec::new();

        for item in items {
            let relative = item.path.trim_matches('/');
            if relative.is_empty() {
                return Err(BuildError::EmptyPath);
            }
            let (parent, name) = path::split_parent(relative);
            let entry = Entry::new(
                name,
                parse_mode(&item.mode)?,
                item.size.unwrap_or(0),
                item.content_hash.clone(),
            );
            let is_symlink = entry.is_symlink();

            insert(&mut root, relative, parent, name, entry)?;

            if item.kind == RemoteKind::Commit {
                fetches.push(AuxFetch::Submodule {
                    path: relative.to_string(),
                });
            }
            if self.follow_symlinks && is_symlink {
                fetches.push(AuxFetch::Symlink {
                    path: relative.to_string(),
                    dir: format!("/{parent}"),
                    content_hash: item.content_hash.clone(),
                });
            }
        }

        Ok((root, fetches))
    }

    async fn run_fetch(&self, reference: &str, fetch: &AuxFetch) -> Option<AuxOutcome> {
        match vfs_ratelimit::run(self.limiter.as_ref(), self.fetch(reference, fetch)).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(error)) => {
                tracing::warn!(
                    path = fetch.path(),
                    error = %format!("{error:#}"),
                    "auxiliary fetch failed, leaving entry unresolved",
                );
                None
            }
            Err(error) => {
                tracing::warn!(path = fetch.path(), %error, "auxiliary fetch was not admitted");
                None
            }
        }
    }

    async fn fetch(&self, reference: &str, fetch: &AuxFetch) -> Result<AuxOutcome, Error> {
        match fetch {
            AuxFetch::Submodule { path } => {
                let contents = self.repo.contents(reference, path).await?;
                Ok(AuxOutcome::Submodule {
                    path: path.clone(),
                    url: contents.submodule_url,
                })
            }
            AuxFetch::Symlink {
                path,
                dir,
                content_hash,
            } => {
                let blob = self.repo.blob(content_hash).await?;
                let raw = std::str::from_utf8(&blob)
                    .with_context(|| format!("symlink target of \"{path}\" is not UTF-8"))?;
                Ok(AuxOutcome::Symlink {
                    path: path.clone(),
                    target: path::join(dir, raw),
                })
            }
        }
    }
}

fn insert(
    root: &mut Entry,
    full_path: &str,
    parent: &str,
    name: &str,
    entry: Entry,
) -> Result<(), BuildError> {
    let not_a_dir = |walked: &str| BuildError::ParentNotDirectory {
        path: full_path.to_string(),
        parent: format!("/{walked}"),
    };

    let mut current = root;
    let mut walked = String::new();
    for segment in parent.split('/').filter(|s| !s.is_empty()) {
        let children = current.children_mut().ok_or_else(|| not_a_dir(&walked))?;
        current = children
            .entry(segment.to_string())
            .or_insert_with(|| Entry::synthesized_dir(segment));
        if !walked.is_empty() {
            walked.push('/');
        }
        walked.push_str(segment);
    }

    let children = current.children_mut().ok_or_else(|| not_a_dir(&walked))?;

    // A directory may have been synthesized before its own listing arrived.
    let merge = entry.is_dir() && children.get(name).is_some_and(Entry::is_dir);
    if merge {
        if let Some(existing) = children.get_mut(name) {
            existing.mode = entry.mode;
            existing.content_hash = entry.content_hash;
        }
    } else {
        children.insert(name.to_string(), entry);
    }
    Ok(())
}

fn lookup_mut<'a>(root: &'a mut Entry, relative: &str) -> Option<&'a mut Entry> {
    let mut current = root;
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        current = match &mut current.node {
            Node::Directory {
                children: Some(children),
                ..
            } => children.get_mut(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply(root: &mut Entry, outcome: AuxOutcome) {
    match outcome {
        AuxOutcome::Submodule { path, url } => {
            if let Some(Entry {
                node: Node::Directory { submodule_url, .. },
                ..
            }) = lookup_mut(root, &path)
            {
                *submodule_url = url;
            }
        }
        AuxOutcome::Symlink { path, target } => {
            if let Some(Entry {
                node: Node::Symlink { target: slot },
                ..
            }) = lookup_mut(root, &path)
            {
                *slot = Some(target);
            }
        }
    }
}
