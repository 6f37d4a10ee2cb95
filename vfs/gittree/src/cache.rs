//! The lazily refreshed tree and its POSIX-style query surface.

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use vfs_ratelimit::RequestLimiter;

use crate::builder::TreeBuilder;
use crate::config::TreeCacheConfig;
use crate::entry::{Entry, Snapshot, TreeStat};
use crate::error::{RefreshError, TreeError, TreeResult};
use crate::repository::RepositoryHandle;
use crate::walker::{PathWalker, WalkFlags};

type RefreshResult = Result<Arc<Snapshot>, RefreshError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct State {
    snapshot: Option<Arc<Snapshot>>,
    dirty: bool,
    /// Bumped by every invalidation, so a refresh that started before the
    /// latest one does not clear the dirty flag.
    generation: u64,
    /// The refresh in flight and the generation it was started for.
    pending: Option<(u64, PendingRefresh)>,
}

struct Inner {
    repo: Arc<dyn RepositoryHandle>,
    builder: TreeBuilder,
    config: TreeCacheConfig,
    fake_mtime: SystemTime,
    state: Mutex<State>,
}

/// A read-only view of one branch or tag of a remote repository.
///
/// The tree is fetched on the first query and again on the first query
/// after [`TreeCache::mark_dirty`]. Queries that arrive while a refresh is
/// running wait for that refresh instead of starting their own. Cloning
/// the cache shares the same tree.
#[derive(Clone)]
pub struct TreeCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TreeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TreeCache")
            .field("reference", &self.inner.config.reference)
            .field("commit", &state.snapshot.as_ref().map(|s| &s.commit))
            .field("dirty", &state.dirty)
            .field("refreshing", &state.pending.is_some())
            .finish()
    }
}

impl TreeCache {
    pub fn new(repo: Arc<dyn RepositoryHandle>, config: TreeCacheConfig) -> Self {
        let builder = TreeBuilder::new(repo.clone(), &config);
        Self::from_parts(repo, config, builder)
    }

    /// Like [`TreeCache::new`], but auxiliary fetches go through `limiter`
    /// instead of a private one sized by `aux_fetch_concurrency`.
    pub fn with_limiter(
        repo: Arc<dyn RepositoryHandle>,
        config: TreeCacheConfig,
        limiter: Arc<dyn RequestLimiter>,
    ) -> Self {
        let builder = TreeBuilder::new(repo.clone(), &config).with_limiter(limiter);
        Self::from_parts(repo, config, builder)
    }

    fn from_parts(
        repo: Arc<dyn RepositoryHandle>,
        config: TreeCacheConfig,
        builder: TreeBuilder,
    ) -> Self {
        TreeCache {
            inner: Arc::new(Inner {
                repo,
                builder,
                config,
                fake_mtime: SystemTime::now(),
                state: Mutex::new(State {
                    snapshot: None,
                    dirty: true,
                    generation: 0,
                    pending: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &TreeCacheConfig {
        &self.inner.config
    }

    /// Mark the tree stale. The next query rebuilds it before answering.
    pub fn mark_dirty(&self) {
        let mut state = self.inner.state.lock();
        state.dirty = true;
        state.generation += 1;
        tracing::debug!(generation = state.generation, "tree marked dirty");
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// The modification time reported for every entry.
    ///
    /// The host has no reliable per-file timestamps, so one time is taken
    /// when the cache is created and reused for its whole lifetime.
    pub fn fake_mtime(&self) -> SystemTime {
        self.inner.fake_mtime
    }

    /// Commit of the most recently installed tree, if any.
    pub fn commit(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state.snapshot.as_ref().map(|s| s.commit.clone())
    }

    /// Metadata for `path`, following symlinks in every segment.
    pub async fn stat(&self, path: &str) -> TreeResult<TreeStat> {
        let snapshot = self.current().await?;
        self.lookup(&snapshot, path, true)
            .map(|entry| entry.to_stat(self.inner.fake_mtime))
    }

    /// Metadata for `path`, without following a symlink in the last segment.
    pub async fn lstat(&self, path: &str) -> TreeResult<TreeStat> {
        let snapshot = self.current().await?;
        self.lookup(&snapshot, path, false)
            .map(|entry| entry.to_stat(self.inner.fake_mtime))
    }

    /// The target of `path` if it is a resolved symlink, otherwise `path` itself.
    ///
    /// A symlink whose target could not be fetched reports its own path
    /// rather than failing.
    pub async fn realpath(&self, path: &str) -> TreeResult<String> {
        let snapshot = self.current().await?;
        let entry = self.lookup(&snapshot, path, false)?;
        Ok(entry.symlink_target().unwrap_or(path).to_string())
    }

    /// Names of the entries in the directory at `path`.
    ///
    /// Order is not significant.
    pub async fn readdir(&self, path: &str) -> TreeResult<Vec<String>> {
        let snapshot = self.current().await?;
        let entry = self.lookup(&snapshot, path, true)?;
        if !entry.is_dir() {
            return Err(TreeError::NotADirectory {
                path: path.to_string(),
            });
        }
        Ok(entry
            .children()
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn lookup<'a>(
        &self,
        snapshot: &'a Snapshot,
        path: &str,
        follow_final: bool,
    ) -> TreeResult<&'a Entry> {
        let flags = WalkFlags {
            follow_symlinks: self.inner.config.follow_symlinks,
            follow_final_symlink: follow_final,
            max_symlinks: self.inner.config.max_symlinks,
        };
        PathWalker::new(&snapshot.root)
            .resolve(path, flags)
            .ok_or_else(|| TreeError::not_found(path))
    }

    /// The tree to answer a query against, refreshing first if it is stale.
    ///
    /// A refresh started before the latest invalidation cannot answer the
    /// query; it is waited out and a new one is started.
    async fn current(&self) -> TreeResult<Arc<Snapshot>> {
        loop {
            let (fresh, pending) = {
                let mut state = self.inner.state.lock();
                if !state.dirty
                    && let Some(snapshot) = &state.snapshot
                {
                    return Ok(snapshot.clone());
                }
                match &state.pending {
                    Some((generation, pending)) => {
                        (*generation == state.generation, pending.clone())
                    }
                    None => {
                        let generation = state.generation;
                        let pending = self.inner.clone().refresh(generation).boxed().shared();
                        state.pending = Some((generation, pending.clone()));
                        (true, pending)
                    }
                }
            };

            let result = pending.await;
            if fresh {
                return result.map_err(TreeError::Interrupted);
            }
        }
    }
}

impl Inner {
    async fn refresh(self: Arc<Self>, generation: u64) -> RefreshResult {
        let result = self.fetch_and_build().await;

        let mut state = self.state.lock();
        state.pending = None;
        match &result {
            Ok(snapshot) => {
                state.snapshot = Some(snapshot.clone());
                if state.generation == generation {
                    state.dirty = false;
                }
            }
            Err(error) => {
                tracing::warn!(%error, "tree refresh failed, will retry on the next query");
            }
        }
        result
    }

    #[tracing::instrument(level = "debug", skip_all, fields(reference = %self.config.reference))]
    async fn fetch_and_build(&self) -> RefreshResult {
        let reference = &self.config.reference;

        let commit = self
            .repo
            .resolve_ref(reference)
            .await
            .map_err(|error| RefreshError::ResolveRef {
                reference: reference.qualified(),
                message: format!("{error:#}"),
            })?;

        let items = self
            .repo
            .recursive_tree(&commit)
            .await
            .map_err(|error| RefreshError::FetchTree {
                commit: commit.clone(),
                message: format!("{error:#}"),
            })?;
        tracing::debug!(%commit, entries = items.len(), "fetched tree listing");

        let snapshot = self
            .builder
            .build(&reference.name, &commit, &items)
            .await
            .map_err(|source| RefreshError::Build {
                commit: commit.clone(),
                source,
            })?;

        Ok(Arc::new(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::repository::{RefSpec, RemoteTreeEntry};
    use crate::testing::InMemoryRepository;

    fn cache(repo: &Arc<InMemoryRepository>) -> TreeCache {
        TreeCache::new(repo.clone(), TreeCacheConfig::default())
    }

    #[test]
    fn starts_dirty_and_empty() {
        let repo = Arc::new(InMemoryRepository::new());
        let cache = cache(&repo);
        assert!(cache.is_dirty());
        assert_eq!(cache.commit(), None);
        assert_eq!(repo.resolve_calls(), 0);
    }

    #[tokio::test]
    async fn first_query_refreshes_once() {
        let repo = Arc::new(InMemoryRepository::with_main(vec![RemoteTreeEntry::blob(
            "a/b.txt", "100644", 10, "h1",
        )]));
        let cache = cache(&repo);

        assert_eq!(cache.readdir("/").await.unwrap(), ["a"]);
        assert_eq!(cache.readdir("/a").await.unwrap(), ["b.txt"]);
        let stat = cache.stat("/a/b.txt").await.unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 10);

        assert!(!cache.is_dirty());
        assert_eq!(cache.commit().as_deref(), Some("c0"));
        assert_eq!(repo.resolve_calls(), 1);
        assert_eq!(repo.tree_calls(), 1);
    }

    #[tokio::test]
    async fn tags_resolve_in_the_tags_namespace() {
        let repo = Arc::new(
            InMemoryRepository::new()
                .with_ref(&RefSpec::tag("v1"), "c7")
                .with_tree("c7", vec![RemoteTreeEntry::blob("f", "100644", 1, "h")]),
        );
        let cache = TreeCache::new(repo.clone(), TreeCacheConfig::new(RefSpec::tag("v1")));

        assert_eq!(cache.readdir("/").await.unwrap(), ["f"]);
        assert_eq!(cache.commit().as_deref(), Some("c7"));
    }

    #[tokio::test]
    async fn every_entry_reports_the_fake_mtime() {
        let repo = Arc::new(InMemoryRepository::with_main(vec![
            RemoteTreeEntry::blob("x", "100644", 1, "h1"),
            RemoteTreeEntry::tree("d", "t1"),
        ]));
        let cache = cache(&repo);

        let mtime = cache.fake_mtime();
        assert_eq!(cache.stat("/x").await.unwrap().modified, mtime);
        assert_eq!(cache.stat("/d").await.unwrap().modified, mtime);
        assert_eq!(cache.stat("/").await.unwrap().modified, mtime);
    }

    #[tokio::test]
    async fn invalidation_during_a_refresh_keeps_the_cache_dirty() {
        let repo = Arc::new(InMemoryRepository::with_main(vec![RemoteTreeEntry::blob(
            "x", "100644", 1, "h1",
        )]));
        let cache = cache(&repo);

        let invalidate = async {
            // Let the refresh reach the repository before invalidating.
            tokio::task::yield_now().await;
            cache.mark_dirty();
        };
        let (listing, ()) = tokio::join!(cache.readdir("/"), invalidate);

        assert_eq!(listing.unwrap(), ["x"]);
        assert!(cache.is_dirty());

        cache.readdir("/").await.unwrap();
        assert!(!cache.is_dirty());
        assert_eq!(repo.resolve_calls(), 2);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_refresh_is_logged() {
        let repo = Arc::new(InMemoryRepository::with_main(Vec::new()));
        repo.set_fail_tree(true);
        let cache = cache(&repo);

        let err = cache.readdir("/").await.unwrap_err();
        assert!(matches!(err, TreeError::Interrupted(RefreshError::FetchTree { .. })));
        assert!(logs_contain("tree refresh failed"));
        assert!(cache.is_dirty());
    }
}
