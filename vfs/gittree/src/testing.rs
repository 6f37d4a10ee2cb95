//! A scripted, in-memory [`RepositoryHandle`].
//!
//! Every call yields to the executor once before answering, so several
//! queries issued together genuinely overlap with a refresh in flight.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Error, anyhow};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::repository::{RefSpec, RemoteTreeEntry, RepoContents, RepositoryHandle};

#[derive(Debug, Default)]
struct State {
    refs: HashMap<String, String>,
    trees: HashMap<String, Vec<RemoteTreeEntry>>,
    blobs: HashMap<String, Bytes>,
    submodule_urls: HashMap<String, String>,
    failing_contents: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    fail_resolve: AtomicBool,
    fail_tree: AtomicBool,
    resolve_calls: AtomicUsize,
    tree_calls: AtomicUsize,
    aux_calls: AtomicUsize,
    aux_in_flight: AtomicUsize,
    max_aux_in_flight: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose `main` branch points at commit `c0` with `entries`.
    pub fn with_main(entries: Vec<RemoteTreeEntry>) -> Self {
        Self::new()
            .with_ref(&RefSpec::branch("main"), "c0")
            .with_tree("c0", entries)
    }

    pub fn with_ref(self, reference: &RefSpec, commit: &str) -> Self {
        self.set_ref(reference, commit);
        self
    }

    pub fn with_tree(self, commit: &str, entries: Vec<RemoteTreeEntry>) -> Self {
        self.set_tree(commit, entries);
        self
    }

    pub fn with_blob(self, content_hash: &str, content: impl Into<Bytes>) -> Self {
        self.state
            .lock()
            .blobs
            .insert(content_hash.to_string(), content.into());
        self
    }

    pub fn with_submodule_url(self, path: &str, url: &str) -> Self {
        self.state
            .lock()
            .submodule_urls
            .insert(path.to_string(), url.to_string());
        self
    }

    pub fn with_failing_contents(self, path: &str) -> Self {
        self.state.lock().failing_contents.insert(path.to_string());
        self
    }

    /// Point `reference` at `commit`, as a push to the host would.
    pub fn set_ref(&self, reference: &RefSpec, commit: &str) {
        self.state
            .lock()
            .refs
            .insert(reference.qualified(), commit.to_string());
    }

    pub fn set_tree(&self, commit: &str, entries: Vec<RemoteTreeEntry>) {
        self.state.lock().trees.insert(commit.to_string(), entries);
    }

    pub fn set_fail_resolve(&self, fail: bool) {
        self.fail_resolve.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_tree(&self, fail: bool) {
        self.fail_tree.store(fail, Ordering::SeqCst);
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    /// Number of `contents` and `blob` calls.
    pub fn aux_calls(&self) -> usize {
        self.aux_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `contents`/`blob` calls observed in flight at once.
    pub fn max_aux_in_flight(&self) -> usize {
        self.max_aux_in_flight.load(Ordering::SeqCst)
    }

    async fn aux_call<T>(
        &self,
        answer: impl FnOnce(&State) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.aux_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.aux_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_aux_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::task::yield_now().await;
        let result = answer(&self.state.lock());

        self.aux_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait::async_trait]
impl RepositoryHandle for InMemoryRepository {
    async fn resolve_ref(&self, reference: &RefSpec) -> Result<String, Error> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(anyhow!("ref lookup rejected"));
        }
        let qualified = reference.qualified();
        self.state
            .lock()
            .refs
            .get(&qualified)
            .cloned()
            .ok_or_else(|| anyhow!("no such ref: {qualified}"))
    }

    async fn recursive_tree(&self, commit: &str) -> Result<Vec<RemoteTreeEntry>, Error> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_tree.load(Ordering::SeqCst) {
            return Err(anyhow!("tree listing rejected"));
        }
        self.state
            .lock()
            .trees
            .get(commit)
            .cloned()
            .ok_or_else(|| anyhow!("no such commit: {commit}"))
    }

    async fn contents(&self, _reference: &str, path: &str) -> Result<RepoContents, Error> {
        self.aux_call(|state| {
            if state.failing_contents.contains(path) {
                return Err(anyhow!("contents lookup failed for {path}"));
            }
            Ok(RepoContents {
                submodule_url: state.submodule_urls.get(path).cloned(),
            })
        })
        .await
    }

    async fn blob(&self, content_hash: &str) -> Result<Bytes, Error> {
        self.aux_call(|state| {
            state
                .blobs
                .get(content_hash)
                .cloned()
                .ok_or_else(|| anyhow!("no such blob: {content_hash}"))
        })
        .await
    }
}
