use std::fmt::Debug;

use anyhow::Error;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Whether a ref names a branch or a tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    #[default]
    Branch,
    Tag,
}

impl RefKind {
    /// Namespace prefix used by the hosting API's ref endpoint.
    pub fn namespace(self) -> &'static str {
        match self {
            RefKind::Branch => "heads/",
            RefKind::Tag => "tags/",
        }
    }
}

/// A branch or tag to browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSpec {
    #[serde(default)]
    pub kind: RefKind,
    pub name: String,
}

impl RefSpec {
    pub fn branch(name: impl Into<String>) -> Self {
        RefSpec {
            kind: RefKind::Branch,
            name: name.into(),
        }
    }

    pub fn tag(name: impl Into<String>) -> Self {
        RefSpec {
            kind: RefKind::Tag,
            name: name.into(),
        }
    }

    /// `heads/<name>` or `tags/<name>`.
    pub fn qualified(&self) -> String {
        format!("{}{}", self.kind.namespace(), self.name)
    }
}

impl Default for RefSpec {
    fn default() -> Self {
        RefSpec::branch("main")
    }
}

impl std::fmt::Display for RefSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// What an entry in the recursive listing refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    Blob,
    Tree,
    /// A foreign commit, i.e. a submodule mount.
    Commit,
}

/// One item of the flat recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTreeEntry {
    /// Relative, slash-separated, no leading slash.
    pub path: String,
    /// Octal mode string, e.g. `"100644"`.
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: RemoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "sha")]
    pub content_hash: String,
}

impl RemoteTreeEntry {
    pub fn blob(path: impl Into<String>, mode: &str, size: u64, hash: impl Into<String>) -> Self {
        RemoteTreeEntry {
            path: path.into(),
            mode: mode.to_string(),
            kind: RemoteKind::Blob,
            size: Some(size),
            content_hash: hash.into(),
        }
    }

    pub fn tree(path: impl Into<String>, hash: impl Into<String>) -> Self {
        RemoteTreeEntry {
            path: path.into(),
            mode: "040000".to_string(),
            kind: RemoteKind::Tree,
            size: None,
            content_hash: hash.into(),
        }
    }

    pub fn symlink(path: impl Into<String>, hash: impl Into<String>) -> Self {
        RemoteTreeEntry {
            path: path.into(),
            mode: "120000".to_string(),
            kind: RemoteKind::Blob,
            size: None,
            content_hash: hash.into(),
        }
    }

    pub fn submodule(path: impl Into<String>, commit: impl Into<String>) -> Self {
        RemoteTreeEntry {
            path: path.into(),
            mode: "160000".to_string(),
            kind: RemoteKind::Commit,
            size: None,
            content_hash: commit.into(),
        }
    }
}

/// The subset of a per-path contents response the tree cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoContents {
    #[serde(
        default,
        rename = "submodule_git_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub submodule_url: Option<String>,
}

/// The repository-hosting client the tree is built from.
///
/// Implementations wrap whatever wire protocol the host speaks; the tree
/// only needs these four calls.
#[async_trait::async_trait]
pub trait RepositoryHandle: Send + Sync + Debug {
    /// Resolve a branch or tag to a commit hash.
    async fn resolve_ref(&self, reference: &RefSpec) -> Result<String, Error>;

    /// Fetch the full recursive tree listing for a commit.
    async fn recursive_tree(&self, commit: &str) -> Result<Vec<RemoteTreeEntry>, Error>;

    /// Fetch the per-path metadata for `path` at `reference`.
    async fn contents(&self, reference: &str, path: &str) -> Result<RepoContents, Error>;

    /// Fetch raw blob content by hash.
    async fn blob(&self, content_hash: &str) -> Result<Bytes, Error>;
}

#[async_trait::async_trait]
impl<D, R> RepositoryHandle for D
where
    D: std::ops::Deref<Target = R> + Debug + Send + Sync,
    R: RepositoryHandle + ?Sized + 'static,
{
    async fn resolve_ref(&self, reference: &RefSpec) -> Result<String, Error> {
        (**self).resolve_ref(reference).await
    }

    async fn recursive_tree(&self, commit: &str) -> Result<Vec<RemoteTreeEntry>, Error> {
        (**self).recursive_tree(commit).await
    }

    async fn contents(&self, reference: &str, path: &str) -> Result<RepoContents, Error> {
        (**self).contents(reference, path).await
    }

    async fn blob(&self, content_hash: &str) -> Result<Bytes, Error> {
        (**self).blob(content_hash).await
    }
}
