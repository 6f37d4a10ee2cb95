use thiserror::Error;

pub type TreeResult<T> = Result<T, TreeError>;

/// Failure returned by the query surface of [`TreeCache`](crate::TreeCache).
#[derive(Debug, Clone, Error)]
pub enum TreeError {
    #[error("no such file or directory: {path}")]
    NotFound { path: String },
    #[error("not a directory: {path}")]
    NotADirectory { path: String },
    #[error("tree refresh interrupted")]
    Interrupted(#[source] RefreshError),
}

impl TreeError {
    pub(crate) fn not_found(path: &str) -> Self {
        TreeError::NotFound {
            path: path.to_string(),
        }
    }

    /// POSIX-style error code, for callers that speak errno.
    pub fn code(&self) -> &'static str {
        match self {
            TreeError::NotFound { .. } => "ENOENT",
            TreeError::NotADirectory { .. } => "ENOTDIR",
            TreeError::Interrupted(_) => "EINTR",
        }
    }
}

/// Why a refresh was abandoned.
///
/// Cloned to every query that was waiting on the same refresh.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("unable to resolve \"{reference}\": {message}")]
    ResolveRef { reference: String, message: String },
    #[error("unable to fetch the tree for commit {commit}: {message}")]
    FetchTree { commit: String, message: String },
    #[error("unable to build the tree for commit {commit}")]
    Build {
        commit: String,
        #[source]
        source: BuildError,
    },
}

/// A listing that cannot be turned into a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("invalid mode \"{mode}\"")]
    InvalidMode { mode: String },
    #[error("tree entry with an empty path")]
    EmptyPath,
    #[error("\"{parent}\" is not a directory, so \"{path}\" cannot be placed under it")]
    ParentNotDirectory { path: String, parent: String },
}
