//! A read-only filesystem view over one branch or tag of a remote
//! repository, built from the host's recursive tree listing.
//!
//! Only metadata is served: `stat`, `lstat`, `realpath` and `readdir`.
//! The tree is fetched lazily and rebuilt on the first query after
//! [`TreeCache::mark_dirty`].

mod builder;
mod cache;
mod config;
mod entry;
mod error;
pub mod mode;
pub mod path;
mod repository;
pub mod testing;
mod walker;

pub use builder::{AuxFetch, TreeBuilder};
pub use cache::TreeCache;
pub use config::TreeCacheConfig;
pub use entry::{Entry, Node, Snapshot, TreeStat};
pub use error::{BuildError, RefreshError, TreeError, TreeResult};
pub use mode::FileType;
pub use repository::{
    RefKind, RefSpec, RemoteKind, RemoteTreeEntry, RepoContents, RepositoryHandle,
};
pub use walker::{PathWalker, WalkFlags};
