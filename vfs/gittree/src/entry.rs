//! Nodes of the synthetic tree and the values handed back to callers.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::Serialize;

use crate::mode::{FileType, S_IFDIR};

/// Type-specific payload of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Directory {
        /// `None` until populated; distinguishes "empty" from "never materialized".
        children: Option<BTreeMap<String, Entry>>,
        /// Origin of a submodule mount, when the host reported one.
        submodule_url: Option<String>,
    },
    File,
    Symlink {
        /// Absolute path inside the tree, once resolved.
        target: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub mode: u32,
    pub size: u64,
    pub content_hash: String,
    pub node: Node,
}

impl Entry {
    pub fn new(
        name: impl Into<String>,
        mode: u32,
        size: u64,
        content_hash: impl Into<String>,
    ) -> Self {
        let node = match FileType::from_mode(mode) {
            FileType::Directory => Node::Directory {
                children: None,
                submodule_url: None,
            },
            FileType::Symlink => Node::Symlink { target: None },
            FileType::RegularFile => Node::File,
        };
        Entry {
            name: name.into(),
            mode,
            size,
            content_hash: content_hash.into(),
            node,
        }
    }

    /// A directory that only exists because something was listed beneath it.
    pub fn synthesized_dir(name: impl Into<String>) -> Self {
        Entry::new(name, S_IFDIR, 0, "")
    }

    pub fn root() -> Self {
        Entry::synthesized_dir("")
    }

    pub fn file_type(&self) -> FileType {
        match self.node {
            Node::Directory { .. } => FileType::Directory,
            Node::Symlink { .. } => FileType::Symlink,
            Node::File => FileType::RegularFile,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.node, Node::Directory { .. })
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.node, Node::Symlink { .. })
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Entry>> {
        match &self.node {
            Node::Directory { children, .. } => children.as_ref(),
            _ => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&Entry> {
        self.children()?.get(name)
    }

    pub fn symlink_target(&self) -> Option<&str> {
        match &self.node {
            Node::Symlink { target } => target.as_deref(),
            _ => None,
        }
    }

    pub fn submodule_url(&self) -> Option<&str> {
        match &self.node {
            Node::Directory { submodule_url, .. } => submodule_url.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Entry>> {
        match &mut self.node {
            Node::Directory { children, .. } => Some(children.get_or_insert_with(BTreeMap::new)),
            _ => None,
        }
    }

    /// Copy the metadata callers are allowed to see.
    pub fn to_stat(&self, modified: SystemTime) -> TreeStat {
        TreeStat {
            name: self.name.clone(),
            file_type: self.file_type(),
            mode: self.mode,
            size: self.size,
            content_hash: self.content_hash.clone(),
            submodule_url: self.submodule_url().map(str::to_string),
            symlink_target: self.symlink_target().map(str::to_string),
            modified,
        }
    }
}

/// Metadata for one resolved entry, returned by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeStat {
    pub name: String,
    pub file_type: FileType,
    pub mode: u32,
    pub size: u64,
    pub content_hash: String,
    pub submodule_url: Option<String>,
    pub symlink_target: Option<String>,
    /// The cache's fake modification time; identical for every entry.
    pub modified: SystemTime,
}

impl TreeStat {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::RegularFile
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }
}

/// One complete tree, built for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub commit: String,
    pub root: Entry,
}

impl Snapshot {
    pub fn new(commit: impl Into<String>, root: Entry) -> Self {
        Snapshot {
            commit: commit.into(),
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{S_IFGITLINK, S_IFLNK};

    #[test]
    fn node_variant_follows_the_mode() {
        assert!(Entry::new("d", S_IFDIR, 0, "h").is_dir());
        assert!(Entry::new("l", S_IFLNK, 0, "h").is_symlink());
        assert_eq!(
            Entry::new("f", 0o100644, 3, "h").file_type(),
            FileType::RegularFile
        );
        assert!(Entry::new("sub", S_IFGITLINK, 0, "c").is_dir());
    }

    #[test]
    fn directories_start_unmaterialized() {
        let mut dir = Entry::synthesized_dir("d");
        assert!(dir.children().is_none());

        dir.children_mut().unwrap();
        assert_eq!(dir.children().map(|c| c.len()), Some(0));
    }

    #[test]
    fn stat_carries_the_given_mtime() {
        let now = SystemTime::now();
        let stat = Entry::new("f", 0o100644, 10, "h1").to_stat(now);
        assert!(stat.is_file());
        assert_eq!(stat.size, 10);
        assert_eq!(stat.modified, now);
    }
}
