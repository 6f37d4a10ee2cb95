//! POSIX mode bits as reported by the remote tree listing.

use crate::error::BuildError;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFGITLINK: u32 = 0o160000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

/// The three kinds of entry the synthetic tree distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Directory,
    RegularFile,
    Symlink,
}

impl FileType {
    /// Permission bits are ignored. A gitlink (submodule mount) is a directory.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR | S_IFGITLINK => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            _ => FileType::RegularFile,
        }
    }
}

/// Parse the octal mode string used by the tree listing (e.g. `"100644"`).
pub fn parse_mode(raw: &str) -> Result<u32, BuildError> {
    u32::from_str_radix(raw.trim(), 8).map_err(|_| BuildError::InvalidMode {
        mode: raw.to_string(),
    })
}
