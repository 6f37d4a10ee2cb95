//! Symlink-aware path traversal over one snapshot.

use crate::entry::Entry;
use crate::path;

#[derive(Clone, Copy, Debug)]
pub struct WalkFlags {
    pub follow_symlinks: bool,
    pub follow_final_symlink: bool,
    pub max_symlinks: u16,
}

pub struct PathWalker<'a> {
    root: &'a Entry,
}

impl<'a> PathWalker<'a> {
    pub fn new(root: &'a Entry) -> Self {
        Self { root }
    }

    /// Resolve an absolute path to an entry of this tree.
    ///
    /// Returns `None` when a segment is missing, when a segment other than
    /// the last is not a materialized directory, when a followed symlink has
    /// no known target, or when more than `max_symlinks` links are followed.
    pub fn resolve(&self, path: &str, flags: WalkFlags) -> Option<&'a Entry> {
        let mut budget = flags.max_symlinks;
        self.walk(path, flags, &mut budget)
    }

    fn walk(&self, path: &str, flags: WalkFlags, budget: &mut u16) -> Option<&'a Entry> {
        if !path.starts_with('/') {
            return None;
        }
        let normalized = path::normalize(path);
        let parts: Vec<&str> = normalized.split('/').collect();

        let mut entry = self.root;
        for (i, part) in parts.iter().enumerate().skip(1) {
            let is_final = i == parts.len() - 1;
            // Trailing slash.
            if is_final && part.is_empty() {
                break;
            }

            entry = entry.child(part)?;

            let follow = flags.follow_symlinks && (!is_final || flags.follow_final_symlink);
            while follow && entry.is_symlink() {
                let target = entry.symlink_target()?;
                *budget = budget.checked_sub(1)?;
                let through = WalkFlags {
                    follow_final_symlink: true,
                    ..flags
                };
                entry = self.walk(target, through, budget)?;
            }
        }
        Some(entry)
    }
}
