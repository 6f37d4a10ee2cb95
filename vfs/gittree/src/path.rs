//! Slash-separated path helpers for the synthetic tree.
//!
//! Paths handed to the cache are absolute (`/a/b`). Listing paths are
//! relative (`a/b`). Only the handful of operations the tree needs are here.

/// Collapse repeated separators, `.` and `..`.
///
/// `..` never climbs above the root. A trailing separator is preserved.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let trailing = path.len() > 1 && path.ends_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if trailing && !parts.is_empty() {
        out.push('/');
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Join `relative` onto `dir` and normalize the result as an absolute path.
///
/// A leading separator on `relative` does not reset to the root; the
/// target is always taken relative to `dir`.
pub fn join(dir: &str, relative: &str) -> String {
    let mut joined = String::with_capacity(dir.len() + relative.len() + 2);
    joined.push('/');
    joined.push_str(dir);
    joined.push('/');
    joined.push_str(relative);
    let mut normalized = normalize(&joined);
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Split a relative listing path into its parent directory and final segment.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots_and_separators() {
        assert_eq!(normalize("/a//b/./c"), "/a/b/c");
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("/../a"), "/a");
        assert_eq!(normalize("/a/b/"), "/a/b/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("a/../.."), "..");
    }

    #[test]
    fn join_is_relative_to_the_containing_directory() {
        assert_eq!(join("", "target.txt"), "/target.txt");
        assert_eq!(join("/docs", "../README.md"), "/README.md");
        assert_eq!(join("/a/b", "c/d"), "/a/b/c/d");
        assert_eq!(join("/a", "/etc/passwd"), "/a/etc/passwd");
        assert_eq!(join("/a", ".."), "/");
    }

    #[test]
    fn split_parent_of_listing_paths() {
        assert_eq!(split_parent("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_parent("top"), ("", "top"));
    }
}
