use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::repository::RefSpec;

/// Configuration for a [`TreeCache`](crate::TreeCache).
///
/// ```toml
/// follow_symlinks = true
///
/// [reference]
/// kind = "tag"
/// name = "v1.2.0"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeCacheConfig {
    /// The branch or tag whose tree is exposed.
    pub reference: RefSpec,
    /// Resolve symlink targets and follow them during lookups.
    pub follow_symlinks: bool,
    /// Symlinks followed in one lookup before it is treated as a cycle.
    pub max_symlinks: u16,
    /// Auxiliary (submodule/symlink) fetches allowed in flight at once.
    pub aux_fetch_concurrency: usize,
}

impl Default for TreeCacheConfig {
    fn default() -> Self {
        Self {
            reference: RefSpec::default(),
            follow_symlinks: true,
            max_symlinks: 40,
            aux_fetch_concurrency: 1,
        }
    }
}

impl TreeCacheConfig {
    pub fn new(reference: RefSpec) -> Self {
        Self {
            reference,
            ..Self::default()
        }
    }

    pub fn from_toml_str(data: &str) -> Result<Self, anyhow::Error> {
        let config: Self = toml::from_str(data).context("failed to parse tree cache config")?;
        if config.aux_fetch_concurrency == 0 {
            anyhow::bail!("aux_fetch_concurrency must be at least 1");
        }
        Ok(config)
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_max_symlinks(mut self, max: u16) -> Self {
        self.max_symlinks = max;
        self
    }

    pub fn with_aux_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.aux_fetch_concurrency = concurrency.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RefKind;

    #[test]
    fn parse_partial_toml() {
        let config = TreeCacheConfig::from_toml_str(
            r#"
            follow_symlinks = false

            [reference]
            kind = "tag"
            name = "v1.2.0"
            "#,
        )
        .unwrap();

        assert_eq!(config.reference.kind, RefKind::Tag);
        assert_eq!(config.reference.name, "v1.2.0");
        assert!(!config.follow_symlinks);
        assert_eq!(config.max_symlinks, 40);
        assert_eq!(config.aux_fetch_concurrency, 1);
    }

    #[test]
    fn reject_zero_concurrency() {
        let err = TreeCacheConfig::from_toml_str("aux_fetch_concurrency = 0").unwrap_err();
        assert!(err.to_string().contains("aux_fetch_concurrency"));
    }
}
