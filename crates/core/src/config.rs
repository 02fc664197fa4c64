//! Pipeline configuration — generalizes `codescope_core::types::ScanConfig`.
//!
//! Re-architects the original's module-level cache-directory constants
//! (spec.md §9 "Globals") as explicit configuration on construction.

use std::collections::HashSet;
use std::path::PathBuf;

/// Current on-disk tag cache format. Bumping this invalidates the
/// entire cache directory (a new `.repomap.tags.cache.v<N>/` is used).
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub root: PathBuf,
    /// Directory names to skip during the file walk.
    pub skip_dirs: HashSet<String>,
    /// Cache format version — part of the cache directory name.
    pub cache_version: u32,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_dirs: default_skip_dirs(),
            cache_version: CACHE_FORMAT_VERSION,
        }
    }

    /// Load `.repomap.toml` from the root if present, falling back to
    /// defaults for any field it doesn't set.
    pub fn load(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut cfg = Self::new(&root);
        let path = root.join(".repomap.toml");
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return cfg;
        };
        match toml::from_str::<RepoMapToml>(&raw) {
            Ok(parsed) => {
                if let Some(skip) = parsed.skip_dirs {
                    cfg.skip_dirs = skip.into_iter().collect();
                }
                cfg
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "invalid .repomap.toml, using defaults");
                cfg
            }
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(format!(".repomap.tags.cache.v{}", self.cache_version))
    }

    pub fn should_skip_dir(&self, name: &str) -> bool {
        self.skip_dirs.contains(name)
    }
}

#[derive(serde::Deserialize, Default)]
struct RepoMapToml {
    skip_dirs: Option<Vec<String>>,
}

fn default_skip_dirs() -> HashSet<String> {
    [".git", "node_modules", "__pycache__", "target", "dist", "build", ".next", "vendor"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_config_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::load(dir.path());
        assert!(cfg.should_skip_dir("node_modules"));
        assert!(!cfg.should_skip_dir("src"));
    }

    #[test]
    fn repomap_toml_overrides_skip_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".repomap.toml"), "skip_dirs = [\"vendored\"]\n").unwrap();
        let cfg = PipelineConfig::load(dir.path());
        assert!(cfg.should_skip_dir("vendored"));
        assert!(!cfg.should_skip_dir("node_modules"));
    }

    #[test]
    fn malformed_repomap_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".repomap.toml"), "not valid toml = [").unwrap();
        let cfg = PipelineConfig::load(dir.path());
        assert!(cfg.should_skip_dir("target"));
    }

    #[test]
    fn cache_dir_embeds_the_format_version() {
        let cfg = PipelineConfig::new("/repo");
        assert_eq!(cfg.cache_dir(), PathBuf::from("/repo/.repomap.tags.cache.v1"));
    }
}
