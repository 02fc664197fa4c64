//! `TagCache` — on-disk, content-addressed store of per-file tag lists.
//!
//! Key is `(abs_path, mtime_ns)`; format follows the teacher's durable
//! stub-cache convention in `codescope_server::types::CachedStub` (hashed
//! file name, atomic write-then-rename), generalized to store a `Vec<Tag>`
//! instead of a semantic-search stub.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::{Tag, TagKind};

#[derive(Serialize, Deserialize)]
struct CachedTag {
    rel_path: String,
    abs_path: PathBuf,
    line: usize,
    name: String,
    kind: u8, // 0 = def, 1 = ref
}

impl From<&Tag> for CachedTag {
    fn from(t: &Tag) -> Self {
        CachedTag {
            rel_path: t.rel_path.clone(),
            abs_path: t.abs_path.clone(),
            line: t.line,
            name: t.name.clone(),
            kind: match t.kind {
                TagKind::Def => 0,
                TagKind::Ref => 1,
            },
        }
    }
}

impl From<CachedTag> for Tag {
    fn from(c: CachedTag) -> Self {
        Tag {
            rel_path: c.rel_path,
            abs_path: c.abs_path,
            line: c.line,
            name: c.name,
            kind: if c.kind == 0 { TagKind::Def } else { TagKind::Ref },
        }
    }
}

pub struct TagCache {
    dir: PathBuf,
    /// After one logged write failure, further failures in this run are
    /// suppressed from the log per the "logged once" contract.
    write_failure_logged: AtomicBool,
}

impl TagCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(error = %e, dir = %dir.display(), "could not create tag cache directory");
        }
        Self { dir, write_failure_logged: AtomicBool::new(false) }
    }

    /// Composite key, hashed to a filesystem-safe name.
    fn key_path(&self, abs_path: &Path, mtime_ns: i128) -> PathBuf {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        abs_path.hash(&mut hasher);
        mtime_ns.hash(&mut hasher);
        self.dir.join(format!("{:016x}.json", hasher.finish()))
    }

    /// `get_or_compute`: on hit, return the stored tags; on miss (or when
    /// `force_refresh` is set), run `compute_fn`, persist the result, and
    /// return it. Any cache I/O or deserialization error is treated as a
    /// miss — the cache never raises to the caller.
    pub fn get_or_compute(
        &self,
        abs_path: &Path,
        mtime: SystemTime,
        force_refresh: bool,
        compute_fn: impl FnOnce() -> Vec<Tag>,
    ) -> Vec<Tag> {
        let mtime_ns = mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0);
        let path = self.key_path(abs_path, mtime_ns);

        if !force_refresh {
            if let Some(tags) = self.read(&path) {
                return tags;
            }
        }

        let tags = compute_fn();
        self.write(&path, &tags);
        tags
    }

    fn read(&self, path: &Path) -> Option<Vec<Tag>> {
        let raw = std::fs::read(path).ok()?;
        let cached: Vec<CachedTag> = serde_json::from_slice(&raw).ok()?;
        Some(cached.into_iter().map(Tag::from).collect())
    }

    fn write(&self, path: &Path, tags: &[Tag]) {
        let cached: Vec<CachedTag> = tags.iter().map(CachedTag::from).collect();
        let Ok(bytes) = serde_json::to_vec(&cached) else {
            self.log_write_failure("serialization failed");
            return;
        };
        let tmp_path = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp_path, &bytes) {
            self.log_write_failure(&e.to_string());
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            self.log_write_failure(&e.to_string());
        }
    }

    fn log_write_failure(&self, detail: &str) {
        if !self.write_failure_logged.swap(true, Ordering::Relaxed) {
            tracing::warn!(detail, "tag cache write failed; further failures this run are suppressed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagKind;

    fn tag(name: &str, line: usize) -> Tag {
        Tag {
            rel_path: "a.py".into(),
            abs_path: PathBuf::from("/tmp/a.py"),
            line,
            name: name.into(),
            kind: TagKind::Def,
        }
    }

    #[test]
    fn miss_then_hit_returns_same_tags() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TagCache::new(dir.path());
        let abs = PathBuf::from("/tmp/a.py");
        let mtime = SystemTime::now();

        let mut calls = 0;
        let first = cache.get_or_compute(&abs, mtime, false, || {
            calls += 1;
            vec![tag("foo", 0)]
        });
        assert_eq!(first.len(), 1);
        assert_eq!(calls, 1);

        let second = cache.get_or_compute(&abs, mtime, false, || {
            calls += 1;
            vec![tag("foo", 0)]
        });
        assert_eq!(second.len(), 1);
        assert_eq!(calls, 1, "second call should be a cache hit");
    }

    #[test]
    fn mtime_change_forces_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TagCache::new(dir.path());
        let abs = PathBuf::from("/tmp/a.py");
        let t1 = SystemTime::now();
        let t2 = t1 + std::time::Duration::from_secs(1);

        cache.get_or_compute(&abs, t1, false, || vec![tag("foo", 0)]);
        let mut calls = 0;
        cache.get_or_compute(&abs, t2, false, || {
            calls += 1;
            vec![tag("foo", 0)]
        });
        assert_eq!(calls, 1, "different mtime must miss");
    }

    #[test]
    fn force_refresh_bypasses_read_but_still_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TagCache::new(dir.path());
        let abs = PathBuf::from("/tmp/a.py");
        let mtime = SystemTime::now();

        cache.get_or_compute(&abs, mtime, false, || vec![tag("foo", 0)]);
        let mut calls = 0;
        cache.get_or_compute(&abs, mtime, true, || {
            calls += 1;
            vec![tag("bar", 1)]
        });
        assert_eq!(calls, 1, "force_refresh must bypass the cached read");
    }
}
