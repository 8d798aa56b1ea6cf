//! Source cache for incremental builds.
//!
//! The cache is the single oracle for "does this need rebuilding". It keeps
//! per-file records (modification time, content hash and, for compiler
//! executables, the detected version and architecture), a key/value data
//! cache used for command-line hashes, and the time of the last successful
//! build. Everything lives in one JSON file per configuration and triple.
//!
//! Mutation goes through a single `Mutex`. Pool workers only report results
//! back to the generator, which then updates the cache from one thread.

pub mod depfile;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::util::fs::{modified_nanos, modified_secs, now_nanos, now_secs, write_atomic};
use crate::util::hash::sha256_file;

/// What the cache knows about one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Modification time in nanoseconds
    pub mtime: u64,
    /// SHA256 of the contents
    pub hash: String,
    /// When the record was taken, in nanoseconds
    #[serde(default)]
    pub recorded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    last_built: u64,
    #[serde(default)]
    files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct CacheState {
    file: CacheFile,
    dirty: bool,
    /// Dependency paths already checked this build, with their result
    checked: BTreeMap<String, bool>,
}

/// A file modified this close to being recorded may carry the same mtime
/// as the recorded one on coarse filesystems, so its hash decides.
const RACY_WINDOW_NANOS: u64 = 2_000_000_000;

/// Persistent record of file states.
#[derive(Debug)]
pub struct SourceCache {
    path: PathBuf,
    root: PathBuf,
    loaded_at: u64,
    state: Mutex<CacheState>,
    disallow_save: AtomicBool,
}

impl SourceCache {
    /// Load the cache at `path`. Relative file keys resolve against `root`.
    ///
    /// A missing file gives an empty cache. A corrupt one is logged and
    /// also replaced by an empty cache, which means a full rebuild.
    pub fn load(path: &Path, root: &Path) -> Self {
        let file = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("ignoring corrupt cache {}: {}", path.display(), e);
                    CacheFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => {
                tracing::warn!("ignoring unreadable cache {}: {}", path.display(), e);
                CacheFile::default()
            }
        };

        tracing::debug!(
            "loaded source cache {} ({} files)",
            path.display(),
            file.files.len()
        );

        SourceCache {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
            loaded_at: now_secs(),
            state: Mutex::new(CacheState {
                file,
                dirty: false,
                checked: BTreeMap::new(),
            }),
            disallow_save: AtomicBool::new(false),
        }
    }

    /// An empty cache that is never written.
    pub fn in_memory(root: &Path) -> Self {
        SourceCache {
            path: PathBuf::new(),
            root: root.to_path_buf(),
            loaded_at: now_secs(),
            state: Mutex::new(CacheState::default()),
            disallow_save: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    /// Time of the last successful build, in seconds.
    pub fn last_built(&self) -> u64 {
        self.lock().file.last_built
    }

    fn changed_locked(&self, state: &CacheState, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let full = self.resolve(path);
        let Some(mtime) = modified_nanos(&full) else {
            return true;
        };
        if let Some(record) = state.file.files.get(path) {
            if record.mtime == mtime && mtime.saturating_add(RACY_WINDOW_NANOS) < record.recorded {
                return false;
            }
            return match sha256_file(&full) {
                Ok(hash) => hash != record.hash,
                Err(_) => true,
            };
        }
        modified_secs(&full).is_some_and(|secs| secs > state.file.last_built)
    }

    /// Whether a file changed since it was recorded, or does not exist.
    ///
    /// An empty path is never "changed".
    pub fn file_changed(&self, path: &str) -> bool {
        let state = self.lock();
        self.changed_locked(&state, path)
    }

    /// Like [`file_changed`](Self::file_changed), but also true when a
    /// non-empty `dependee` (an output or dependency file) is missing.
    pub fn file_changed_with(&self, path: &str, dependee: &str) -> bool {
        let missing = !dependee.is_empty() && !self.resolve(dependee).exists();
        missing || self.file_changed(path)
    }

    /// Whether a source, or anything its dependency file lists, changed.
    ///
    /// A missing or unreadable dependency file counts as changed. Each
    /// listed path is checked at most once per build.
    pub fn source_changed(&self, source: &str, dependency_file: &str) -> bool {
        if self.file_changed_with(source, dependency_file) {
            return true;
        }
        if dependency_file.is_empty() {
            return false;
        }

        let deps = match depfile::read_dependencies(&self.resolve(dependency_file)) {
            Ok(deps) => deps,
            Err(e) => {
                tracing::debug!("{:#}", e);
                return true;
            }
        };

        let mut state = self.lock();
        for dep in deps.iter().filter(|d| d.as_str() != source) {
            let changed = match state.checked.get(dep) {
                Some(result) => *result,
                None => {
                    let result = self.changed_locked(&state, dep);
                    state.checked.insert(dep.clone(), result);
                    result
                }
            };
            if changed {
                tracing::debug!("{} changed (via {})", source, dep);
                return true;
            }
        }
        false
    }

    /// Record a file's current state so it reads as unchanged.
    pub fn record(&self, path: &str) {
        let full = self.resolve(path);
        let Some(mtime) = modified_nanos(&full) else {
            return;
        };
        let Ok(hash) = sha256_file(&full) else {
            return;
        };

        let mut state = self.lock();
        let record = state.file.files.entry(path.to_string()).or_default();
        record.mtime = mtime;
        record.hash = hash;
        record.recorded = now_nanos();
        // a later edit in this same build must still be seen
        state.checked.remove(path);
        state.dirty = true;
    }

    /// Compare a data value against the stored one, storing it if it
    /// differs. Returns true when it changed.
    pub fn data_value_changed(&self, key: &str, value: &str) -> bool {
        let mut state = self.lock();
        if state.file.data.get(key).map(String::as_str) == Some(value) {
            return false;
        }
        state.file.data.insert(key.to_string(), value.to_string());
        state.dirty = true;
        true
    }

    pub fn data_value(&self, key: &str) -> Option<String> {
        self.lock().file.data.get(key).cloned()
    }

    /// Cached version of an executable, valid while the executable is
    /// unchanged. Returns true (and leaves `cached` empty) when it must be
    /// probed again.
    pub fn version_requires_update(&self, executable: &str, cached: &mut String) -> bool {
        self.memo_requires_update(executable, cached, |r| r.version.as_deref())
    }

    /// Cached target triple of an executable. See
    /// [`version_requires_update`](Self::version_requires_update).
    pub fn arch_requires_update(&self, executable: &str, cached: &mut String) -> bool {
        self.memo_requires_update(executable, cached, |r| r.arch.as_deref())
    }

    fn memo_requires_update(
        &self,
        executable: &str,
        cached: &mut String,
        field: impl Fn(&FileRecord) -> Option<&str>,
    ) -> bool {
        let state = self.lock();
        let mtime = modified_nanos(&self.resolve(executable));
        match state.file.files.get(executable) {
            Some(record) if Some(record.mtime) == mtime => match field(record) {
                Some(value) if !value.is_empty() => {
                    *cached = value.to_string();
                    false
                }
                _ => true,
            },
            _ => true,
        }
    }

    pub fn add_version(&self, executable: &str, version: &str) {
        self.update_memo(executable, |r| r.version = Some(version.to_string()));
    }

    pub fn add_arch(&self, executable: &str, arch: &str) {
        self.update_memo(executable, |r| r.arch = Some(arch.to_string()));
    }

    fn update_memo(&self, executable: &str, update: impl FnOnce(&mut FileRecord)) {
        let mtime = modified_nanos(&self.resolve(executable)).unwrap_or(0);
        let mut state = self.lock();
        let record = state.file.files.entry(executable.to_string()).or_default();
        if record.mtime != mtime {
            // The executable changed: everything known about it is stale.
            *record = FileRecord {
                mtime,
                ..FileRecord::default()
            };
        }
        update(record);
        state.dirty = true;
    }

    /// Prevent this cache from being saved for the rest of the build.
    pub fn disallow_save(&self) {
        if !self.disallow_save.swap(true, Ordering::SeqCst) {
            tracing::debug!("source cache will not be saved");
        }
    }

    pub fn save_disallowed(&self) -> bool {
        self.disallow_save.load(Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Write the cache, stamping `last_built` with the time it was loaded.
    ///
    /// Files modified while the build ran therefore still read as changed
    /// next time. A no-op when saving is disallowed or nothing changed.
    pub fn save(&self) -> Result<()> {
        if self.save_disallowed() {
            return Ok(());
        }
        let mut state = self.lock();
        if !state.dirty {
            return Ok(());
        }
        state.file.last_built = self.loaded_at;
        let content = serde_json::to_string_pretty(&state.file)?;
        write_atomic(&self.path, &content)?;
        state.dirty = false;
        tracing::debug!("saved source cache {}", self.path.display());
        Ok(())
    }
}
