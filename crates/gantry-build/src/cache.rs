//! Rotating buildx layer cache.
//!
//! The store is a directory with one subdirectory per entry, named by its
//! key (`<os>-<prefix>-<run_id>`). A run restores the best matching entry,
//! lets buildx write a fresh cache into `<key>.new`, then promotes it: every
//! older entry for the same `<os>-<prefix>-` is deleted and the staging
//! directory is renamed into place. The store never holds more than one
//! entry per prefix after a successful promotion.
//!
//! Cache problems never fail a build. Callers log a [`CacheError`] and carry
//! on with a cold cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const STAGING_SUFFIX: &str = ".new";

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub os: String,
    pub prefix: String,
    pub run_id: String,
}

impl CacheKey {
    pub fn new(os: &str, prefix: &str, run_id: &str) -> Self {
        Self {
            os: sanitize(os),
            prefix: sanitize(prefix),
            run_id: unstaged(sanitize(run_id)),
        }
    }

    /// Prefix shared by every run's key; used for fallback restores.
    pub fn restore_prefix(&self) -> String {
        format!("{}-{}-", self.os, self.prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.restore_prefix(), self.run_id)
    }
}

/// Keys become directory names; keep them to a safe alphabet.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A key must never end like a staging directory, or it would be skipped
/// as one.
fn unstaged(run_id: String) -> String {
    match run_id.strip_suffix(STAGING_SUFFIX) {
        Some(stem) => format!("{stem}_{}", &STAGING_SUFFIX[1..]),
        None => run_id,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
}

/// Outcome of [`CacheStore::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRestore {
    /// An entry with this run's key exists.
    Exact(CacheEntry),
    /// The most recent entry sharing the restore prefix.
    Fallback(CacheEntry),
    /// Nothing to restore; build cold.
    Miss,
}

impl CacheRestore {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Exact(e) | Self::Fallback(e) => Some(e),
            Self::Miss => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the entry to seed this run's build with.
    pub fn restore(&self, key: &CacheKey) -> Result<CacheRestore, CacheError> {
        let exact = self.root.join(key.to_string());
        if exact.is_dir() {
            tracing::debug!(key = %key, "cache hit");
            return Ok(CacheRestore::Exact(CacheEntry {
                key: key.to_string(),
                path: exact,
            }));
        }

        let prefix = key.restore_prefix();
        let mut best: Option<(SystemTime, CacheEntry)> = None;
        for entry in self.entries()? {
            if !entry.key.starts_with(&prefix) {
                continue;
            }
            let modified = std::fs::metadata(&entry.path)
                .and_then(|m| m.modified())
                .map_err(|e| CacheError::Read {
                    path: entry.path.clone(),
                    source: e,
                })?;
            let newer = best.as_ref().is_none_or(|(t, b)| {
                (modified, entry.key.as_str()) > (*t, b.key.as_str())
            });
            if newer {
                best = Some((modified, entry));
            }
        }

        Ok(match best {
            Some((_, entry)) => {
                tracing::debug!(key = %entry.key, "cache restored from prefix match");
                CacheRestore::Fallback(entry)
            }
            None => {
                tracing::debug!(prefix = %prefix, "cache miss");
                CacheRestore::Miss
            }
        })
    }

    /// Directory buildx exports this run's cache into. Created if missing,
    /// emptied if a previous run left it behind.
    pub fn staging_dir(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        let staging = self.root.join(format!("{key}{STAGING_SUFFIX}"));
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| CacheError::Remove {
                path: staging.clone(),
                source: e,
            })?;
        }
        std::fs::create_dir_all(&staging).map_err(|e| CacheError::Create {
            path: staging.clone(),
            source: e,
        })?;
        Ok(staging)
    }

    /// Replace every previous entry for this key's prefix with the staged one.
    pub fn promote(&self, key: &CacheKey) -> Result<CacheEntry, CacheError> {
        let staging = self.root.join(format!("{key}{STAGING_SUFFIX}"));
        if !staging.is_dir() {
            return Err(CacheError::NothingStaged { path: staging });
        }

        let prefix = key.restore_prefix();
        let mut removed = 0usize;
        for entry in self.entries()? {
            if entry.key.starts_with(&prefix) {
                std::fs::remove_dir_all(&entry.path).map_err(|e| CacheError::Remove {
                    path: entry.path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }

        let target = self.root.join(key.to_string());
        std::fs::rename(&staging, &target).map_err(|e| CacheError::Rename {
            from: staging.clone(),
            to: target.clone(),
            source: e,
        })?;

        tracing::info!(key = %key, removed, "build cache rotated");
        Ok(CacheEntry {
            key: key.to_string(),
            path: target,
        })
    }

    /// Promoted entries, sorted by key. Staging directories are skipped.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let read = std::fs::read_dir(&self.root).map_err(|e| CacheError::Read {
            path: self.root.clone(),
            source: e,
        })?;

        let mut entries = Vec::new();
        for item in read {
            let item = item.map_err(|e| CacheError::Read {
                path: self.root.clone(),
                source: e,
            })?;
            let path = item.path();
            let key = item.file_name().to_string_lossy().into_owned();
            if !path.is_dir() || key.ends_with(STAGING_SUFFIX) {
                continue;
            }
            entries.push(CacheEntry { key, path });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Delete the whole store.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root).map_err(|e| CacheError::Remove {
                path: self.root.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to read cache at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create cache directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove cache directory {path}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to move cache {from} to {to}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[error("no staged cache at {path}; the build did not export one")]
    NothingStaged { path: PathBuf },
}
