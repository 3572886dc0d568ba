//! C4 Cache Manager: one shared bare/mirror clone per remote URL under a
//! user cache root, reused as a clone `reference` or direct origin.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::git::{CloneOptions, FetchOptions, GitAdapter, GitError};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Maintains the shared cache directory, serializing updates to the same
/// cache path across concurrent callers (spec.md §5 "cache updates use a
/// bounded worker pool, deduplicating by cache-directory path").
#[derive(Clone)]
pub struct CacheManager {
    root: Option<PathBuf>,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl CacheManager {
    pub fn new(root: Option<PathBuf>) -> Self {
        CacheManager {
            root,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Derives `cache_root/<scheme-and-host>-<slash-encoded-path>` for a
    /// remote URL (spec.md §4.4).
    pub fn path_for(&self, remote: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        Some(root.join(cache_dir_name(remote)))
    }

    /// Ensures the cache entry for `remote` exists and is up to date,
    /// creating it with `--mirror` the first time and running
    /// `fetch --all --prune` otherwise. Returns `None` when no cache root
    /// is configured.
    pub fn ensure_fresh(&self, remote: &str) -> Result<Option<PathBuf>, CacheError> {
        let Some(path) = self.path_for(remote) else {
            return Ok(None);
        };

        let path_lock = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(path.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = path_lock.lock().unwrap();

        if path.exists() {
            GitAdapter::at(&path).fetch(
                "origin",
                &FetchOptions {
                    all: true,
                    prune: true,
                },
            )?;
        } else {
            GitAdapter::clone(
                remote,
                &path,
                &CloneOptions {
                    mirror: true,
                    ..Default::default()
                },
            )?;
        }
        Ok(Some(path))
    }
}

fn cache_dir_name(remote: &str) -> String {
    let (scheme, rest) = remote.split_once("://").unwrap_or(("file", remote));
    let rest = rest.trim_end_matches('/');
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    let slash_encoded_path = urlencoding::encode(path.trim_start_matches('/')).replace("%2F", "-");
    if slash_encoded_path.is_empty() {
        format!("{scheme}-{host}")
    } else {
        format!("{scheme}-{host}-{slash_encoded_path}")
    }
}
