//! Workspace root discovery, persisted configuration, update-history
//! snapshots, and the advisory cross-process lock (spec.md §4 "Workspace",
//! §5 "Concurrency control").

use std::fs;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

const ROOT_MARKER: &str = ".jiri_root";
const CONFIG_FILE: &str = ".jiri_root/config";
const LOCK_FILE: &str = ".jiri_root/.lock";
const HISTORY_DIR: &str = ".jiri_root/update_history";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("no {ROOT_MARKER} found in {searched} or any parent directory")]
    NotFound { searched: PathBuf },

    #[error("failed to read workspace config at {path}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace config at {path} is not valid")]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: repox_manifest::ManifestError,
    },

    #[error("failed to write workspace config at {path}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("another repox process holds the workspace lock at {path}")]
    Locked { path: PathBuf },

    #[error("failed to acquire workspace lock at {path}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed updating snapshot history at {path}")]
    History {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persisted, per-workspace settings (spec.md §4 "WorkspaceConfig"): where
/// the shared cache lives, whether clones share objects, partial-clone
/// defaults, lockfile enforcement, and the attribute filter used to select
/// a manifest subtree. Round-trips to `.jiri_root/config` through
/// `repox_manifest`'s XML machinery (spec.md §6: "workspace-wide XML
/// options"), the same machinery the manifest, `metadata.v2`, and
/// per-project `LocalConfig` sidecars already go through.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub cache_path: Option<PathBuf>,
    pub shared_cache: bool,
    pub partial_clone: bool,
    pub partial_clone_filter: Option<String>,
    pub lockfile_name: Option<String>,
    pub enforce_lockfile: bool,
    pub analytics_opt_in: bool,
    pub attributes: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            cache_path: None,
            shared_cache: false,
            partial_clone: false,
            partial_clone_filter: None,
            lockfile_name: Some("jiri.lock".to_string()),
            enforce_lockfile: false,
            analytics_opt_in: false,
            attributes: Vec::new(),
        }
    }
}

impl WorkspaceConfig {
    fn to_xml_string(&self) -> String {
        repox_manifest::WorkspaceConfig::new(
            self.cache_path.as_ref().map(|p| p.display().to_string()),
            self.shared_cache,
            self.partial_clone,
            self.partial_clone_filter.clone(),
            self.lockfile_name.clone(),
            self.enforce_lockfile,
            self.analytics_opt_in,
            self.attributes.clone(),
        )
        .to_xml_string()
    }

    fn from_xml_string(xml: &str) -> Result<WorkspaceConfig, repox_manifest::ManifestError> {
        let parsed = repox_manifest::WorkspaceConfig::parse(xml)?;
        Ok(WorkspaceConfig {
            cache_path: parsed.cache_path.map(PathBuf::from),
            shared_cache: parsed.shared_cache,
            partial_clone: parsed.partial_clone,
            partial_clone_filter: parsed.partial_clone_filter,
            lockfile_name: parsed.lockfile_name,
            enforce_lockfile: parsed.enforce_lockfile,
            analytics_opt_in: parsed.analytics_opt_in,
            attributes: parsed.attributes().to_vec(),
        })
    }
}

/// A Git-workspace root, rooted at the directory containing `.jiri_root`
/// (spec.md §4 "Workspace discovery"). All paths handed out by this type
/// are absolute.
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
}

impl Workspace {
    /// Walks upward from `start` looking for `.jiri_root`, jiri-style.
    pub fn discover(start: &Path) -> Result<Workspace, WorkspaceError> {
        let mut dir = start
            .canonicalize()
            .map_err(|_| WorkspaceError::NotFound { searched: start.to_path_buf() })?;
        loop {
            if dir.join(ROOT_MARKER).is_dir() {
                return Workspace::open(&dir);
            }
            if !dir.pop() {
                return Err(WorkspaceError::NotFound { searched: start.to_path_buf() });
            }
        }
    }

    pub fn open(root: &Path) -> Result<Workspace, WorkspaceError> {
        let config_path = root.join(CONFIG_FILE);
        let config = if config_path.exists() {
            let text = fs::read_to_string(&config_path)
                .map_err(|source| WorkspaceError::ReadConfig { path: config_path.clone(), source })?;
            WorkspaceConfig::from_xml_string(&text).map_err(|source| WorkspaceError::MalformedConfig { path: config_path, source })?
        } else {
            WorkspaceConfig::default()
        };
        Ok(Workspace { root: root.to_path_buf(), config })
    }

    /// Initializes a new workspace root at `root`, writing a default config.
    pub fn init(root: &Path, config: WorkspaceConfig) -> Result<Workspace, WorkspaceError> {
        let marker = root.join(ROOT_MARKER);
        fs::create_dir_all(&marker).map_err(|source| WorkspaceError::WriteConfig { path: marker.clone(), source })?;
        let workspace = Workspace { root: root.to_path_buf(), config };
        workspace.write_config()?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WorkspaceConfig) -> Result<(), WorkspaceError> {
        self.config = config;
        self.write_config()
    }

    fn write_config(&self) -> Result<(), WorkspaceError> {
        let path = self.root.join(CONFIG_FILE);
        let text = self.config.to_xml_string();
        fs::write(&path, text).map_err(|source| WorkspaceError::WriteConfig { path, source })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    /// Takes the workspace's advisory cross-process lock (spec.md §5: one
    /// `update`/`import`/`snapshot` at a time per workspace). Held for the
    /// lifetime of the returned guard.
    pub fn lock(&self) -> Result<WorkspaceLock, WorkspaceError> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Lock { path: path.clone(), source })?;
        }
        let file = File::create(&path).map_err(|source| WorkspaceError::Lock { path: path.clone(), source })?;
        file.try_lock_exclusive().map_err(|_| WorkspaceError::Locked { path: path.clone() })?;
        Ok(WorkspaceLock { _file: file, path })
    }

    /// Records a new snapshot under `update_history/`, rotating the
    /// `latest`/`second-latest` symlinks (spec.md §4 "update history").
    /// Snapshots are named by wall-clock time rather than a counter so
    /// that two workspaces never collide when their histories are copied
    /// together, and so the filename itself tells you when a run happened.
    pub fn record_snapshot(&self, manifest_xml: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.history_dir();
        fs::create_dir_all(&dir).map_err(|source| WorkspaceError::History { path: dir.clone(), source })?;

        let snapshot_name = format!("snapshot-{}.xml", chrono::Local::now().format("%Y%m%dT%H%M%S%.3f"));
        let snapshot_path = dir.join(&snapshot_name);
        fs::write(&snapshot_path, manifest_xml)
            .map_err(|source| WorkspaceError::History { path: snapshot_path.clone(), source })?;

        let latest = dir.join("latest");
        let second_latest = dir.join("second-latest");
        if latest.exists() || latest.symlink_metadata().is_ok() {
            if second_latest.exists() || second_latest.symlink_metadata().is_ok() {
                let _ = fs::remove_file(&second_latest);
            }
            if let Ok(prev_target) = fs::read_link(&latest) {
                let _ = symlink(&prev_target, &second_latest);
            }
            let _ = fs::remove_file(&latest);
        }
        symlink(Path::new(&snapshot_name), &latest)
            .map_err(|source| WorkspaceError::History { path: latest, source })?;

        Ok(snapshot_path)
    }

    pub fn latest_snapshot(&self) -> Option<PathBuf> {
        let latest = self.history_dir().join("latest");
        fs::read_link(&latest).ok().map(|target| self.history_dir().join(target))
    }
}

pub struct WorkspaceLock {
    _file: File,
    path: PathBuf,
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self._file);
        let _ = self.path;
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    fs::write(link, target.display().to_string())?;
    let mut f = File::open(link)?;
    f.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_discover_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        Workspace::init(dir.path(), WorkspaceConfig::default()).unwrap();
        let found = Workspace::discover(dir.path()).unwrap();
        assert_eq!(found.root().canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn discover_walks_up_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        Workspace::init(dir.path(), WorkspaceConfig::default()).unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        let found = Workspace::discover(&nested).unwrap();
        assert_eq!(found.root().canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn lock_rejects_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::init(dir.path(), WorkspaceConfig::default()).unwrap();
        let _first = ws.lock().unwrap();
        assert!(matches!(ws.lock(), Err(WorkspaceError::Locked { .. })));
    }

    #[test]
    fn config_is_persisted_and_reopened_as_xml() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig {
            cache_path: Some(PathBuf::from("/var/cache/repox")),
            shared_cache: true,
            attributes: vec!["linux".to_string()],
            ..WorkspaceConfig::default()
        };
        Workspace::init(dir.path(), config).unwrap();

        let on_disk = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(on_disk.contains("<config"), "config file should be XML, not TOML: {on_disk}");
        assert!(on_disk.contains("cache-path"));

        let reopened = Workspace::open(dir.path()).unwrap();
        assert_eq!(reopened.config().cache_path, Some(PathBuf::from("/var/cache/repox")));
        assert!(reopened.config().shared_cache);
        assert_eq!(reopened.config().attributes, vec!["linux".to_string()]);
    }
}
