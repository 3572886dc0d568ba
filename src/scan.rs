//! C3 Local State Scanner: discovers the projects actually present on disk
//! and their Git state, in either the cheap "fast" mode (trust the last
//! snapshot) or the exhaustive "full" mode (walk the tree) spec.md §4.3
//! describes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use repox_manifest::project_key;
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

use crate::git::{BranchInfo, GitAdapter, GitError};
use crate::metadata::{self, MetadataError};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("two on-disk projects share the computed key for name {name:?} / remote {remote:?}: {first} and {second}")]
    DuplicateKey { name: String, remote: String, first: PathBuf, second: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Trust the most recent recorded snapshot, only confirming that each
    /// project's metadata directory still exists.
    Fast,
    /// Walk the full workspace tree, ignoring any prior snapshot.
    Full,
}

/// One local branch's tip, and the upstream it tracks if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchState {
    pub revision: String,
    pub tracking_branch: Option<String>,
    pub tracking_revision: Option<String>,
}

impl From<BranchInfo> for BranchState {
    fn from(info: BranchInfo) -> Self {
        BranchState {
            revision: info.revision,
            tracking_branch: info.tracking_branch,
            tracking_revision: info.tracking_revision,
        }
    }
}

/// Live Git state of one on-disk project (spec.md §4.3 "project state
/// snapshot"): the branch checked out (`None` means detached HEAD), every
/// local branch with its tip and tracking info, and working-tree cleanliness.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub current_branch: Option<String>,
    pub branches: HashMap<String, BranchState>,
    pub has_uncommitted_changes: bool,
    pub has_untracked_files: bool,
}

/// A project as found on disk: its recorded metadata, local policy
/// override, and live Git state.
#[derive(Debug, Clone)]
pub struct LocalProject {
    pub name: String,
    pub path: PathBuf,
    pub remote: String,
    pub remote_branch: String,
    pub revision: String,
    pub local_config: repox_manifest::LocalConfig,
    pub state: ProjectState,
}

impl LocalProject {
    pub fn key(&self) -> String {
        project_key(&self.name, &self.remote)
    }
}

/// Discovers every managed project under `workspace_root` and reads its
/// live Git state.
///
/// `Fast` mode trusts `prior_paths` (normally read from the last recorded
/// update-history snapshot) and only confirms each path's metadata
/// directory is still present; any miss falls back to a full walk, matching
/// spec.md §4.3's "fast path degrades to full scan on any inconsistency".
pub fn scan(
    workspace_root: &Path,
    mode: ScanMode,
    prior_paths: &[PathBuf],
) -> Result<BTreeMap<String, LocalProject>, ScanError> {
    let candidates = match mode {
        ScanMode::Fast if !prior_paths.is_empty() && prior_paths.iter().all(|p| metadata::jiri_dir(p).is_dir()) => {
            prior_paths.to_vec()
        }
        _ => walk_for_metadata_dirs(workspace_root),
    };

    let mut found = BTreeMap::new();
    for path in candidates {
        let Some(project) = metadata::read_metadata(&path)? else {
            continue;
        };

        // A metadata file's recorded path (workspace-relative) should name
        // the directory it was just found in; if it doesn't, the project
        // was moved or copied outside the tool's knowledge and is excluded
        // rather than trusted (spec.md §4.3 "a project whose recorded path
        // differs from its discovered path is logged as 'stale'").
        let recorded_path = workspace_root.join(project.effective_path());
        if recorded_path != path {
            warn!(
                discovered = %path.display(),
                recorded = %recorded_path.display(),
                "project metadata names a different path than where it was found; treating as stale"
            );
            continue;
        }

        let local_config = metadata::read_local_config(&path)?;
        let state = project_state(&path)?;
        let key = project_key(&project.name, &project.remote);

        // spec.md §2/§4.3: "each project's revision field is refreshed to
        // the current Git HEAD on disk," unconditionally — not just when a
        // named branch happens to be checked out.
        let revision = GitAdapter::at(&path).current_revision()?;

        let local = LocalProject {
            name: project.name.clone(),
            path: path.clone(),
            remote: project.remote.clone(),
            remote_branch: project.effective_remote_branch().to_string(),
            revision,
            local_config,
            state,
        };

        if let Some(existing) = found.insert(key, local) {
            return Err(ScanError::DuplicateKey {
                name: existing.name.clone(),
                remote: existing.remote.clone(),
                first: existing.path,
                second: path,
            });
        }
    }
    Ok(found)
}

fn walk_for_metadata_dirs(workspace_root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(workspace_root).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0 || !name.starts_with('.')
    });
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if metadata::metadata_path(entry.path()).is_file() {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths
}


fn project_state(project_path: &Path) -> Result<ProjectState, ScanError> {
    let adapter = GitAdapter::at(project_path);
    let branch_info = adapter.branch_info_all()?;
    let (_, current_branch) = adapter.get_branches()?;
    let branches = branch_info.into_iter().map(|(name, info)| (name, BranchState::from(info))).collect();
    Ok(ProjectState {
        current_branch,
        branches,
        has_uncommitted_changes: adapter.has_uncommitted_changes()?,
        has_untracked_files: adapter.has_untracked_files()?,
    })
}
