//! `snapshot` — writes a manifest pinning every project's current revision
//! to a caller-chosen path (spec.md §6 "snapshot"). The same projection is
//! used internally by `update` to populate `.jiri_root/update_history/`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use miette::Diagnostic;
use repox_manifest::{Manifest, Project};
use thiserror::Error;

use crate::loader::ResolvedProject;
use crate::metadata;
use crate::scan::{self, ScanMode};
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// where to write the snapshot manifest
    output: PathBuf,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error(transparent)]
    #[diagnostic(code(repox::command::snapshot::workspace))]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::snapshot::scan))]
    Scan(#[from] scan::ScanError),

    #[error("failed to write snapshot to {path}")]
    #[diagnostic(code(repox::command::snapshot::write))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn run_snapshot(args: SnapshotArgs) -> Result<(), SnapshotError> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let workspace = Workspace::discover(&cwd)?;
    let local = scan::scan(workspace.root(), ScanMode::Full, &[])?;

    let projects: Vec<Project> = local
        .values()
        .map(|p| Project {
            name: p.name.clone(),
            path: Some(p.path.strip_prefix(workspace.root()).unwrap_or(&p.path).display().to_string()),
            remote: p.remote.clone(),
            remote_branch: Some(p.remote_branch.clone()),
            revision: Some(metadata::read_jiri_head(&p.path).unwrap_or_else(|| p.revision.clone())),
            gerrit_host: None,
            git_hooks: None,
            history_depth: None,
        })
        .collect();

    let manifest = Manifest::from_projects(projects);
    fs::write(&args.output, manifest.to_xml_string()).map_err(|source| SnapshotError::Write { path: args.output.clone(), source })?;
    tracing::info!(path = %args.output.display(), "wrote snapshot manifest");
    Ok(())
}

/// Builds the same pinned-revision projection `run_snapshot` writes, from
/// an already-resolved project set (used by `update` to record history
/// without re-scanning the workspace it just reconciled).
pub(crate) fn build_snapshot(workspace_root: &std::path::Path, projects: &HashMap<String, ResolvedProject>) -> Manifest {
    let list: Vec<Project> = projects
        .values()
        .map(|p| Project {
            name: p.name.clone(),
            path: Some(p.path.strip_prefix(workspace_root).unwrap_or(&p.path).display().to_string()),
            remote: p.remote.clone(),
            remote_branch: Some(p.remote_branch.clone()),
            revision: Some(metadata::read_jiri_head(&p.path).unwrap_or_else(|| p.target_revision())),
            gerrit_host: p.gerrit_host.clone(),
            git_hooks: p.git_hooks.clone(),
            history_depth: Some(p.history_depth),
        })
        .collect();
    Manifest::from_projects(list)
}

/// Reads the most recent `update_history` snapshot (if any) and returns
/// the absolute paths it recorded, for the scanner's fast path (spec.md
/// §4.3 "Fast: read the most recent update-history snapshot").
pub(crate) fn prior_paths(workspace: &Workspace) -> Vec<PathBuf> {
    let Some(snapshot_path) = workspace.latest_snapshot() else {
        return Vec::new();
    };
    let Ok(text) = fs::read_to_string(&snapshot_path) else {
        return Vec::new();
    };
    let Ok(manifest) = Manifest::parse(&text) else {
        return Vec::new();
    };
    manifest.projects().iter().map(|p| workspace.root().join(p.effective_path())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;

    fn resolved(name: &str, path: &str) -> ResolvedProject {
        ResolvedProject {
            name: name.to_string(),
            path: PathBuf::from(path),
            remote: format!("https://example.com/{name}"),
            remote_branch: "master".to_string(),
            revision: "HEAD".to_string(),
            gerrit_host: None,
            git_hooks: None,
            history_depth: 0,
        }
    }

    #[test]
    fn build_snapshot_pins_every_project() {
        let root = PathBuf::from("/workspace");
        let mut projects = HashMap::new();
        projects.insert("foo".to_string(), resolved("foo", "/workspace/foo"));
        let manifest = build_snapshot(&root, &projects);
        assert_eq!(manifest.projects().len(), 1);
        assert_eq!(manifest.projects()[0].name, "foo");
        assert_eq!(manifest.imports().len(), 0);
    }

    #[test]
    fn prior_paths_is_empty_without_a_recorded_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::init(dir.path(), WorkspaceConfig::default()).unwrap();
        assert!(prior_paths(&workspace).is_empty());
    }
}
