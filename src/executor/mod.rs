//! C7 Operation Executor: applies a [`crate::plan::Operation`] list with the
//! ordering and concurrency spec.md §4.7/§5 describe, and the per-project
//! Git state-machine logic (detached-head advance, tracked-branch rebase,
//! untracked-branch handling) spec.md §4.7 "Update (body)" specifies.

mod update_body;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::cache::{CacheError, CacheManager};
use crate::git::{CheckoutOptions, CloneOptions, GitAdapter, GitError};
use crate::loader::ResolvedProject;
use crate::metadata::{self, MetadataError};
use crate::plan::{Operation, PlanFlags};
use crate::scan::LocalProject;
use crate::workspace::WorkspaceConfig;

pub use update_body::update_body;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("failed to build a {jobs}-worker thread pool")]
    ThreadPool {
        jobs: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("I/O error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("planner invariant violated: {0}")]
    Invariant(String),
}

/// What running one operation produced. `Recoverable` failures are logged
/// and counted but never abort the run (spec.md §7 propagation policy);
/// only an `Err(ExecutorError)` is fatal.
#[derive(Debug)]
pub enum OpOutcome {
    Success,
    Skipped,
    Recoverable(String),
}

pub struct ExecContext {
    pub cache: CacheManager,
    pub workspace_config: WorkspaceConfig,
    pub flags: PlanFlags,
    pub jobs: usize,
    pub workspace_root: PathBuf,
}

pub struct ExecutionReport {
    pub failure_count: u32,
    pub descriptions: Vec<String>,
}

/// Runs the pre-flight `test()` pass spec.md §4.7 requires: every
/// operation's feasibility is checked against a shared `fs_updates` ledger
/// *before* any operation actually runs, in the same order the plan would
/// execute them.
fn preflight(ops: &[Operation]) -> Result<(), ExecutorError> {
    let mut ledger: BTreeMap<PathBuf, bool> = BTreeMap::new();
    let present = |ledger: &BTreeMap<PathBuf, bool>, path: &Path| ledger.get(path).copied().unwrap_or_else(|| path.exists());

    for op in ops {
        match op {
            Operation::Create { project } => {
                if present(&ledger, &project.path) && fs_non_empty(&project.path) {
                    return Err(ExecutorError::Invariant(format!(
                        "create target {} is present and non-empty",
                        project.path.display()
                    )));
                }
                ledger.insert(project.path.clone(), true);
            }
            Operation::Delete { project } => {
                if !present(&ledger, &project.path) {
                    return Err(ExecutorError::Invariant(format!("delete target {} is already absent", project.path.display())));
                }
                ledger.insert(project.path.clone(), false);
            }
            Operation::Move { local, remote } => {
                if !present(&ledger, &local.path) {
                    return Err(ExecutorError::Invariant(format!("move source {} is absent", local.path.display())));
                }
                if present(&ledger, &remote.path) {
                    return Err(ExecutorError::Invariant(format!("move destination {} is already present", remote.path.display())));
                }
                ledger.insert(local.path.clone(), false);
                ledger.insert(remote.path.clone(), true);
            }
            Operation::ChangeRemote { .. } | Operation::Update { .. } | Operation::Null { .. } => {}
        }
    }
    Ok(())
}

fn fs_non_empty(path: &Path) -> bool {
    fs::read_dir(path).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}

/// Runs every operation in `ops` in the order spec.md §4.7/§5 specify:
/// Deletes, then ChangeRemotes, then Moves, then Creates, then Updates,
/// then Nulls — each phase a barrier, each with its own concurrency
/// strategy. Returns once every phase has completed (or a fatal error
/// aborts the whole run).
pub fn execute(ops: Vec<Operation>, ctx: &ExecContext) -> Result<ExecutionReport, ExecutorError> {
    preflight(&ops)?;

    let mut deletes = Vec::new();
    let mut change_remotes = Vec::new();
    let mut moves = Vec::new();
    let mut creates = Vec::new();
    let mut updates = Vec::new();
    let mut nulls = Vec::new();

    for op in ops {
        match op {
            Operation::Delete { project } => deletes.push(project),
            Operation::ChangeRemote { local, remote } => change_remotes.push((local, remote)),
            Operation::Move { local, remote } => moves.push((local, remote)),
            Operation::Create { project } => creates.push(project),
            Operation::Update { local, remote } => updates.push((local, remote)),
            Operation::Null { local, remote } => nulls.push((local, remote)),
        }
    }

    let mut failure_count = 0u32;
    let mut descriptions = Vec::new();

    failure_count += run_deletes(deletes, ctx, &mut descriptions)?;
    failure_count += run_leveled(
        change_remotes,
        |(local, _)| local.path.clone(),
        ctx,
        true,
        &mut descriptions,
        |(local, remote), ctx| execute_change_remote(local, remote, ctx),
    )?;
    failure_count += run_moves(moves, ctx, &mut descriptions)?;
    failure_count += run_leveled(
        creates,
        |project| project.path.clone(),
        ctx,
        true,
        &mut descriptions,
        |project, ctx| execute_create(project, ctx),
    )?;
    failure_count += run_leveled(
        updates,
        |(local, _)| local.path.clone(),
        ctx,
        true,
        &mut descriptions,
        |(local, remote), ctx| update_body(&local, &remote, ctx),
    )?;
    failure_count += run_leveled(
        nulls,
        |(local, _)| local.path.clone(),
        ctx,
        true,
        &mut descriptions,
        |(local, remote), ctx| execute_null(local, remote, ctx),
    )?;

    Ok(ExecutionReport { failure_count, descriptions })
}

/// Deletes run sequentially, deepest path first (already the incoming
/// order: the planner sorts Delete as a reversed, deepest-first prefix).
fn run_deletes(deletes: Vec<LocalProject>, ctx: &ExecContext, descriptions: &mut Vec<String>) -> Result<u32, ExecutorError> {
    let mut failures = 0;
    for project in deletes {
        let path = project.path.clone();
        match execute_delete(project, ctx)? {
            OpOutcome::Recoverable(msg) => {
                tracing::error!(path = %path.display(), %msg, "delete failed");
                descriptions.push(format!("{}: {msg}", path.display()));
                failures += 1;
            }
            OpOutcome::Success | OpOutcome::Skipped => {}
        }
    }
    Ok(failures)
}

/// Moves run sequentially, shallowest path first, tracking renames so a
/// child whose parent project just moved gets its source path corrected
/// before its own rename runs (spec.md §4.7 "Move").
fn run_moves(moves: Vec<(LocalProject, ResolvedProject)>, ctx: &ExecContext, descriptions: &mut Vec<String>) -> Result<u32, ExecutorError> {
    let mut failures = 0;
    let mut renamed: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (mut local, remote) in moves {
        for (old, new) in &renamed {
            if let Ok(suffix) = local.path.strip_prefix(old) {
                local.path = new.join(suffix);
            }
        }
        let (from, to) = (local.path.clone(), remote.path.clone());
        match execute_move(local, remote, ctx)? {
            OpOutcome::Recoverable(msg) => {
                tracing::error!(from = %from.display(), to = %to.display(), %msg, "move failed");
                descriptions.push(format!("{} -> {}: {msg}", from.display(), to.display()));
                failures += 1;
            }
            OpOutcome::Success | OpOutcome::Skipped => {}
        }
        renamed.push((from, to));
    }
    Ok(failures)
}

/// Runs `items` grouped into levels by path depth (number of components),
/// a level at a time, each level bounded-parallel by `ctx.jobs`. Grouping
/// by depth gives both guarantees spec.md §4.7/§5 ask for at once: two
/// paths where one is a prefix of the other always differ in depth, so
/// same-level work never conflicts, and `ascending` controls whether
/// shallower (parent) or deeper (child) levels run first.
fn run_leveled<T, F, G>(items: Vec<T>, path_of: F, ctx: &ExecContext, ascending: bool, descriptions: &mut Vec<String>, exec_one: G) -> Result<u32, ExecutorError>
where
    T: Send,
    F: Fn(&T) -> PathBuf,
    G: Fn(T, &ExecContext) -> Result<OpOutcome, ExecutorError> + Sync,
{
    if items.is_empty() {
        return Ok(0);
    }
    let mut levels: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    for item in items {
        let depth = path_of(&item).components().count();
        levels.entry(depth).or_default().push(item);
    }
    let depths: Vec<usize> = if ascending {
        levels.keys().copied().collect()
    } else {
        levels.keys().rev().copied().collect()
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.jobs.max(1))
        .build()
        .map_err(|source| ExecutorError::ThreadPool { jobs: ctx.jobs, source })?;

    let mut failures = 0;
    for depth in depths {
        let Some(bucket) = levels.remove(&depth) else { continue };
        let results: Vec<Result<(PathBuf, OpOutcome), ExecutorError>> = pool.install(|| {
            bucket
                .into_par_iter()
                .map(|item| {
                    let path = path_of(&item);
                    exec_one(item, ctx).map(|outcome| (path, outcome))
                })
                .collect()
        });
        for result in results {
            let (path, outcome) = result?;
            if let OpOutcome::Recoverable(msg) = outcome {
                tracing::error!(path = %path.display(), %msg, "operation failed");
                descriptions.push(format!("{}: {msg}", path.display()));
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn execute_create(project: ResolvedProject, ctx: &ExecContext) -> Result<OpOutcome, ExecutorError> {
    let path = &project.path;
    if path.exists() {
        if fs_non_empty(path) {
            return Err(ExecutorError::Invariant(format!("create target {} is non-empty", path.display())));
        }
        fs::remove_dir(path).map_err(|source| ExecutorError::Io { path: path.clone(), source })?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ExecutorError::Io { path: parent.to_path_buf(), source })?;
    }
    fs::create_dir_all(path).map_err(|source| ExecutorError::Io { path: path.clone(), source })?;
    set_standard_permissions(path)?;

    let use_cache = project.history_depth == 0;
    let reference = if use_cache { ctx.cache.ensure_fresh(&project.remote)? } else { None };

    let clone_opts = CloneOptions {
        no_checkout: true,
        reference_repo: reference.clone(),
        shared: reference.is_some() && ctx.workspace_config.shared_cache,
        depth: project.history_depth,
        filter_blobs: ctx.workspace_config.partial_clone,
        mirror: false,
    };

    let adapter = match GitAdapter::clone(&project.remote, path, &clone_opts) {
        Ok(adapter) => adapter,
        Err(err) => return Ok(OpOutcome::Recoverable(format!("clone failed: {err}"))),
    };

    let target = project.target_revision();
    if let Err(err) = adapter.checkout(&target, CheckoutOptions { detach: true, force: true }) {
        return Ok(OpOutcome::Recoverable(format!(
            "checked out but failed to reach {target}: {err}; run `git -C {} checkout --detach {target}` manually",
            path.display()
        )));
    }

    // Clones leave a default branch (e.g. `master`) pointing at HEAD; a
    // freshly created project should start on a detached head unless the
    // user later creates a branch themselves.
    if let Ok((branches, current)) = adapter.get_branches() {
        if current.is_none() {
            for branch in branches {
                let _ = adapter.delete_branch(&branch, true);
            }
        }
    }

    write_project_metadata(&project, path, &ctx.workspace_root)?;
    finalize_jiri_head(&adapter, path, &target)?;
    Ok(OpOutcome::Success)
}

fn execute_delete(project: LocalProject, ctx: &ExecContext) -> Result<OpOutcome, ExecutorError> {
    if !ctx.flags.gc {
        tracing::warn!(path = %project.path.display(), "project removed from manifest; re-run with -gc to delete it");
        return Ok(OpOutcome::Skipped);
    }
    if project.local_config.is_opaque() {
        tracing::warn!(path = %project.path.display(), "project is ignored locally; not deleting");
        return Ok(OpOutcome::Skipped);
    }
    let only_branch = project.state.current_branch.is_none() && project.state.branches.is_empty();
    if !only_branch {
        return Ok(OpOutcome::Recoverable("has local branches besides a detached head; not deleting".into()));
    }
    if project.state.has_uncommitted_changes {
        return Ok(OpOutcome::Recoverable("has uncommitted changes; not deleting".into()));
    }
    if project.state.has_untracked_files {
        return Ok(OpOutcome::Recoverable("has untracked files; not deleting".into()));
    }

    fs::remove_dir_all(&project.path).map_err(|source| ExecutorError::Io { path: project.path.clone(), source })?;
    remove_empty_ancestors(&project.path, &ctx.workspace_root);
    Ok(OpOutcome::Success)
}

fn remove_empty_ancestors(deleted: &Path, workspace_root: &Path) {
    let mut dir = deleted.parent().map(Path::to_path_buf);
    while let Some(current) = dir {
        if current == workspace_root || !current.starts_with(workspace_root) {
            break;
        }
        match fs::read_dir(&current) {
            Ok(mut entries) if entries.next().is_none() => {
                if fs::remove_dir(&current).is_err() {
                    break;
                }
                dir = current.parent().map(Path::to_path_buf);
            }
            _ => break,
        }
    }
}

fn execute_move(local: LocalProject, remote: ResolvedProject, ctx: &ExecContext) -> Result<OpOutcome, ExecutorError> {
    if local.local_config.is_opaque() {
        tracing::warn!(path = %local.path.display(), "project is ignored locally; not moving");
        return Ok(OpOutcome::Skipped);
    }
    if let Some(parent) = remote.path.parent() {
        fs::create_dir_all(parent).map_err(|source| ExecutorError::Io { path: parent.to_path_buf(), source })?;
    }
    fs::rename(&local.path, &remote.path).map_err(|source| ExecutorError::Io { path: remote.path.clone(), source })?;

    let moved_local = LocalProject { path: remote.path.clone(), ..local };
    update_body(&moved_local, &remote, ctx)
}

fn execute_change_remote(local: LocalProject, remote: ResolvedProject, ctx: &ExecContext) -> Result<OpOutcome, ExecutorError> {
    if local.local_config.blocks_update() {
        tracing::warn!(path = %local.path.display(), "project is ignored or no-update locally; not changing remote");
        return Ok(OpOutcome::Skipped);
    }

    const TEMP_REMOTE: &str = "repox-change-remote";
    let adapter = GitAdapter::at(&local.path);
    let _ = adapter.remove_remote(TEMP_REMOTE);
    if let Err(err) = adapter.add_remote(TEMP_REMOTE, &remote.remote) {
        return Ok(OpOutcome::Recoverable(format!("could not add candidate remote: {err}")));
    }
    if let Err(err) = adapter.fetch(TEMP_REMOTE, &crate::git::FetchOptions { all: false, prune: false }) {
        let _ = adapter.remove_remote(TEMP_REMOTE);
        return Ok(OpOutcome::Recoverable(format!("could not fetch candidate remote: {err}")));
    }

    for (branch, state) in &local.state.branches {
        let containing = match adapter.list_remote_branches_containing(&state.revision) {
            Ok(list) => list,
            Err(err) => {
                let _ = adapter.remove_remote(TEMP_REMOTE);
                return Ok(OpOutcome::Recoverable(format!("could not inspect {branch}: {err}")));
            }
        };
        let prefix = format!("{TEMP_REMOTE}/");
        if !containing.iter().any(|b| b.starts_with(&prefix)) {
            let _ = adapter.remove_remote(TEMP_REMOTE);
            return Ok(OpOutcome::Recoverable(format!(
                "local branch {branch} (at {}) is not reachable from the new remote {}; resolve manually before changing remotes",
                state.revision, remote.remote
            )));
        }
    }
    let _ = adapter.remove_remote(TEMP_REMOTE);

    if let Err(err) = adapter.set_remote_url("origin", &remote.remote) {
        return Ok(OpOutcome::Recoverable(format!("could not repoint origin: {err}")));
    }
    if let Err(err) = adapter.fetch("origin", &crate::git::FetchOptions { all: true, prune: true }) {
        return Ok(OpOutcome::Recoverable(format!("could not fetch new origin: {err}")));
    }

    let renamed_local = LocalProject { remote: remote.remote.clone(), ..local };
    update_body(&renamed_local, &remote, ctx)
}

fn execute_null(local: LocalProject, remote: ResolvedProject, ctx: &ExecContext) -> Result<OpOutcome, ExecutorError> {
    write_project_metadata(&remote, &remote.path, &ctx.workspace_root)?;
    if !local.local_config.blocks_update() {
        let adapter = GitAdapter::at(&remote.path);
        finalize_jiri_head(&adapter, &remote.path, &remote.target_revision())?;
    }
    Ok(OpOutcome::Success)
}

/// Writes `<path>/.git/jiri/metadata.v2`, storing `project.path` relative
/// to the workspace root (spec.md §4.2 "paths persisted in a manifest are
/// always stored relative to the workspace root"; §6 "a single serialized
/// `<project>` element with relative paths").
pub(crate) fn write_project_metadata(project: &ResolvedProject, path: &Path, workspace_root: &Path) -> Result<(), ExecutorError> {
    let relative_path = project.path.strip_prefix(workspace_root).unwrap_or(&project.path).display().to_string();
    let record = repox_manifest::Project {
        name: project.name.clone(),
        path: Some(relative_path),
        remote: project.remote.clone(),
        remote_branch: Some(project.remote_branch.clone()),
        revision: Some(project.revision.clone()),
        gerrit_host: project.gerrit_host.clone(),
        git_hooks: project.git_hooks.clone(),
        history_depth: Some(project.history_depth),
    };
    metadata::write_metadata(path, &record)?;
    Ok(())
}

/// Resolves `target_ref` to a concrete commit and records it as this
/// project's `JIRI_HEAD` (spec.md §4.7 "JIRI_HEAD file write").
pub(crate) fn finalize_jiri_head(adapter: &GitAdapter, path: &Path, target_ref: &str) -> Result<(), ExecutorError> {
    let commit = adapter.current_revision_for_ref(target_ref)?;
    metadata::write_jiri_head(path, &commit)?;
    Ok(())
}

#[cfg(unix)]
fn set_standard_permissions(path: &Path) -> Result<(), ExecutorError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o755);
    fs::set_permissions(path, perms).map_err(|source| ExecutorError::Io { path: path.to_path_buf(), source })
}

#[cfg(not(unix))]
fn set_standard_permissions(_path: &Path) -> Result<(), ExecutorError> {
    Ok(())
}
