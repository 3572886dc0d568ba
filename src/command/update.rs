//! `update` — the main reconciliation loop: scan, load, plan, execute, and
//! optionally run hooks and record history (spec.md §6 "update", the
//! composition of every other component).

use std::time::Duration;

use clap::Args;
use miette::Diagnostic;
use thiserror::Error;

use crate::cache::CacheManager;
use crate::executor::{self, ExecContext, ExecutorError};
use crate::hooks::{self, HookJob, HooksError};
use crate::loader::{self, LoadInput, LoaderError};
use crate::plan::{self, PlanFlags};
use crate::scan::{self, ScanError, ScanMode};
use crate::workspace::{Workspace, WorkspaceError};

use super::snapshot::{build_snapshot, prior_paths};

/// Hard cap on the worker pool spec.md §5 sets regardless of CPU count.
const MAX_JOBS: usize = 50;

/// Default hook deadline (spec.md §4.8 "--hook-timeout, minutes, default 5").
const DEFAULT_HOOK_TIMEOUT_MINUTES: u32 = 5;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// delete projects no longer present in the manifest
    #[arg(short = 'g', long = "gc")]
    gc: bool,

    /// read every manifest from its working tree instead of a pinned ref
    #[arg(long = "local-manifest")]
    local_manifest: bool,

    /// rebase tracked branches that are behind their upstream
    #[arg(long = "rebase-tracked")]
    rebase_tracked: bool,

    /// rebase untracked branches too, when combined with --rebase-all
    #[arg(long = "rebase-untracked")]
    rebase_untracked: bool,

    /// rebase every local branch, not just the checked-out one
    #[arg(long = "rebase-all")]
    rebase_all: bool,

    /// run post-update hooks after reconciliation succeeds
    #[arg(long = "run-hooks")]
    run_hooks: bool,

    /// per-hook deadline, in minutes
    #[arg(long = "hook-timeout", default_value_t = DEFAULT_HOOK_TIMEOUT_MINUTES)]
    hook_timeout: u32,

    /// bound the worker pool (default: CPU count x 2, capped at 50)
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum UpdateError {
    #[error(transparent)]
    #[diagnostic(code(repox::command::update::workspace))]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::update::scan))]
    Scan(#[from] ScanError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::update::loader))]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::update::executor))]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::update::hooks))]
    Hooks(#[from] HooksError),

    #[error("{count} project(s) failed to reconcile; see the log above")]
    #[diagnostic(code(repox::command::update::recoverable_failures))]
    RecoverableFailures { count: u32 },
}

pub fn run_update(args: UpdateArgs) -> Result<(), UpdateError> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let workspace = Workspace::discover(&cwd)?;
    let _lock = workspace.lock()?;

    let cache_root = workspace.config().cache_path.clone().or_else(|| dirs::cache_dir().map(|d| d.join("repox")));
    let cache = CacheManager::new(cache_root);

    let prior = prior_paths(&workspace);
    let scanned = scan::scan(workspace.root(), ScanMode::Fast, &prior)?;
    let local_projects: std::collections::HashMap<String, crate::scan::LocalProject> = scanned.into_iter().collect();

    let root_manifest_path = workspace.root().join(".jiri_manifest");
    let input = LoadInput {
        root_manifest_path: &root_manifest_path,
        workspace_root: workspace.root(),
        local_projects: &local_projects,
        update: true,
        local_manifest: args.local_manifest,
        cache: &cache,
    };
    let output = loader::load(&input)?;

    let flags = PlanFlags {
        gc: args.gc,
        rebase_tracked: args.rebase_tracked,
        rebase_untracked: args.rebase_untracked,
        rebase_all: args.rebase_all,
        snapshot: false,
    };
    let ops = plan::plan(local_projects, output.projects.clone(), flags);

    for op in &ops {
        tracing::info!(op = %op.describe(), "planned");
    }

    let ctx = ExecContext {
        cache,
        workspace_config: workspace.config().clone(),
        flags,
        jobs: resolve_jobs(args.jobs),
        workspace_root: workspace.root().to_path_buf(),
    };
    let report = executor::execute(ops, &ctx)?;

    if args.run_hooks {
        let jobs: Vec<HookJob> = output
            .hooks
            .into_iter()
            .map(|h| HookJob {
                name: h.name,
                project_name: h.project_name,
                action: h.action,
                action_path: h.action_path,
            })
            .collect();
        hooks::run_hooks(jobs, Duration::from_secs(u64::from(args.hook_timeout) * 60), args.hook_timeout)?;
    }

    let manifest = build_snapshot(workspace.root(), &output.projects);
    if let Err(source) = workspace.record_snapshot(&manifest.to_xml_string()) {
        tracing::warn!(%source, "failed to record update-history snapshot");
    }

    if report.failure_count > 0 {
        return Err(UpdateError::RecoverableFailures { count: report.failure_count });
    }
    Ok(())
}

/// CPU count x 2, capped at 50, unless the caller pins a value explicitly
/// (spec.md §5 "bounded by a user-provided `jobs` value").
fn resolve_jobs(explicit: Option<usize>) -> usize {
    if let Some(jobs) = explicit {
        return jobs.max(1);
    }
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cpus * 2).min(MAX_JOBS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_jobs_honors_explicit_value() {
        assert_eq!(resolve_jobs(Some(4)), 4);
        assert_eq!(resolve_jobs(Some(0)), 1);
    }

    #[test]
    fn resolve_jobs_caps_at_fifty() {
        assert!(resolve_jobs(None) <= MAX_JOBS);
        assert!(resolve_jobs(None) >= 1);
    }
}
