//! The "Update (body)" state machine spec.md §4.7 describes: advancing a
//! detached-head project straight to its target revision, or walking each
//! of a tracked-branch project's local branches and deciding whether to
//! rebase, warn, or leave them alone.
//!
//! Shared by the `Update` operation itself and by `Move`/`ChangeRemote`,
//! which both end with "perform an Update body" once their own structural
//! change (rename, remote swap) has landed.

use crate::git::{CheckoutOptions, GitAdapter};
use crate::loader::ResolvedProject;
use crate::scan::LocalProject;

use super::{finalize_jiri_head, write_project_metadata, ExecContext, ExecutorError, OpOutcome};

/// Restores the working tree to whatever branch (or detached commit) it
/// was on before a `rebase_all` pass started touching other branches,
/// even if the function returns early (spec.md §4.7 "Restoration must run
/// even on early return (scoped cleanup)").
struct BranchRestoreGuard<'a> {
    adapter: &'a GitAdapter,
    original_branch: Option<String>,
    original_revision: String,
    active: bool,
}

impl Drop for BranchRestoreGuard<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let result = match &self.original_branch {
            Some(branch) => self.adapter.checkout(branch, CheckoutOptions { detach: false, force: false }),
            None => self.adapter.checkout(&self.original_revision, CheckoutOptions { detach: true, force: false }),
        };
        if let Err(err) = result {
            tracing::warn!(dir = %self.adapter.dir().display(), %err, "failed to restore original branch after rebase-all pass");
        }
    }
}

pub fn update_body(local: &LocalProject, remote: &ResolvedProject, ctx: &ExecContext) -> Result<OpOutcome, ExecutorError> {
    if local.local_config.blocks_update() {
        tracing::warn!(path = %local.path.display(), "project is ignored or no-update locally; not updating");
        return Ok(OpOutcome::Skipped);
    }
    if local.state.has_uncommitted_changes {
        return Ok(OpOutcome::Recoverable("has uncommitted changes; skipped".into()));
    }

    let adapter = GitAdapter::at(&local.path);
    let target = remote.target_revision();
    let detached = local.state.current_branch.is_none();

    if detached || ctx.flags.snapshot {
        if let Err(err) = adapter.checkout(&target, CheckoutOptions { detach: true, force: false }) {
            return Ok(OpOutcome::Recoverable(format!(
                "failed to advance to {target}: {err}; run `git -C {} checkout --detach {target}` manually",
                local.path.display()
            )));
        }
        if ctx.flags.snapshot || !ctx.flags.rebase_all {
            write_project_metadata(remote, &remote.path, &ctx.workspace_root)?;
            finalize_jiri_head(&adapter, &remote.path, &target)?;
            return Ok(OpOutcome::Success);
        }
    }

    let branches_to_process: Vec<String> = if ctx.flags.rebase_all {
        local.state.branches.keys().cloned().collect()
    } else {
        local.state.current_branch.iter().cloned().collect()
    };

    let restore_guard = if ctx.flags.rebase_all {
        Some(BranchRestoreGuard {
            adapter: &adapter,
            original_branch: local.state.current_branch.clone(),
            original_revision: local.revision.clone(),
            active: true,
        })
    } else {
        None
    };

    let mut warnings = Vec::new();

    for branch in &branches_to_process {
        let Some(state) = local.state.branches.get(branch) else { continue };

        match (&state.tracking_branch, &state.tracking_revision) {
            (Some(upstream), Some(upstream_rev)) if &state.revision != upstream_rev => {
                if local.local_config.blocks_rebase() {
                    continue;
                }
                if !ctx.flags.rebase_tracked {
                    warnings.push(format!(
                        "branch {branch} is behind {upstream}; rebase manually: git -C {} checkout {branch} && git -C {} rebase {upstream}",
                        local.path.display(),
                        local.path.display()
                    ));
                    continue;
                }
                try_rebase(&adapter, branch, upstream, &mut warnings);
            }
            (None, _) => {
                let already_contains_target = adapter.list_branches_containing(&target).map(|bs| bs.iter().any(|b| b == branch)).unwrap_or(false);
                if already_contains_target {
                    continue;
                }
                if local.local_config.blocks_rebase() {
                    continue;
                }
                if ctx.flags.rebase_untracked {
                    try_rebase(&adapter, branch, &target, &mut warnings);
                } else {
                    warnings.push(format!(
                        "branch {branch} is untracked and behind {target}; rebase manually: git -C {} checkout {branch} && git -C {} rebase {target}",
                        local.path.display(),
                        local.path.display()
                    ));
                }
            }
            _ => {}
        }
    }

    drop(restore_guard);

    write_project_metadata(remote, &remote.path, &ctx.workspace_root)?;
    finalize_jiri_head(&adapter, &remote.path, &target)?;

    if warnings.is_empty() {
        Ok(OpOutcome::Success)
    } else {
        for warning in &warnings {
            tracing::warn!(path = %local.path.display(), "{warning}");
        }
        Ok(OpOutcome::Recoverable(warnings.join("; ")))
    }
}

fn try_rebase(adapter: &GitAdapter, branch: &str, onto: &str, warnings: &mut Vec<String>) {
    if let Err(err) = adapter.checkout(branch, CheckoutOptions { detach: false, force: false }) {
        warnings.push(format!("could not check out {branch} to rebase it: {err}"));
        return;
    }
    if let Err(err) = adapter.rebase(onto) {
        let _ = adapter.rebase_abort();
        warnings.push(format!("rebase of {branch} onto {onto} failed ({err}) and was aborted; branch left at its pre-run tip"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::plan::PlanFlags;
    use crate::scan::{BranchState, ProjectState};
    use crate::workspace::WorkspaceConfig;
    use repox_manifest::DEFAULT_REVISION;
    use std::collections::HashMap;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").arg("-C").arg(dir).args(args).status().expect("git invocation");
        assert!(status.success(), "git {args:?} failed in {}", dir.display());
    }

    fn commit(dir: &Path, file: &str, contents: &str, message: &str) {
        std::fs::write(dir.join(file), contents).unwrap();
        git(dir, &["add", file]);
        git(dir, &["commit", "--quiet", "-m", message]);
    }

    fn init_project(dir: &Path) {
        git(dir, &["init", "--quiet"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        commit(dir, "README", "hello", "initial");
    }

    fn current_branch_name(dir: &Path) -> String {
        let adapter = GitAdapter::at(dir);
        let (branches, current) = adapter.get_branches().unwrap();
        current.unwrap_or_else(|| branches.into_iter().next().expect("at least one branch"))
    }

    fn ctx(workspace_root: &Path) -> ExecContext {
        ExecContext {
            cache: CacheManager::new(None),
            workspace_config: WorkspaceConfig::default(),
            flags: PlanFlags::default(),
            jobs: 1,
            workspace_root: workspace_root.to_path_buf(),
        }
    }

    fn local_project(path: &Path, branch: Option<&str>, state_branches: HashMap<String, BranchState>) -> LocalProject {
        LocalProject {
            name: "foo".into(),
            path: path.to_path_buf(),
            remote: "https://example.com/foo.git".into(),
            remote_branch: "master".into(),
            revision: DEFAULT_REVISION.to_string(),
            local_config: repox_manifest::LocalConfig::default(),
            state: ProjectState {
                current_branch: branch.map(str::to_string),
                branches: state_branches,
                has_uncommitted_changes: false,
                has_untracked_files: false,
            },
        }
    }

    fn remote_project(path: &Path, branch: &str) -> ResolvedProject {
        ResolvedProject {
            name: "foo".into(),
            path: path.to_path_buf(),
            remote: "https://example.com/foo.git".into(),
            remote_branch: branch.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            gerrit_host: None,
            git_hooks: None,
            history_depth: 0,
        }
    }

    #[test]
    fn uncommitted_changes_skip_the_update_as_recoverable() {
        let workspace = TempDir::new().unwrap();
        let project_path = workspace.path().join("foo");
        std::fs::create_dir_all(&project_path).unwrap();
        init_project(&project_path);
        let branch = current_branch_name(&project_path);
        std::fs::write(project_path.join("README"), "dirty").unwrap();

        let mut local = local_project(&project_path, Some(&branch), HashMap::new());
        local.state.has_uncommitted_changes = true;
        let remote = remote_project(&project_path, &branch);
        let context = ctx(workspace.path());

        let outcome = update_body(&local, &remote, &context).expect("does not error");
        assert!(matches!(outcome, OpOutcome::Recoverable(_)));
    }

    #[test]
    fn ignored_project_is_skipped_without_touching_git() {
        let workspace = TempDir::new().unwrap();
        let project_path = workspace.path().join("foo");
        std::fs::create_dir_all(&project_path).unwrap();
        init_project(&project_path);
        let branch = current_branch_name(&project_path);

        let mut local = local_project(&project_path, Some(&branch), HashMap::new());
        local.local_config = repox_manifest::LocalConfig { ignore: true, ..Default::default() };
        let remote = remote_project(&project_path, &branch);
        let context = ctx(workspace.path());

        let outcome = update_body(&local, &remote, &context).expect("does not error");
        assert!(matches!(outcome, OpOutcome::Skipped));
    }

    #[test]
    fn detached_head_advances_straight_to_the_target_revision() {
        let workspace = TempDir::new().unwrap();
        let project_path = workspace.path().join("foo");
        std::fs::create_dir_all(&project_path).unwrap();
        init_project(&project_path);
        let branch = current_branch_name(&project_path);
        commit(&project_path, "README", "second", "second commit");
        let adapter = GitAdapter::at(&project_path);
        let target = adapter.current_revision().unwrap();
        adapter.checkout(&target, CheckoutOptions { detach: true, force: false }).unwrap();

        let local = local_project(&project_path, None, HashMap::new());
        let mut remote = remote_project(&project_path, &branch);
        remote.revision = target.clone();
        let context = ctx(workspace.path());

        let outcome = update_body(&local, &remote, &context).expect("does not error");
        assert!(matches!(outcome, OpOutcome::Success));
        assert_eq!(adapter.current_revision().unwrap(), target);

        let head = crate::metadata::read_jiri_head(&project_path);
        assert_eq!(head.as_deref(), Some(target.as_str()));
    }

    #[test]
    fn untracked_branch_behind_target_without_rebase_flag_warns_but_succeeds() {
        let workspace = TempDir::new().unwrap();
        let project_path = workspace.path().join("foo");
        std::fs::create_dir_all(&project_path).unwrap();
        init_project(&project_path);
        let branch = current_branch_name(&project_path);
        let adapter = GitAdapter::at(&project_path);
        let base = adapter.current_revision().unwrap();
        commit(&project_path, "README", "second", "second commit");
        let tip = adapter.current_revision().unwrap();
        adapter.checkout(&base, CheckoutOptions { detach: false, force: false }).unwrap();
        adapter.create_branch("side").unwrap();
        adapter.checkout(&branch, CheckoutOptions { detach: false, force: false }).unwrap();

        let mut branches = HashMap::new();
        branches.insert(branch.clone(), BranchState { revision: tip.clone(), tracking_branch: None, tracking_revision: None });
        branches.insert("side".to_string(), BranchState { revision: base.clone(), tracking_branch: None, tracking_revision: None });
        let local = local_project(&project_path, Some(&branch), branches);
        let mut remote = remote_project(&project_path, &branch);
        remote.revision = tip.clone();
        let context = ctx(workspace.path());

        let outcome = update_body(&local, &remote, &context).expect("does not error");
        match outcome {
            OpOutcome::Recoverable(msg) => assert!(msg.contains("side"), "warning should mention the untracked branch: {msg}"),
            other => panic!("expected a recoverable warning, got {other:?}"),
        }
        assert_eq!(current_branch_name(&project_path), branch, "an unflagged run must not switch branches");
    }

    #[test]
    fn untracked_branch_behind_target_with_rebase_flag_is_fast_forwarded() {
        let workspace = TempDir::new().unwrap();
        let project_path = workspace.path().join("foo");
        std::fs::create_dir_all(&project_path).unwrap();
        init_project(&project_path);
        let branch = current_branch_name(&project_path);
        let adapter = GitAdapter::at(&project_path);
        let base = adapter.current_revision().unwrap();
        commit(&project_path, "README", "second", "second commit");
        let tip = adapter.current_revision().unwrap();
        adapter.checkout(&base, CheckoutOptions { detach: false, force: false }).unwrap();
        adapter.create_branch("side").unwrap();
        adapter.checkout(&branch, CheckoutOptions { detach: false, force: false }).unwrap();

        let mut branches = HashMap::new();
        branches.insert(branch.clone(), BranchState { revision: tip.clone(), tracking_branch: None, tracking_revision: None });
        branches.insert("side".to_string(), BranchState { revision: base.clone(), tracking_branch: None, tracking_revision: None });
        let local = local_project(&project_path, Some(&branch), branches);
        let mut remote = remote_project(&project_path, &branch);
        remote.revision = tip.clone();
        let mut context = ctx(workspace.path());
        context.flags.rebase_all = true;
        context.flags.rebase_untracked = true;

        let outcome = update_body(&local, &remote, &context).expect("does not error");
        assert!(matches!(outcome, OpOutcome::Success));
        assert_eq!(current_branch_name(&project_path), branch, "the restore guard should leave the original branch checked out");

        adapter.checkout("side", CheckoutOptions { detach: false, force: false }).unwrap();
        assert_eq!(adapter.current_revision().unwrap(), tip, "side should have been rebased onto the target");
    }
}
