//! C1 Git Adapter: a thin typed wrapper over the `git` binary.
//!
//! Every operation shells out (grounded in `nn1a-gbsw`'s
//! `GitCommandRunner`/`DefaultGitCommandRunner` split, a full example repo
//! in the retrieval pack) rather than going through a Git library, because
//! spec.md §4.1 needs rebase, tracking-branch introspection, and branch
//! enumeration the way the `git` CLI exposes them. Network operations
//! (`clone`, `fetch`) are wrapped in [`crate::retry::with_retry`]; everything
//! else runs once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;

use crate::retry::{self, RetryableError};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn `git {args}` in {dir}")]
    Spawn {
        dir: PathBuf,
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {args}` failed in {dir}: {stderr}")]
    CommandFailed { dir: PathBuf, args: String, stderr: String },

    #[error("`git {args}` produced output that was not valid UTF-8")]
    InvalidUtf8 { args: String },
}

impl RetryableError for GitError {}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub no_checkout: bool,
    pub reference_repo: Option<PathBuf>,
    pub shared: bool,
    pub depth: u32,
    pub filter_blobs: bool,
    pub mirror: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub all: bool,
    pub prune: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutOptions {
    pub detach: bool,
    pub force: bool,
}

/// One local branch's tip and (if any) the upstream it tracks, as read from
/// `branch_info_all` (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub revision: String,
    pub tracking_branch: Option<String>,
    pub tracking_revision: Option<String>,
}

/// Bound to one working tree (or bare repository). `clone`/`init` are the
/// only associated functions that don't already have a directory to bind
/// to; everything else is a method on an adapter already rooted somewhere.
#[derive(Debug, Clone)]
pub struct GitAdapter {
    dir: PathBuf,
}

impl GitAdapter {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        GitAdapter { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn init(dir: &Path) -> Result<GitAdapter, GitError> {
        std::fs::create_dir_all(dir).map_err(|source| GitError::Spawn {
            dir: dir.to_path_buf(),
            args: "init".into(),
            source,
        })?;
        run(dir, &["init", "--quiet"])?;
        Ok(GitAdapter::at(dir))
    }

    pub fn clone(url: &str, dest: &Path, opts: &CloneOptions) -> Result<GitAdapter, GitError> {
        retry::with_retry("clone", || {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|source| GitError::Spawn {
                    dir: parent.to_path_buf(),
                    args: "mkdir -p".into(),
                    source,
                })?;
            }
            let mut args: Vec<String> = vec!["clone".into(), "--quiet".into()];
            if opts.no_checkout {
                args.push("--no-checkout".into());
            }
            if opts.mirror {
                args.push("--mirror".into());
            }
            if opts.shared {
                if let Some(reference) = &opts.reference_repo {
                    args.push("--shared".into());
                    args.push("--reference".into());
                    args.push(reference.display().to_string());
                }
            } else if let Some(reference) = &opts.reference_repo {
                args.push("--reference".into());
                args.push(reference.display().to_string());
            }
            if opts.depth > 0 {
                args.push("--depth".into());
                args.push(opts.depth.to_string());
            }
            if opts.filter_blobs {
                args.push("--filter=blob:none".into());
            }
            args.push(url.to_string());
            args.push(dest.display().to_string());

            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            let cwd = dest.parent().unwrap_or(Path::new("."));
            run(cwd, &arg_refs)?;
            Ok(())
        })?;
        Ok(GitAdapter::at(dest))
    }

    pub fn fetch(&self, remote: &str, opts: &FetchOptions) -> Result<(), GitError> {
        retry::with_retry("fetch", || {
            let mut args = vec!["fetch", "--quiet"];
            if opts.all {
                args.push("--all");
            } else {
                args.push(remote);
            }
            if opts.prune {
                args.push("--prune");
            }
            run(&self.dir, &args)?;
            Ok(())
        })
    }

    /// Reads `file` as it existed at `rev`, without touching the worktree
    /// (`git show rev:file`).
    pub fn show(&self, rev: &str, file: &str) -> Result<String, GitError> {
        let spec = format!("{rev}:{file}");
        run(&self.dir, &["show", &spec])
    }

    pub fn current_revision(&self) -> Result<String, GitError> {
        Ok(run(&self.dir, &["rev-parse", "HEAD"])?.trim().to_string())
    }

    pub fn current_revision_for_ref(&self, reference: &str) -> Result<String, GitError> {
        Ok(run(&self.dir, &["rev-parse", reference])?.trim().to_string())
    }

    /// Returns `(all local branches, current branch)`. `current` is `None`
    /// when the worktree is in detached-head state (spec.md §3 "empty
    /// string = detached head"; represented here as `None`).
    pub fn get_branches(&self) -> Result<(Vec<String>, Option<String>), GitError> {
        let list = run(&self.dir, &["branch", "--format=%(refname:short)"])?;
        let branches: Vec<String> = list.lines().map(str::to_string).collect();
        let current = run(&self.dir, &["symbolic-ref", "--short", "-q", "HEAD"])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok((branches, current))
    }

    /// One entry per local branch: its tip and (if it has one) the
    /// upstream branch name and tip (spec.md §4.1 `branch_info_all`).
    pub fn branch_info_all(&self) -> Result<HashMap<String, BranchInfo>, GitError> {
        let format = "%(refname:short)%09%(objectname)%09%(upstream:short)%09%(upstream:track)";
        let out = run(&self.dir, &["for-each-ref", "refs/heads", &format!("--format={format}")])?;
        let mut map = HashMap::new();
        for line in out.lines() {
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default().to_string();
            let revision = fields.next().unwrap_or_default().to_string();
            let upstream = fields.next().unwrap_or_default().to_string();
            if name.is_empty() {
                continue;
            }
            let tracking_revision = if upstream.is_empty() {
                None
            } else {
                self.current_revision_for_ref(&upstream).ok()
            };
            map.insert(
                name,
                BranchInfo {
                    revision,
                    tracking_branch: if upstream.is_empty() { None } else { Some(upstream) },
                    tracking_revision,
                },
            );
        }
        Ok(map)
    }

    pub fn list_branches_containing(&self, rev: &str) -> Result<Vec<String>, GitError> {
        let out = run(&self.dir, &["branch", "--contains", rev, "--format=%(refname:short)"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn list_remote_branches_containing(&self, rev: &str) -> Result<Vec<String>, GitError> {
        let out = run(&self.dir, &["branch", "-r", "--contains", rev, "--format=%(refname:short)"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn checkout(&self, reference: &str, opts: CheckoutOptions) -> Result<(), GitError> {
        let mut args = vec!["checkout", "--quiet"];
        if opts.detach {
            args.push("--detach");
        }
        if opts.force {
            args.push("--force");
        }
        args.push(reference);
        run(&self.dir, &args)?;
        Ok(())
    }

    pub fn rebase(&self, onto: &str) -> Result<(), GitError> {
        run(&self.dir, &["rebase", onto])?;
        Ok(())
    }

    pub fn rebase_abort(&self) -> Result<(), GitError> {
        run(&self.dir, &["rebase", "--abort"])?;
        Ok(())
    }

    pub fn create_branch(&self, name: &str) -> Result<(), GitError> {
        run(&self.dir, &["branch", name])?;
        Ok(())
    }

    pub fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        run(&self.dir, &["branch", flag, name])?;
        Ok(())
    }

    pub fn set_remote_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        run(&self.dir, &["remote", "set-url", name, url])?;
        Ok(())
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        run(&self.dir, &["remote", "add", name, url])?;
        Ok(())
    }

    pub fn remove_remote(&self, name: &str) -> Result<(), GitError> {
        run(&self.dir, &["remote", "remove", name])?;
        Ok(())
    }

    pub fn config(&self, key: &str, value: &str) -> Result<(), GitError> {
        run(&self.dir, &["config", key, value])?;
        Ok(())
    }

    pub fn has_uncommitted_changes(&self) -> Result<bool, GitError> {
        let out = run(&self.dir, &["status", "--porcelain"])?;
        Ok(out.lines().any(|l| !l.starts_with("??")))
    }

    pub fn has_untracked_files(&self) -> Result<bool, GitError> {
        let out = run(&self.dir, &["status", "--porcelain"])?;
        Ok(out.lines().any(|l| l.starts_with("??")))
    }

    pub fn remove_untracked_files(&self) -> Result<(), GitError> {
        run(&self.dir, &["clean", "-fd"])?;
        Ok(())
    }
}


fn run(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let output: Output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map_err(|source| GitError::Spawn {
            dir: dir.to_path_buf(),
            args: args.join(" "),
            source,
        })?;

    if !output.status.success() {
        return Err(GitError::CommandFailed {
            dir: dir.to_path_buf(),
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|_| GitError::InvalidUtf8 { args: args.join(" ") })
}
