//! C8 Hook Runner: runs post-update hooks in parallel, one worker per hook
//! (spec.md §4.8/§5 "hooks use a pool of workers equal to the hook count"),
//! each under its own deadline and retried with the shared backoff policy
//! unless it timed out.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::NamedTempFile;
use thiserror::Error;
use wait_timeout::ChildExt;

use crate::retry::{self, RetryableError};

#[derive(Debug, Error)]
pub enum HookAttemptError {
    #[error("failed to spawn `{action}` in {action_path}")]
    Spawn {
        action: String,
        action_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{action}` timed out after {timeout_minutes}m")]
    Timeout { action: String, timeout_minutes: u32 },

    #[error("`{action}` exited with status {status}; stdout at {stdout_path}, stderr at {stderr_path}")]
    NonZeroExit {
        action: String,
        status: String,
        stdout_path: PathBuf,
        stderr_path: PathBuf,
    },

    #[error("failed to capture output of `{action}`")]
    Capture {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

impl RetryableError for HookAttemptError {
    /// A timeout is a deadline the caller explicitly set; retrying it would
    /// just burn another full deadline for no reason (spec.md §4.8 "Deadline
    /// expiry is reported as a timeout error distinct from normal non-zero
    /// exit"). A non-zero exit might be a transient flake, so it retries.
    fn is_retryable(&self) -> bool {
        !matches!(self, HookAttemptError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum HooksError {
    #[error("hook {name} ({project_name}) failed: {source}")]
    HookFailed {
        name: String,
        project_name: String,
        #[source]
        source: HookAttemptError,
    },

    #[error("one or more hooks failed; see the log above")]
    HooksExecutionFailed,
}

/// One hook run, resolved and ready to spawn: grounded in
/// [`crate::loader::ResolvedHook`], but flattened to avoid a dependency
/// from this module back onto the loader's error type.
pub struct HookJob {
    pub name: String,
    pub project_name: String,
    pub action: String,
    pub action_path: PathBuf,
}

/// Runs every job in `jobs` concurrently, one OS thread per hook, each
/// retried under [`crate::retry::with_retry`] and bounded by `timeout`.
/// Returns once every hook has been awaited; a single hook's failure does
/// not stop the others from running (spec.md §4.8 "the whole hook pass
/// fails ... but after all hooks have been awaited").
pub fn run_hooks(jobs: Vec<HookJob>, timeout: Duration, timeout_minutes: u32) -> Result<(), HooksError> {
    if jobs.is_empty() {
        return Ok(());
    }

    let results: Vec<Result<(), HooksError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|job| scope.spawn(|| run_one(job, timeout, timeout_minutes)))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap_or(Err(HooksError::HooksExecutionFailed))).collect()
    });

    let mut any_failed = false;
    for result in results {
        if let Err(err) = result {
            tracing::error!(%err, "hook failed");
            any_failed = true;
        }
    }

    if any_failed {
        Err(HooksError::HooksExecutionFailed)
    } else {
        Ok(())
    }
}

fn run_one(job: &HookJob, timeout: Duration, timeout_minutes: u32) -> Result<(), HooksError> {
    retry::with_retry(&job.name, || attempt(job, timeout, timeout_minutes)).map_err(|source| HooksError::HookFailed {
        name: job.name.clone(),
        project_name: job.project_name.clone(),
        source,
    })
}

fn attempt(job: &HookJob, timeout: Duration, timeout_minutes: u32) -> Result<(), HookAttemptError> {
    let mut stdout_file = NamedTempFile::new().map_err(|source| HookAttemptError::Capture { action: job.action.clone(), source })?;
    let mut stderr_file = NamedTempFile::new().map_err(|source| HookAttemptError::Capture { action: job.action.clone(), source })?;

    let mut child = Command::new(job.action_path.join(&job.action))
        .current_dir(&job.action_path)
        .stdout(stdout_file.reopen().map_err(|source| HookAttemptError::Capture { action: job.action.clone(), source })?)
        .stderr(stderr_file.reopen().map_err(|source| HookAttemptError::Capture { action: job.action.clone(), source })?)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| HookAttemptError::Spawn {
            action: job.action.clone(),
            action_path: job.action_path.clone(),
            source,
        })?;

    let status = match child.wait_timeout(timeout).map_err(|source| HookAttemptError::Capture { action: job.action.clone(), source })? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(HookAttemptError::Timeout { action: job.action.clone(), timeout_minutes });
        }
    };

    if status.success() {
        return Ok(());
    }

    let (stdout_path, stderr_path) = (stdout_file.path().to_path_buf(), stderr_file.path().to_path_buf());
    let mut stdout_tail = String::new();
    let mut stderr_tail = String::new();
    let _ = stdout_file.read_to_string(&mut stdout_tail);
    let _ = stderr_file.read_to_string(&mut stderr_tail);
    if !stdout_tail.is_empty() {
        tracing::warn!(action = %job.action, stdout = %stdout_tail, "hook stdout");
    }
    if !stderr_tail.is_empty() {
        tracing::warn!(action = %job.action, stderr = %stderr_tail, "hook stderr");
    }

    Err(HookAttemptError::NonZeroExit {
        action: job.action.clone(),
        status: status.code().map(|c| c.to_string()).unwrap_or_else(|| "signalled".into()),
        stdout_path,
        stderr_path,
    })
}
