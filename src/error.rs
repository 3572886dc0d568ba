//! Top-level CLI error type. Aggregates every component error via `#[from]`
//! and implements [`miette::Diagnostic`] with a `repox::<component>::<case>`
//! code on each variant, the way the teacher's `InitError` does (spec.md
//! §7 "Error kinds").

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::cache::CacheError;
use crate::executor::ExecutorError;
use crate::git::GitError;
use crate::hooks::HooksError;
use crate::loader::LoaderError;
use crate::scan::ScanError;
use crate::workspace::WorkspaceError;
use repox_manifest::ManifestError;

#[derive(Debug, Error, Diagnostic)]
pub enum RepoxError {
    #[error(transparent)]
    #[diagnostic(code(repox::workspace))]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(code(repox::loader))]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    #[diagnostic(code(repox::scan))]
    Scan(#[from] ScanError),

    #[error(transparent)]
    #[diagnostic(code(repox::executor))]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    #[diagnostic(code(repox::hooks))]
    Hooks(#[from] HooksError),

    #[error(transparent)]
    #[diagnostic(code(repox::git))]
    Git(#[from] GitError),

    #[error(transparent)]
    #[diagnostic(code(repox::cache))]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(code(repox::manifest))]
    Manifest(#[from] ManifestError),

    #[error("at least one project failed to update; see the log above for which ones")]
    #[diagnostic(code(repox::recoverable_failures), help("re-run `repox update` after resolving the issues logged for each project"))]
    RecoverableFailures { count: u32 },

    #[error("failed to read {path}")]
    #[diagnostic(code(repox::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exit code mapping (spec.md §6): `0` success, `1` usage/fatal error, `2`
/// at least one recoverable per-project failure.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_USAGE_OR_FATAL: i32 = 1;
pub const EXIT_RECOVERABLE_FAILURES: i32 = 2;
