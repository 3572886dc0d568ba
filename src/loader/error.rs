use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use repox_manifest::ManifestError;

use crate::cache::CacheError;
use crate::git::GitError;

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error(transparent)]
    #[diagnostic(code(repox::loader::malformed_manifest))]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    #[diagnostic(code(repox::loader::git))]
    Git(#[from] GitError),

    #[error(transparent)]
    #[diagnostic(code(repox::loader::cache))]
    Cache(#[from] CacheError),

    #[error("failed to read manifest file {path}")]
    #[diagnostic(code(repox::loader::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "import cycle detected: {}",
        stack.join(" -> ")
    )]
    #[diagnostic(code(repox::loader::import_cycle))]
    ImportCycle { stack: Vec<String> },

    #[error("remote {remote:?} is imported at two different refs: {first_ref:?} (via {first_parent}) and {second_ref:?} (via {second_parent})")]
    #[diagnostic(code(repox::loader::conflicting_import_ref))]
    ConflictingImportRef {
        remote: String,
        first_ref: String,
        first_parent: String,
        second_ref: String,
        second_parent: String,
    },

    #[error("project {key:?} is declared twice with different attributes")]
    #[diagnostic(code(repox::loader::duplicate_project))]
    DuplicateProject { key: String },

    #[error("<overrides> may only appear in the root manifest; found one while loading {manifest_file}")]
    #[diagnostic(code(repox::loader::override_in_non_root))]
    OverrideInNonRoot { manifest_file: String },

    #[error("override for project {key:?} has no matching project to override")]
    #[diagnostic(code(repox::loader::override_missing_target))]
    OverrideMissingTarget { key: String },

    #[error("override for project {key:?} targets a project introduced by an <import>, which is not permitted")]
    #[diagnostic(code(repox::loader::override_on_imported_project))]
    OverrideOnImportedProject { key: String },

    #[error("hook {name:?} refers to unknown project {project_name:?}")]
    #[diagnostic(code(repox::loader::unresolved_hook))]
    UnresolvedHook { name: String, project_name: String },

    #[error("project {key:?} has revision {manifest_revision:?} in the manifest but is locked to {locked_revision:?}")]
    #[diagnostic(code(repox::loader::lock_conflict))]
    LockConflict {
        key: String,
        manifest_revision: String,
        locked_revision: String,
    },

    #[error("a project and a conflicting import both pin a revision for {key:?}: {project_revision:?} vs {import_revision:?}")]
    #[diagnostic(code(repox::loader::conflicting_pin))]
    ConflictingPin {
        key: String,
        project_revision: String,
        import_revision: String,
    },
}
