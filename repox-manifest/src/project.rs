use serde::{Deserialize, Serialize};

/// Default value of [`Project::remote_branch`] when the manifest omits it.
pub const DEFAULT_REMOTE_BRANCH: &str = "master";

/// Default value of [`Project::revision`] when the manifest omits it.
pub const DEFAULT_REVISION: &str = "HEAD";

/// A single Git repository the workspace should contain.
///
/// Mirrors the `<project>` element: attributes present here are exactly the
/// ones a manifest author may set. `path` and `remote_branch`/`revision`
/// default to `name` and `"master"`/`"HEAD"` respectively when absent, which
/// callers resolve with [`Project::effective_path`] and friends rather than
/// matching on `None` everywhere.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename = "project")]
pub struct Project {
    #[serde(rename = "@name")]
    pub name: String,

    /// Workspace-relative directory. Defaults to `name` when unset.
    #[serde(rename = "@path")]
    pub path: Option<String>,

    /// Git remote URL.
    #[serde(rename = "@remote")]
    pub remote: String,

    /// Branch this project tracks for rebase/upstream purposes.
    #[serde(rename = "@remote-branch")]
    pub remote_branch: Option<String>,

    /// Commit-ish to advance the project to. `"HEAD"` (the default) means
    /// "whatever `origin/<remote_branch>` resolves to".
    #[serde(rename = "@revision")]
    pub revision: Option<String>,

    #[serde(rename = "@gerrit-host")]
    pub gerrit_host: Option<String>,

    /// Directory (relative to the project) containing Git hook scripts to
    /// install. Installation itself is an external collaborator; this crate
    /// only threads the value through.
    #[serde(rename = "@git-hooks")]
    pub git_hooks: Option<String>,

    /// Shallow-clone depth. `0` (the default) means full history.
    #[serde(rename = "@history-depth")]
    pub history_depth: Option<u32>,
}

impl Project {
    pub fn effective_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    pub fn effective_remote_branch(&self) -> &str {
        self.remote_branch.as_deref().unwrap_or(DEFAULT_REMOTE_BRANCH)
    }

    pub fn effective_revision(&self) -> &str {
        self.revision.as_deref().unwrap_or(DEFAULT_REVISION)
    }

    pub fn effective_history_depth(&self) -> u32 {
        self.history_depth.unwrap_or(0)
    }

    /// `true` when `revision` is set to something other than the default
    /// `"HEAD"` marker — i.e. a concrete commit-ish the loader must honor.
    pub fn has_pinned_revision(&self) -> bool {
        matches!(&self.revision, Some(r) if r != DEFAULT_REVISION)
    }
}

/// Serializable form used for both manifest `<project>` elements and the
/// persisted `metadata.v2` sidecar file. Writing is hand-rolled (see
/// [`crate::write`]) so that defaults are elided and paths can be
/// relativized before they hit disk; this type only carries the data.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRecord {
    pub name: String,
    pub path: String,
    pub remote: String,
    pub remote_branch: String,
    pub revision: String,
    pub gerrit_host: Option<String>,
    pub git_hooks: Option<String>,
    pub history_depth: u32,
}

impl From<&Project> for ProjectRecord {
    fn from(p: &Project) -> Self {
        ProjectRecord {
            name: p.name.clone(),
            path: p.effective_path().to_string(),
            remote: p.remote.clone(),
            remote_branch: p.effective_remote_branch().to_string(),
            revision: p.effective_revision().to_string(),
            gerrit_host: p.gerrit_host.clone(),
            git_hooks: p.git_hooks.clone(),
            history_depth: p.effective_history_depth(),
        }
    }
}
