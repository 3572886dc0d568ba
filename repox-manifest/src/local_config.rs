use serde::Deserialize;

/// Per-project persisted policy, read from `<project>/.git/jiri/config`.
///
/// See spec.md §3 `LocalConfig`: `ignore` makes a project fully opaque to
/// the reconciler; `no_update` blocks fetch/checkout/rebase but still
/// forbids move/delete; `no_rebase` allows fetch/advance but never rebases
/// local branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename = "config")]
pub struct LocalConfig {
    #[serde(default)]
    pub ignore: bool,
    #[serde(rename = "no-update", default)]
    pub no_update: bool,
    #[serde(rename = "no-rebase", default)]
    pub no_rebase: bool,
}

impl LocalConfig {
    /// No fetch, update, move, rebase, or delete may touch this project.
    pub fn is_opaque(&self) -> bool {
        self.ignore
    }

    /// No fetch, checkout, or rebase — but move/delete are still forbidden
    /// by the executor regardless of this flag.
    pub fn blocks_update(&self) -> bool {
        self.ignore || self.no_update
    }

    pub fn blocks_rebase(&self) -> bool {
        self.ignore || self.no_update || self.no_rebase
    }
}
