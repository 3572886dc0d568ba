use serde::Deserialize;

/// A post-update hook, scoped to one project.
///
/// `action_path` is not part of the manifest schema: it's filled in by the
/// loader once the hook's `project` attribute has been resolved to that
/// project's on-disk directory (spec.md step "Validate each hook").
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hook {
    #[serde(rename = "@name")]
    pub name: String,

    /// Script name, relative to the owning project's directory.
    #[serde(rename = "@action")]
    pub action: String,

    #[serde(rename = "@project")]
    pub project_name: String,
}
