//! Workspace-wide persisted options, read from and written to
//! `.jiri_root/config` (spec.md §6 "Workspace metadata directory": cache
//! path, shared flag, partial-clone flags, lockfile name/enable, analytics
//! opt-in, attribute filters).

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Attributes {
    #[serde(rename = "attribute", default)]
    pub attribute: Vec<String>,
}

/// The on-disk shape of `.jiri_root/config`: a flat `<config>` element with
/// one child per setting. All string-typed fields (paths included) are
/// stored as plain text; the caller is responsible for any path
/// interpretation, matching how every other sidecar in this crate leaves
/// filesystem semantics to `repox` proper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "config", default)]
pub struct WorkspaceConfig {
    #[serde(rename = "cache-path")]
    pub cache_path: Option<String>,
    #[serde(rename = "shared-cache")]
    pub shared_cache: bool,
    #[serde(rename = "partial-clone")]
    pub partial_clone: bool,
    #[serde(rename = "partial-clone-filter")]
    pub partial_clone_filter: Option<String>,
    #[serde(rename = "lockfile-name")]
    pub lockfile_name: Option<String>,
    #[serde(rename = "enforce-lockfile")]
    pub enforce_lockfile: bool,
    #[serde(rename = "analytics-opt-in")]
    pub analytics_opt_in: bool,
    pub(crate) attributes: Option<Attributes>,
}

impl WorkspaceConfig {
    /// Builds a `WorkspaceConfig`, wrapping `attributes` into its on-disk
    /// `<attributes>` container form (empty becomes an absent element,
    /// matching every other optional container in this crate).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache_path: Option<String>,
        shared_cache: bool,
        partial_clone: bool,
        partial_clone_filter: Option<String>,
        lockfile_name: Option<String>,
        enforce_lockfile: bool,
        analytics_opt_in: bool,
        attributes: Vec<String>,
    ) -> WorkspaceConfig {
        WorkspaceConfig {
            cache_path,
            shared_cache,
            partial_clone,
            partial_clone_filter,
            lockfile_name,
            enforce_lockfile,
            analytics_opt_in,
            attributes: if attributes.is_empty() { None } else { Some(Attributes { attribute: attributes }) },
        }
    }

    pub fn parse(xml: &str) -> Result<WorkspaceConfig, crate::error::ManifestError> {
        quick_xml::de::from_str(xml).map_err(crate::error::ManifestError::Malformed)
    }

    pub fn attributes(&self) -> &[String] {
        self.attributes.as_ref().map(|a| a.attribute.as_slice()).unwrap_or_default()
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            cache_path: None,
            shared_cache: false,
            partial_clone: false,
            partial_clone_filter: None,
            lockfile_name: Some("jiri.lock".to_string()),
            enforce_lockfile: false,
            analytics_opt_in: false,
            attributes: None,
        }
    }
}
