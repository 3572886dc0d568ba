use serde::Deserialize;

/// A CIPD-style package declaration. Fetching packages is an external
/// collaborator (spec.md §1 Out of scope); this crate only carries the
/// declaration through parsing, lockfile resolution, and serialization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Package {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@version")]
    pub version: String,

    /// Comma-separated platform list (`linux-amd64,mac-arm64`, ...).
    #[serde(rename = "@platforms")]
    pub platforms: Option<String>,

    #[serde(rename = "@internal")]
    pub internal: Option<bool>,
}

impl Package {
    pub fn platform_list(&self) -> Vec<&str> {
        self.platforms
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}
