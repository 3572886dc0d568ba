use serde::Deserialize;

/// A reference to another manifest, local (`<localimport>`) or fetched from
/// a Git remote (`<import>`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Import {
    /// Path of the manifest file within the imported repository, relative
    /// to that repository's root.
    #[serde(rename = "@manifest")]
    pub manifest: Option<String>,

    #[serde(rename = "@name")]
    pub name: String,

    #[serde(rename = "@remote")]
    pub remote: String,

    #[serde(rename = "@revision")]
    pub revision: Option<String>,

    #[serde(rename = "@remote-branch")]
    pub remote_branch: Option<String>,

    /// Path prefix prepended to the name and path of everything imported
    /// transitively through this entry.
    #[serde(rename = "@root")]
    pub root: Option<String>,
}

impl Import {
    pub fn manifest_file(&self) -> &str {
        self.manifest.as_deref().unwrap_or("default.xml")
    }
}

/// A reference to a manifest on the local filesystem, relative to the
/// including manifest file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocalImport {
    #[serde(rename = "@file")]
    pub file: String,
}
