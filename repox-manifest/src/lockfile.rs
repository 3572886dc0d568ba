use serde::Deserialize;

use crate::error::ManifestError;

/// One locked project revision (spec.md §4.5 "Lockfile enforcement").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectLock {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@remote")]
    pub remote: String,
    #[serde(rename = "@revision")]
    pub revision: String,
}

/// One locked package×platform instance id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageLock {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@platform")]
    pub platform: Option<String>,
    #[serde(rename = "@instance-id")]
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProjectLocks {
    #[serde(rename = "project", default)]
    pub project: Vec<ProjectLock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct PackageLocks {
    #[serde(rename = "package", default)]
    pub package: Vec<PackageLock>,
}

/// A manifest's lockfile sibling: concrete revisions/instance ids pinned
/// out-of-band from the manifest itself (spec.md §4.5).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "lockfile")]
pub struct LockFile {
    pub(crate) projects: Option<ProjectLocks>,
    pub(crate) packages: Option<PackageLocks>,
}

impl LockFile {
    pub fn parse(xml: &str) -> Result<LockFile, ManifestError> {
        quick_xml::de::from_str(xml).map_err(ManifestError::Malformed)
    }

    pub fn project_locks(&self) -> &[ProjectLock] {
        self.projects.as_ref().map(|p| p.project.as_slice()).unwrap_or_default()
    }

    pub fn package_locks(&self) -> &[PackageLock] {
        self.packages.as_ref().map(|p| p.package.as_slice()).unwrap_or_default()
    }
}
