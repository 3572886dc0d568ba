//! Path conventions and read/write helpers for the three per-project
//! sidecar files spec.md §6 defines: local config, metadata, and the
//! `JIRI_HEAD` marker.

use std::fs;
use std::path::{Path, PathBuf};

use repox_manifest::{project_to_xml_string, LocalConfig, Project};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed metadata at {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
}

pub fn jiri_dir(project_path: &Path) -> PathBuf {
    project_path.join(".git").join("jiri")
}

pub fn metadata_path(project_path: &Path) -> PathBuf {
    jiri_dir(project_path).join("metadata.v2")
}

pub fn local_config_path(project_path: &Path) -> PathBuf {
    jiri_dir(project_path).join("config")
}

pub fn jiri_head_path(project_path: &Path) -> PathBuf {
    project_path.join(".git").join("JIRI_HEAD")
}

pub fn read_metadata(project_path: &Path) -> Result<Option<Project>, MetadataError> {
    let path = metadata_path(project_path);
    if !path.exists() {
        return Ok(None);
    }
    let xml = fs::read_to_string(&path).map_err(|source| MetadataError::Read { path: path.clone(), source })?;
    let project = quick_xml::de::from_str(&xml).map_err(|source| MetadataError::Malformed { path, source })?;
    Ok(Some(project))
}

pub fn write_metadata(project_path: &Path, project: &Project) -> Result<(), MetadataError> {
    let dir = jiri_dir(project_path);
    fs::create_dir_all(&dir).map_err(|source| MetadataError::Write { path: dir.clone(), source })?;
    let path = metadata_path(project_path);
    let xml = project_to_xml_string(project);
    fs::write(&path, xml).map_err(|source| MetadataError::Write { path, source })
}

pub fn read_local_config(project_path: &Path) -> Result<LocalConfig, MetadataError> {
    let path = local_config_path(project_path);
    if !path.exists() {
        return Ok(LocalConfig::default());
    }
    let xml = fs::read_to_string(&path).map_err(|source| MetadataError::Read { path: path.clone(), source })?;
    quick_xml::de::from_str(&xml).map_err(|source| MetadataError::Malformed { path, source })
}

pub fn write_local_config(project_path: &Path, config: &LocalConfig) -> Result<(), MetadataError> {
    let dir = jiri_dir(project_path);
    fs::create_dir_all(&dir).map_err(|source| MetadataError::Write { path: dir.clone(), source })?;
    let path = local_config_path(project_path);
    fs::write(&path, config.to_xml_string()).map_err(|source| MetadataError::Write { path, source })
}

pub fn read_jiri_head(project_path: &Path) -> Option<String> {
    fs::read_to_string(jiri_head_path(project_path))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn write_jiri_head(project_path: &Path, revision: &str) -> Result<(), MetadataError> {
    let path = jiri_head_path(project_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| MetadataError::Write { path: parent.to_path_buf(), source })?;
    }
    fs::write(&path, revision).map_err(|source| MetadataError::Write { path, source })
}
