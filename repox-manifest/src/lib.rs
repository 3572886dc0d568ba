//! In-memory model of a `repox` manifest: imports, projects, overrides,
//! hooks, packages, plus the small sidecar formats (`LocalConfig`,
//! per-project metadata, lockfiles) that live next to a manifest on disk.
//!
//! This crate owns parsing and serialization (spec.md §4.2 "Manifest
//! Model"); resolving a manifest's imports into a full project set is the
//! Manifest Loader's job, one layer up in the `repox` crate.

pub mod error;
pub mod hook;
pub mod import;
pub mod local_config;
pub mod lockfile;
mod manifest;
pub mod package;
pub mod project;
mod workspace_config;
mod write;

pub use error::{project_key, ManifestError, KEY_SEPARATOR};
pub use hook::Hook;
pub use import::{Import, LocalImport};
pub use local_config::LocalConfig;
pub use lockfile::{LockFile, PackageLock, ProjectLock};
pub use manifest::{Manifest, Override};
pub use package::Package;
pub use project::{Project, ProjectRecord, DEFAULT_REMOTE_BRANCH, DEFAULT_REVISION};
pub use workspace_config::WorkspaceConfig;
pub use write::project_to_xml_string;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_sample_manifest() {
        let manifest_contents = include_str!("../samples/sample.xml");
        let parsed = Manifest::parse(manifest_contents).unwrap();
        error::validate(&parsed).unwrap();

        let projects = parsed.projects();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "foo");
        assert_eq!(projects[0].effective_path(), "src/foo");
        assert_eq!(projects[1].name, "bar");
        assert_eq!(projects[1].effective_path(), "bar");
        assert!(projects[1].has_pinned_revision());

        assert_eq!(parsed.imports().len(), 1);
        assert_eq!(parsed.hooks().len(), 1);
    }
}
