use serde::Deserialize;

use crate::hook::Hook;
use crate::import::{Import, LocalImport};
use crate::package::Package;
use crate::project::Project;

/// An `<override>`-permitted project declaration. Same shape as
/// [`Project`] (spec.md §3): it overlays the matching project by key and is
/// only legal in the root manifest.
pub type Override = Project;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Imports {
    #[serde(rename = "import", default)]
    pub import: Vec<Import>,
    #[serde(rename = "localimport", default)]
    pub localimport: Vec<LocalImport>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Projects {
    #[serde(rename = "project", default)]
    pub project: Vec<Project>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Overrides {
    #[serde(rename = "project", default)]
    pub project: Vec<Override>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Hooks {
    #[serde(rename = "hook", default)]
    pub hook: Vec<Hook>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Packages {
    #[serde(rename = "package", default)]
    pub package: Vec<Package>,
}

/// The in-memory form of one manifest file (spec.md §3 `Manifest`, §6
/// "Manifest file (XML)"). A `Manifest` value is exactly one `<manifest>`
/// document; recursively resolving its imports into a full project set is
/// the Manifest Loader's job (`repox::loader`), not this crate's.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "manifest")]
pub struct Manifest {
    #[serde(rename = "@version")]
    pub version: Option<String>,

    pub(crate) imports: Option<Imports>,
    pub(crate) projects: Option<Projects>,
    pub(crate) overrides: Option<Overrides>,
    pub(crate) hooks: Option<Hooks>,
    pub(crate) packages: Option<Packages>,
}

impl Manifest {
    pub fn parse(xml: &str) -> Result<Manifest, crate::error::ManifestError> {
        quick_xml::de::from_str(xml).map_err(crate::error::ManifestError::Malformed)
    }

    pub fn imports(&self) -> &[Import] {
        self.imports.as_ref().map(|i| i.import.as_slice()).unwrap_or_default()
    }

    pub fn local_imports(&self) -> &[LocalImport] {
        self.imports.as_ref().map(|i| i.localimport.as_slice()).unwrap_or_default()
    }

    pub fn projects(&self) -> &[Project] {
        self.projects.as_ref().map(|p| p.project.as_slice()).unwrap_or_default()
    }

    pub fn overrides(&self) -> &[Override] {
        self.overrides.as_ref().map(|o| o.project.as_slice()).unwrap_or_default()
    }

    pub fn hooks(&self) -> &[Hook] {
        self.hooks.as_ref().map(|h| h.hook.as_slice()).unwrap_or_default()
    }

    pub fn packages(&self) -> &[Package] {
        self.packages.as_ref().map(|p| p.package.as_slice()).unwrap_or_default()
    }

    /// Appends an `<import>` entry, used by the `import` command to add a
    /// new import to the root manifest in place (spec.md §6 "import").
    pub fn push_import(&mut self, import: Import) {
        self.imports.get_or_insert_with(Imports::default).import.push(import);
    }

    /// Builds a manifest consisting only of the given projects, with no
    /// imports/overrides/hooks/packages — the shape `jiri snapshot` writes
    /// (spec.md §6 "snapshot": "a snapshot manifest pinning current
    /// revisions").
    pub fn from_projects(projects: Vec<Project>) -> Manifest {
        Manifest {
            version: None,
            imports: None,
            projects: Some(Projects { project: projects }),
            overrides: None,
            hooks: None,
            packages: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_projects_and_imports() {
        let xml = r#"
            <manifest>
              <imports>
                <import name="third_party" remote="https://example.com/third_party" manifest="manifest/default"/>
                <localimport file="local.xml"/>
              </imports>
              <projects>
                <project name="foo" path="src/foo" remote="https://example.com/foo"/>
              </projects>
            </manifest>
        "#;
        let manifest = Manifest::parse(xml).unwrap();
        assert_eq!(manifest.projects().len(), 1);
        assert_eq!(manifest.projects()[0].name, "foo");
        assert_eq!(manifest.imports().len(), 1);
        assert_eq!(manifest.imports()[0].manifest_file(), "manifest/default");
        assert_eq!(manifest.local_imports().len(), 1);
        assert_eq!(manifest.local_imports()[0].file, "local.xml");
    }

    #[test]
    fn defaults_apply_when_attributes_absent() {
        let xml = r#"<manifest><projects>
            <project name="bar" remote="https://example.com/bar"/>
        </projects></manifest>"#;
        let manifest = Manifest::parse(xml).unwrap();
        let p = &manifest.projects()[0];
        assert_eq!(p.effective_path(), "bar");
        assert_eq!(p.effective_remote_branch(), "master");
        assert_eq!(p.effective_revision(), "HEAD");
        assert_eq!(p.effective_history_depth(), 0);
        assert!(!p.has_pinned_revision());
    }
}
