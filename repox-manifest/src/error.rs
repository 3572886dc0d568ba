use thiserror::Error;

/// Character forbidden inside a project `name`, reserved to join `name` and
/// `remote` into a project key (spec.md §3 `Project.computed_key`).
pub const KEY_SEPARATOR: char = '\u{0}';

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not well-formed XML")]
    Malformed(#[source] quick_xml::DeError),

    #[error("invalid field: {0}")]
    InvalidField(String),
}

/// Validates the structural invariants spec.md §4.2 requires at parse time:
/// a non-empty `project.remote`, a non-empty `localimport.file`, an import
/// carrying at least one of `manifest`/`remote`, and no forbidden separator
/// inside any project or import name.
pub fn validate(manifest: &crate::Manifest) -> Result<(), ManifestError> {
    for project in manifest.projects() {
        if project.remote.trim().is_empty() {
            return Err(ManifestError::InvalidField(format!(
                "project {:?} has an empty remote",
                project.name
            )));
        }
        check_name(&project.name)?;
    }
    for ovr in manifest.overrides() {
        check_name(&ovr.name)?;
    }
    for imp in manifest.local_imports() {
        if imp.file.trim().is_empty() {
            return Err(ManifestError::InvalidField(
                "localimport has an empty file attribute".into(),
            ));
        }
    }
    for imp in manifest.imports() {
        check_name(&imp.name)?;
        if imp.manifest.is_none() && imp.remote.trim().is_empty() {
            return Err(ManifestError::InvalidField(format!(
                "import {:?} specifies neither manifest nor remote",
                imp.name
            )));
        }
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), ManifestError> {
    if name.contains(KEY_SEPARATOR) {
        return Err(ManifestError::InvalidField(format!(
            "name {name:?} contains the reserved key separator"
        )));
    }
    Ok(())
}

/// `project_key := name + SEPARATOR + remote` (spec.md §3). The only valid
/// handle for diffing local vs. remote projects.
pub fn project_key(name: &str, remote: &str) -> String {
    format!("{name}{KEY_SEPARATOR}{remote}")
}
