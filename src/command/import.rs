//! `import` — adds an `<import>` entry to the workspace's root manifest
//! (spec.md §6 "import": "Add an `<import>` entry to the root manifest").

use std::fs;
use std::path::PathBuf;

use clap::Args;
use miette::Diagnostic;
use repox_manifest::{Import, Manifest};
use thiserror::Error;

use crate::workspace::{Workspace, WorkspaceError};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// remote URL of the repository hosting the manifest to import
    remote: String,

    /// name the imported projects are nested under
    #[arg(long)]
    name: Option<String>,

    /// manifest file within the imported repository (default "default.xml")
    #[arg(long)]
    manifest: Option<String>,

    #[arg(long = "remote-branch")]
    remote_branch: Option<String>,

    #[arg(long)]
    revision: Option<String>,

    /// path prefix prepended to names and paths of everything imported transitively
    #[arg(long)]
    root: Option<String>,

    /// deprecated alias for --root
    #[arg(long)]
    path: Option<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ImportError {
    #[error(transparent)]
    #[diagnostic(code(repox::command::import::workspace))]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::import::manifest))]
    Manifest(#[from] repox_manifest::ManifestError),

    #[error("failed to read root manifest at {path}")]
    #[diagnostic(code(repox::command::import::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write root manifest at {path}")]
    #[diagnostic(code(repox::command::import::write))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn run_import(args: ImportArgs) -> Result<(), ImportError> {
    let cwd = std::env::current_dir().map_err(|source| ImportError::Read { path: PathBuf::from("."), source })?;
    let workspace = Workspace::discover(&cwd)?;
    let manifest_path = workspace.root().join(".jiri_manifest");

    let text = fs::read_to_string(&manifest_path).map_err(|source| ImportError::Read { path: manifest_path.clone(), source })?;
    let mut manifest = Manifest::parse(&text)?;
    repox_manifest::error::validate(&manifest)?;

    let name = args.name.clone().unwrap_or_else(|| default_name(&args.remote));
    let root = args.root.clone().or_else(|| args.path.clone());

    manifest.push_import(Import {
        manifest: args.manifest.clone(),
        name,
        remote: args.remote.clone(),
        revision: args.revision.clone(),
        remote_branch: args.remote_branch.clone(),
        root,
    });

    fs::write(&manifest_path, manifest.to_xml_string()).map_err(|source| ImportError::Write { path: manifest_path, source })?;
    tracing::info!(remote = %args.remote, "added import to root manifest");
    Ok(())
}

/// The last non-empty path segment of the remote URL, `jiri`-style, used
/// when `--name` is omitted.
fn default_name(remote: &str) -> String {
    remote.trim_end_matches('/').rsplit('/').next().unwrap_or(remote).to_string()
}
