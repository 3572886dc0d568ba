//! `project-config` — sets per-project `ignore`/`no-update`/`no-rebase`
//! local policy flags (spec.md §6 "project-config").

use std::path::PathBuf;

use clap::Args;
use miette::Diagnostic;
use repox_manifest::LocalConfig;
use thiserror::Error;

use crate::metadata::{self, MetadataError};
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Args, Debug)]
pub struct ProjectConfigArgs {
    /// workspace-relative path of the project to configure
    project_path: PathBuf,

    #[arg(long)]
    ignore: Option<bool>,

    #[arg(long = "no-update")]
    no_update: Option<bool>,

    #[arg(long = "no-rebase")]
    no_rebase: Option<bool>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ProjectConfigError {
    #[error(transparent)]
    #[diagnostic(code(repox::command::project_config::workspace))]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(code(repox::command::project_config::metadata))]
    Metadata(#[from] MetadataError),

    #[error("{path} is not a project known to this workspace (no .git/jiri/metadata.v2)")]
    #[diagnostic(code(repox::command::project_config::unknown_project))]
    UnknownProject { path: PathBuf },
}

pub fn run_project_config(args: ProjectConfigArgs) -> Result<(), ProjectConfigError> {
    let cwd = std::env::current_dir().unwrap_or_default();
    let workspace = Workspace::discover(&cwd)?;
    let project_path = workspace.root().join(&args.project_path);

    if metadata::read_metadata(&project_path)?.is_none() {
        return Err(ProjectConfigError::UnknownProject { path: args.project_path });
    }

    let mut config = metadata::read_local_config(&project_path)?;
    if let Some(v) = args.ignore {
        config.ignore = v;
    }
    if let Some(v) = args.no_update {
        config.no_update = v;
    }
    if let Some(v) = args.no_rebase {
        config.no_rebase = v;
    }

    metadata::write_local_config(&project_path, &config)?;
    tracing::info!(path = %args.project_path.display(), ?config, "updated project-local config");
    Ok(())
}
