pub mod import;
pub mod project_config;
pub mod snapshot;
pub mod update;

use self::{import::ImportArgs, project_config::ProjectConfigArgs, snapshot::SnapshotArgs, update::UpdateArgs};
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the workspace against its manifest: clone, move, remove,
    /// and advance every project to its resolved revision
    Update(UpdateArgs),

    /// Add an `<import>` entry to the root manifest
    Import(ImportArgs),

    /// Write a manifest pinning every project's current revision
    Snapshot(SnapshotArgs),

    /// Set a project's local `ignore`/`no-update`/`no-rebase` policy
    ProjectConfig(ProjectConfigArgs),
}
