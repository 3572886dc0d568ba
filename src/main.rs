use std::process::ExitCode;

use clap::Parser;
use miette::Diagnostic;
use repox::command::{
    import::run_import,
    project_config::run_project_config,
    snapshot::run_snapshot,
    update::{run_update, UpdateError},
    Command,
};
use repox::error::{EXIT_RECOVERABLE_FAILURES, EXIT_SUCCESS, EXIT_USAGE_OR_FATAL};

/// Reconciles a Git workspace against a manifest describing which projects
/// belong in it.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let code = match args.command {
        Command::Update(args) => match run_update(args) {
            Ok(()) => EXIT_SUCCESS,
            Err(err @ UpdateError::RecoverableFailures { .. }) => {
                eprintln!("{:?}", miette::Report::new(err));
                EXIT_RECOVERABLE_FAILURES
            }
            Err(err) => {
                eprintln!("{:?}", miette::Report::new(err));
                EXIT_USAGE_OR_FATAL
            }
        },
        Command::Import(args) => report(run_import(args)),
        Command::Snapshot(args) => report(run_snapshot(args)),
        Command::ProjectConfig(args) => report(run_project_config(args)),
    };

    ExitCode::from(code as u8)
}

/// Commands that either fully succeed or fail fatally (no "recoverable
/// per-project failure" middle ground) all funnel through here.
fn report<E: Diagnostic + Send + Sync + 'static>(result: Result<(), E>) -> i32 {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            EXIT_USAGE_OR_FATAL
        }
    }
}
