//! CLI entrypoint for hardware self-test sessions.

#[path = "hwst/cli.rs"]
mod cli;
#[path = "hwst/plan.rs"]
mod plan;
#[path = "hwst/run.rs"]
mod run;
#[path = "hwst/style.rs"]
mod style;

use clap::Parser;
use tracing::Level;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Command::Run {
            config,
            address,
            show_previous,
        } => run::run_session(config, address, show_previous),
        Command::Plan {
            config,
            capabilities,
        } => plan::print_plan(config, &capabilities).map(|()| run::Outcome::Passed),
    };
    match outcome {
        Ok(outcome) => {
            let code = outcome.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", style::error(format!("Error: {err:#}")));
            std::process::exit(1);
        }
    }
}
