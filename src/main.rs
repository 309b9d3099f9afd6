use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use branch_pages::{
    env::Config,
    error::ConfigurationError,
    github::GitHubApi,
    report::{GitHubPoster, report},
    site::amalgamate,
    status::StatusQueue,
};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "branch-pages")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble the release and every fresh branch build into one site.
    Amalgamate {
        /// Where to assemble the site.
        #[arg(long, env = "OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Where to hand off status records.
        #[arg(long, env = "STATUS_FILE")]
        status_file: Option<PathBuf>,
    },
    /// Post commit statuses and pull request comments for the last assembled site.
    ReportStatus {
        /// Where status records were handed off.
        #[arg(long, env = "STATUS_FILE")]
        status_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            init_logging(false);
            return fail(&err.into());
        }
    };
    init_logging(config.debug);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(&err),
    }
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

async fn run(command: Command, mut config: Config) -> Result<()> {
    let api = GitHubApi::new(config.token.clone(), config.max_retries);

    match command {
        Command::Amalgamate {
            output_dir,
            status_file,
        } => {
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            if let Some(status_file) = status_file {
                config.status_file = status_file;
            }
            let root = amalgamate(&api, &config).await?;
            println!("{}", root.display());
        }
        Command::ReportStatus { status_file } => {
            if let Some(status_file) = status_file {
                config.status_file = status_file;
            }
            let records = StatusQueue::drain(&config.status_file).await?;
            let poster = GitHubPoster::new(&api, &config.repository, &config.status_context);
            report(&poster, &records).await;
        }
    }

    Ok(())
}

fn fail(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<ConfigurationError>() {
        Some(config_err) => {
            for annotation in config_err.annotations() {
                println!("{annotation}");
            }
        }
        None => error!("{err:#}"),
    }
    ExitCode::FAILURE
}
