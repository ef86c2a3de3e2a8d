//! Shipwright CLI.

use clap::{Parser, Subcommand, ValueEnum};
use shipwright_core::CancellationToken;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(about = "Build and release the projects of a monorepo", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, env = "SHIPWRIGHT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Ignore the CI environment and never use a remote satellite
    #[arg(long, env = "SHIPWRIGHT_LOCAL", global = true)]
    local: bool,

    /// Directory for build artifacts. Defaults to a temporary directory.
    #[arg(long, env = "SHIPWRIGHT_WORKDIR", global = true)]
    workdir: Option<PathBuf>,

    /// Earthly binary
    #[arg(long, env = "SHIPWRIGHT_EARTHLY_BIN", default_value = "earthly", global = true)]
    earthly_bin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named release of a project
    Release {
        /// Path to the project
        project: PathBuf,
        /// Release name
        name: String,
        /// Release even when no event is firing
        #[arg(long)]
        force: bool,
    },
    /// Run a target of a project
    Run {
        /// Path to the project
        project: PathBuf,
        /// Target name
        target: String,
        /// Produce no images or artifacts
        #[arg(long)]
        no_output: bool,
    },
    /// List the projects below a directory
    Scan {
        /// Directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Print each project's name next to its path
        #[arg(long)]
        blueprint: bool,
    },
    /// Load a project and print its resolved blueprint as JSON
    Validate {
        /// Path to the project
        project: PathBuf,
    },
}

fn init_logging(verbose: u8, format: LogFormat) {
    let default = match verbose {
        0 => "shipwright=info",
        1 => "shipwright=debug",
        _ => "shipwright=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let opts = commands::Options {
        local: cli.local,
        workdir: cli.workdir,
        earthly_bin: cli.earthly_bin,
    };

    let result = match cli.command {
        Commands::Release {
            project,
            name,
            force,
        } => commands::release::release(&opts, &project, &name, force, &cancel).await,
        Commands::Run {
            project,
            target,
            no_output,
        } => commands::run::run(&opts, &project, &target, no_output, &cancel).await,
        Commands::Scan { path, blueprint } => {
            commands::scan::scan(&opts, &path, blueprint, &cancel).await
        }
        Commands::Validate { project } => commands::validate(&opts, &project, &cancel).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => commands::report(&err),
    }
}
