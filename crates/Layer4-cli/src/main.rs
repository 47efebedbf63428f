//! Orbit CLI - Main entry point

mod backends;
mod run;
mod serve;
mod shell;
mod workspace;

use clap::{Parser, Subcommand};
use orbit_foundation::OrbitConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Orbit - multi-session terminal with local and remote execution
#[derive(Parser, Debug)]
#[command(name = "orbit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the remote sandboxed executor
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Directory per-job workspaces are created in
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Open the interactive terminal (default)
    Shell {
        /// Remote executor WebSocket URL (overrides config)
        #[arg(short, long)]
        server: Option<String>,

        /// Directory loaded into the virtual file system
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
    /// Run one file and exit with its exit code
    Run {
        /// Entry file, relative to the workspace directory
        file: PathBuf,

        /// Directory loaded as the workspace (defaults to the current one)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Send the job to the remote executor instead of a local sandbox
        #[arg(long)]
        remote: bool,

        /// Remote executor WebSocket URL (overrides config)
        #[arg(short, long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Shell {
        server: None,
        workspace: None,
    });

    // the shell owns the terminal; logs only when asked for
    let interactive = matches!(command, Command::Shell { .. });
    if !interactive || args.debug {
        init_logging(args.debug);
    }

    let config = OrbitConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        OrbitConfig::default()
    });

    match command {
        Command::Serve { bind, root } => {
            let mut config = config;
            if let Some(bind) = bind {
                config = config.bind(bind);
            }
            if let Some(root) = root {
                config = config.workspace_root(root);
            }
            serve::run(&config).await
        }
        Command::Shell { server, workspace } => {
            let config = match server {
                Some(url) => config.server_url(url),
                None => config,
            };
            shell::run(&config, workspace).await
        }
        Command::Run {
            file,
            workspace,
            remote,
            server,
        } => {
            let config = match server {
                Some(url) => config.server_url(url),
                None => config,
            };
            let code = run::run(&config, &file, workspace, remote).await?;
            std::process::exit(code);
        }
    }
}

fn init_logging(debug: bool) {
    let log_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
