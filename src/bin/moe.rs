// MoE CLI - run the orchestration system or send it a single query

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use toollama::orchestration::{MoeSystem, SystemPaths};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mixture-of-experts orchestration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the system and keep it running until Ctrl-C
    Start {
        #[command(flatten)]
        dirs: DirArgs,
    },
    /// Route a single query and print the outcome as JSON
    Chat {
        /// Natural-language query
        query: String,

        #[command(flatten)]
        dirs: DirArgs,
    },
}

#[derive(Args, Debug)]
struct DirArgs {
    /// Directory holding models.yaml
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Models directory
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Directory scanned for tool manifests
    #[arg(long)]
    tools_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl DirArgs {
    fn paths(&self) -> SystemPaths {
        let mut paths = SystemPaths::discover();
        if let Some(dir) = &self.config_dir {
            paths = paths.with_config_dir(dir.clone());
        }
        if let Some(dir) = &self.models_dir {
            paths = paths.with_models_dir(dir.clone());
        }
        if let Some(dir) = &self.tools_dir {
            paths = paths.with_tools_dir(dir.clone());
        }
        paths
    }
}

fn init_tracing(debug: bool) {
    // stdout is reserved for JSON output
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { dirs } => {
            init_tracing(dirs.debug);
            let mut system = MoeSystem::new(dirs.paths())?;
            system.start();

            tracing::info!("MoE system running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            system.stop().await;
        }
        Command::Chat { query, dirs } => {
            init_tracing(dirs.debug);
            let mut system = MoeSystem::new(dirs.paths())?;
            system.start();

            let outcome = system.execute_query(&query).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            system.stop().await;
        }
    }

    Ok(())
}
