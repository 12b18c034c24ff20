use std::sync::Arc;

use anyhow::Result;

use toolhive_runtime::cli::{self, Commands};
use toolhive_runtime::config::{BridgeConfig, RuntimeConfig};
use toolhive_runtime::registry::Registry;
use toolhive_runtime::runtime::docker::DockerAdapter;
use toolhive_runtime::runtime::RuntimeAdapter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = cli::parse_args();
    let runtime_config = RuntimeConfig::default();
    let bridge_config = BridgeConfig::default();

    match cli.command {
        Some(Commands::Run(cmd)) => {
            let runtime = connect(&runtime_config).await?;
            let registry = Registry::new();
            cmd.execute(runtime, registry, runtime_config, bridge_config).await?;
        }
        Some(Commands::Start(cmd)) => {
            let runtime = connect(&runtime_config).await?;
            let registry = Registry::new();
            cmd.execute(runtime, registry, runtime_config, bridge_config).await?;
        }
        Some(Commands::List(cmd)) => {
            let runtime = connect(&runtime_config).await?;
            cmd.execute(runtime).await?;
        }
        Some(Commands::Stop(cmd)) => {
            let runtime = connect(&runtime_config).await?;
            cmd.execute(runtime).await?;
        }
        Some(Commands::Rm(cmd)) => {
            let runtime = connect(&runtime_config).await?;
            cmd.execute(runtime).await?;
        }
        Some(Commands::Version) => {
            println!("toolhive-rt {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            println!("no subcommand given, run with --help for usage");
        }
    }

    Ok(())
}

/// Connect to the Docker-compatible engine, honoring an explicit socket
/// override before falling back to auto-discovery (§4.1/§9).
async fn connect(runtime_config: &RuntimeConfig) -> Result<Arc<dyn RuntimeAdapter>> {
    let adapter = DockerAdapter::connect(runtime_config.socket_override.clone()).await?;
    Ok(Arc::new(adapter))
}
