use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use crate::config::{BridgeConfig, RuntimeConfig};
use crate::environment;
use crate::error::{Error, Result};
use crate::networking::port;
use crate::permissions::profile::PermissionProfile;
use crate::registry::Registry;
use crate::runtime::RuntimeAdapter;
use crate::supervisor::Supervisor;
use crate::workload::{PortBinding, TransportMode, WorkloadSpec};

/// Run an MCP server in the foreground
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Transport mode (sse or stdio)
    #[arg(long, default_value = "stdio")]
    pub transport: String,

    /// Name of the MCP server (auto-generated from image if not provided)
    #[arg(long, required = false)]
    pub name: Option<String>,

    /// Port to expose (ingress port for sse, bridge listen port for stdio)
    #[arg(long)]
    pub port: Option<u16>,

    /// Permission profile to use (stdio, network, or path to JSON file)
    #[arg(long, default_value = "stdio")]
    pub permission_profile: String,

    /// Environment variables to pass to the MCP server (format: KEY=VALUE)
    #[arg(long, short = 'e')]
    pub env: Vec<String>,

    /// Image to use for the MCP server
    pub image: String,

    /// Arguments to pass to the MCP server
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl RunCommand {
    /// Use the provided name, or derive one from the image reference.
    fn get_container_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        let image_without_tag = self.image.split(':').next().unwrap_or(&self.image);
        let namespace_name = image_without_tag.replace('/', "-");
        let sanitized: String = namespace_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
            .collect();

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        format!("{}-{}", sanitized, timestamp)
    }

    /// A specific nonzero port must be free; no port (or zero) picks a
    /// random free one in the ephemeral range.
    fn select_port(&self) -> Result<u16> {
        match self.port {
            Some(p) if p > 0 => {
                if !port::is_available(p) {
                    return Err(Error::InvalidArgument(format!("port {} is already in use", p)));
                }
                Ok(p)
            }
            _ => port::find_available()
                .ok_or_else(|| Error::InvalidArgument("could not find an available port after multiple attempts".into())),
        }
    }

    fn load_permission_profile(&self) -> Result<PermissionProfile> {
        match self.permission_profile.as_str() {
            "stdio" => Ok(PermissionProfile::builtin_stdio_profile()),
            "network" => Ok(PermissionProfile::builtin_network_profile()),
            path => PermissionProfile::from_file(PathBuf::from(path)),
        }
    }

    /// Build, validate and return the workload spec plus the bridge's
    /// listen address, without touching the engine or the registry.
    fn build_spec(&self) -> Result<(WorkloadSpec, SocketAddr)> {
        let transport = TransportMode::from_str(&self.transport).ok_or_else(|| {
            Error::InvalidArgument(format!("invalid transport mode: {}. Valid modes are: sse, stdio", self.transport))
        })?;

        let permission_profile = self.load_permission_profile()?;
        let chosen_port = self.select_port()?;

        let mut env = environment::parse_environment_variables(&self.env)?;
        environment::set_transport_environment_variables(&mut env, &transport, chosen_port);

        let (port_bindings, exposed_ports) = match transport {
            TransportMode::Sse => (
                vec![PortBinding { host_port: chosen_port, container_port: chosen_port }],
                vec![chosen_port],
            ),
            TransportMode::Stdio => (vec![], vec![]),
        };

        let spec = WorkloadSpec {
            name: self.get_container_name(),
            image: self.image.clone(),
            transport,
            permission_profile,
            env,
            port_bindings,
            exposed_ports,
            args: self.args.clone(),
            auth_config: None,
        };
        spec.validate()?;

        let listen_addr = SocketAddr::from(([0, 0, 0, 0], chosen_port));
        Ok((spec, listen_addr))
    }

    /// Build the sandbox, register the workload, and block until Ctrl+C
    /// (or the workload exits on its own) before tearing it back down.
    pub async fn execute(
        &self,
        runtime: Arc<dyn RuntimeAdapter>,
        registry: Arc<Registry>,
        runtime_config: RuntimeConfig,
        bridge_config: BridgeConfig,
    ) -> Result<()> {
        let (spec, listen_addr) = self.build_spec()?;
        let name = spec.name.clone();

        let supervisor = Arc::new(Supervisor::new(spec, runtime, runtime_config, bridge_config));
        registry.register(supervisor.clone()).await;
        supervisor.start(listen_addr).await?;

        tracing::info!(workload = %name, "MCP server started successfully, press Ctrl+C to stop");
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("failed to listen for Ctrl+C, stopping anyway");
        }

        supervisor.stop().await?;
        registry.unregister(&name).await;
        tracing::info!(workload = %name, "MCP server stopped");

        Ok(())
    }
}
