//! `start`: build the sandbox and register the workload, then return
//! immediately instead of blocking on Ctrl+C.
//!
//! The Supervisor's monitor and bridge tasks are spawned onto this process's
//! tokio runtime, so once the `toolhive-rt` process that ran `start` exits
//! they stop running even though the underlying containers keep running
//! under the engine independently. A later `stop`/`list` invocation (a new
//! process) cannot see this process's in-memory [`Registry`] and instead
//! resolves its target directly against the engine via container labels.

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

/// Start an MCP server and return immediately
#[derive(Args, Debug)]
pub struct StartCommand {
    /// Transport mode (sse or stdio)
    #[arg(long, default_value = "sse")]
    pub transport: String,

    /// Name of the MCP server
    #[arg(long)]
    pub name: String,

    /// Port to expose (required for sse transport)
    #[arg(long)]
    pub port: Option<u16>,

    /// Permission profile to use (stdio, network, or path to JSON file)
    #[arg(long, default_value = "stdio")]
    pub permission_profile: String,

    /// Image to use for the MCP server
    pub image: String,

    /// Arguments to pass to the MCP server
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl StartCommand {
    fn build_spec(&self) -> Result<(WorkloadSpec, SocketAddr)> {
        let transport = TransportMode::from_str(&self.transport).ok_or_else(|| {
            Error::InvalidArgument(format!("invalid transport mode: {}. Valid modes are: sse, stdio", self.transport))
        })?;

        let chosen_port = match (transport, self.port) {
            (TransportMode::Sse, Some(p)) if p > 0 => p,
            (TransportMode::Sse, _) => {
                return Err(Error::InvalidArgument("port is required for sse transport".into()))
            }
            (TransportMode::Stdio, Some(p)) if p > 0 => p,
            (TransportMode::Stdio, _) => port::find_available()
                .ok_or_else(|| Error::Configuration("no available port found in ephemeral range".into()))?,
        };

        let permission_profile = match self.permission_profile.as_str() {
            "stdio" => PermissionProfile::builtin_stdio_profile(),
            "network" => PermissionProfile::builtin_network_profile(),
            path => PermissionProfile::from_file(PathBuf::from(path))?,
        };

        let mut env = environment::parse_environment_variables(&[])?;
        environment::set_transport_environment_variables(&mut env, &transport, chosen_port);

        let (port_bindings, exposed_ports) = match transport {
            TransportMode::Sse => (
                vec![PortBinding { host_port: chosen_port, container_port: chosen_port }],
                vec![chosen_port],
            ),
            TransportMode::Stdio => (vec![], vec![]),
        };

        let spec = WorkloadSpec {
            name: self.name.clone(),
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

        Ok((spec, SocketAddr::from(([0, 0, 0, 0], chosen_port))))
    }

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

        println!("MCP server {} started", name);
        Ok(())
    }
}
