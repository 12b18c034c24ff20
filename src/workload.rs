//! The workload data model: the spec a caller hands to the Supervisor, and
//! the state the Supervisor tracks while the workload is alive.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::permissions::profile::PermissionProfile;

/// Transport spoken between the Bridge and the MCP server process.
///
/// `Stdio` is the common case handled by the Protocol Bridge (C4); `Sse`
/// names a server that already speaks HTTP+SSE natively and is reverse
/// proxied rather than bridged line-by-line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Stdio,
    Sse,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Stdio => "stdio",
            TransportMode::Sse => "sse",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Some(TransportMode::Stdio),
            "sse" => Some(TransportMode::Sse),
            _ => None,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A host-port <-> container-port binding for the workload's ingress port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
}

/// Bearer-token / JWKS style auth configuration for the bridge's auth
/// middleware. The validation logic itself is out of scope (§1); this is
/// only the shape the Bridge threads through to whichever middleware is
/// installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: Option<String>,
    pub jwks_uri: Option<String>,
}

/// Declarative description of a workload to be started. Immutable once
/// handed to the Supervisor; the Supervisor derives mutable runtime state
/// (container ids, ips) separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Unique name, used as the container/network naming root and as the
    /// Registry key.
    pub name: String,
    pub image: String,
    pub transport: TransportMode,
    pub permission_profile: PermissionProfile,
    pub env: HashMap<String, String>,
    pub port_bindings: Vec<PortBinding>,
    pub exposed_ports: Vec<u16>,
    pub args: Vec<String>,
    pub auth_config: Option<AuthConfig>,
}

impl WorkloadSpec {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidSpec("workload name must not be empty".into()));
        }
        if self.image.trim().is_empty() {
            return Err(Error::InvalidSpec("workload image must not be empty".into()));
        }
        for binding in &self.port_bindings {
            if binding.host_port == 0 || binding.container_port == 0 {
                return Err(Error::InvalidSpec(format!(
                    "port binding {}:{} out of range",
                    binding.host_port, binding.container_port
                )));
            }
        }
        self.permission_profile.validate()?;
        Ok(())
    }

    /// The primary host port a client should connect to, if any is bound.
    pub fn primary_host_port(&self) -> u16 {
        self.port_bindings.first().map(|b| b.host_port).unwrap_or(0)
    }
}

/// Container name conventions, fixed per §6.
pub struct Names;

impl Names {
    pub fn main(workload: &str) -> String {
        workload.to_string()
    }

    pub fn egress(workload: &str) -> String {
        format!("{}-egress", workload)
    }

    pub fn dns(workload: &str) -> String {
        format!("{}-dns", workload)
    }

    pub fn internal_network(workload: &str) -> String {
        format!("toolhive-{}-internal", workload)
    }

    pub fn external_network() -> &'static str {
        "toolhive-external"
    }
}
