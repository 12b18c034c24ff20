//! The declarative permission profile (§3) and its compilation into
//! engine-level primitives (§4.2 Output A). Output B (the egress ACL
//! document) lives in [`crate::permissions::compiler`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runtime::MountSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionProfile {
    #[serde(default)]
    pub read: Vec<String>,

    #[serde(default)]
    pub write: Vec<String>,

    #[serde(default)]
    pub network: Option<NetworkPermissions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPermissions {
    #[serde(default)]
    pub outbound: Option<OutboundNetworkPermissions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundNetworkPermissions {
    #[serde(default)]
    pub insecure_allow_all: bool,

    #[serde(default)]
    pub allow_transport: Vec<String>,

    #[serde(default)]
    pub allow_host: Vec<String>,

    #[serde(default)]
    pub allow_port: Vec<u16>,
}

impl OutboundNetworkPermissions {
    /// Per §3's invariant: when `insecure_allow_all`, the other lists are
    /// ignored rather than treated as a validation conflict.
    pub fn effective_allow_transport(&self) -> &[String] {
        if self.insecure_allow_all { &[] } else { &self.allow_transport }
    }

    pub fn effective_allow_host(&self) -> &[String] {
        if self.insecure_allow_all { &[] } else { &self.allow_host }
    }

    pub fn effective_allow_port(&self) -> &[u16] {
        if self.insecure_allow_all { &[] } else { &self.allow_port }
    }
}

/// Output A of the Permission Compiler: engine-level primitives.
#[derive(Debug, Clone)]
pub struct ContainerPermissionConfig {
    pub mounts: Vec<MountSpec>,
    pub network_mode: String,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
}

impl PermissionProfile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let profile: Self = serde_json::from_str(&content)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn builtin(name: &str) -> Result<Self> {
        match name {
            "stdio" => Ok(Self::builtin_stdio_profile()),
            "network" => Ok(Self::builtin_network_profile()),
            other => Err(Error::InvalidSpec(format!("unknown built-in profile: {}", other))),
        }
    }

    pub fn builtin_stdio_profile() -> Self {
        Self {
            read: vec!["/var/run/mcp.sock".to_string()],
            write: vec!["/var/run/mcp.sock".to_string()],
            network: None,
        }
    }

    pub fn builtin_network_profile() -> Self {
        Self {
            read: vec!["/var/run/mcp.sock".to_string()],
            write: vec!["/var/run/mcp.sock".to_string()],
            network: Some(NetworkPermissions {
                outbound: Some(OutboundNetworkPermissions {
                    insecure_allow_all: true,
                    allow_transport: vec![],
                    allow_host: vec![],
                    allow_port: vec![],
                }),
            }),
        }
    }

    /// Structural validation only. Unlike an earlier draft of this
    /// component, `insecure_allow_all=true` together with non-empty
    /// allow-lists is accepted: §3 states the lists are *ignored* in that
    /// case, not rejected.
    pub fn validate(&self) -> Result<()> {
        for path in self.read.iter().chain(self.write.iter()) {
            if path.is_empty() {
                return Err(Error::InvalidSpec("mount path must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Resolve a possibly-relative mount source against the process
    /// working directory. Paths with a `scheme://` prefix are reserved
    /// (resource-URI mounts) and are not filesystem paths at all; callers
    /// must filter those out before calling this (see
    /// [`Self::to_container_config`]).
    fn resolve_source(path: &str) -> String {
        if Path::new(path).is_absolute() {
            path.to_string()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path).to_string_lossy().to_string())
                .unwrap_or_else(|_| path.to_string())
        }
    }

    fn is_resource_uri(path: &str) -> bool {
        path.contains("://")
    }

    /// Output A: translate to engine-level mounts/network-mode/caps.
    pub fn to_container_config(&self) -> Result<ContainerPermissionConfig> {
        self.validate()?;

        let write_set: HashSet<&String> = self.write.iter().collect();
        let mut mounts = Vec::new();

        for path in &self.read {
            if Self::is_resource_uri(path) {
                tracing::warn!(path = %path, "skipping resource-URI mount, reserved for future use");
                continue;
            }
            if !write_set.contains(path) {
                let resolved = Self::resolve_source(path);
                mounts.push(MountSpec { source: resolved.clone(), target: resolved, read_only: true });
            }
        }

        for path in &self.write {
            if Self::is_resource_uri(path) {
                tracing::warn!(path = %path, "skipping resource-URI mount, reserved for future use");
                continue;
            }
            let resolved = Self::resolve_source(path);
            mounts.push(MountSpec { source: resolved.clone(), target: resolved, read_only: false });
        }

        let network_mode = match self.outbound() {
            Some(outbound) if outbound.insecure_allow_all => "bridge".to_string(),
            Some(_) => "none".to_string(),
            None => "none".to_string(),
        };

        Ok(ContainerPermissionConfig {
            mounts,
            network_mode,
            cap_drop: vec!["ALL".to_string()],
            cap_add: vec!["NET_BIND_SERVICE".to_string()],
            security_opt: vec!["no-new-privileges".to_string()],
        })
    }

    pub fn outbound(&self) -> Option<&OutboundNetworkPermissions> {
        self.network.as_ref().and_then(|n| n.outbound.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet as StdHashSet;

    #[test]
    fn default_profile_validates() {
        let profile = PermissionProfile { read: vec![], write: vec![], network: None };
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn builtin_stdio_profile_has_expected_shape() {
        let profile = PermissionProfile::builtin_stdio_profile();
        assert_eq!(profile.read, vec!["/var/run/mcp.sock"]);
        assert!(profile.network.is_none());
    }

    #[test]
    fn builtin_network_profile_allows_all_outbound() {
        let profile = PermissionProfile::builtin_network_profile();
        let outbound = profile.outbound().unwrap();
        assert!(outbound.insecure_allow_all);
    }

    #[test]
    fn insecure_allow_all_with_other_lists_is_not_a_validation_error() {
        let profile = PermissionProfile {
            read: vec![],
            write: vec![],
            network: Some(NetworkPermissions {
                outbound: Some(OutboundNetworkPermissions {
                    insecure_allow_all: true,
                    allow_transport: vec!["tcp".to_string()],
                    allow_host: vec![],
                    allow_port: vec![],
                }),
            }),
        };
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn insecure_allow_all_makes_other_lists_ineffective() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: true,
            allow_transport: vec!["tcp".to_string()],
            allow_host: vec!["example.com".to_string()],
            allow_port: vec![443],
        };
        assert!(outbound.effective_allow_transport().is_empty());
        assert!(outbound.effective_allow_host().is_empty());
        assert!(outbound.effective_allow_port().is_empty());
    }

    #[test]
    fn to_container_config_write_wins_over_read() {
        let profile = PermissionProfile {
            read: vec!["/data".to_string()],
            write: vec!["/data".to_string()],
            network: None,
        };
        let config = profile.to_container_config().unwrap();
        assert_eq!(config.mounts.len(), 1);
        assert!(!config.mounts[0].read_only);
    }

    #[test]
    fn to_container_config_network_mode_follows_insecure_allow_all() {
        let profile = PermissionProfile::builtin_network_profile();
        let config = profile.to_container_config().unwrap();
        assert_eq!(config.network_mode, "bridge");
    }

    #[test]
    fn to_container_config_defaults_to_none_network_mode() {
        let profile = PermissionProfile::builtin_stdio_profile();
        let config = profile.to_container_config().unwrap();
        assert_eq!(config.network_mode, "none");
    }

    #[test]
    fn to_container_config_skips_resource_uri_mounts() {
        let profile = PermissionProfile {
            read: vec!["resource://some-handle".to_string()],
            write: vec![],
            network: None,
        };
        let config = profile.to_container_config().unwrap();
        assert!(config.mounts.is_empty());
    }

    #[test]
    fn to_container_config_sets_fixed_caps_and_security_opt() {
        let profile = PermissionProfile::builtin_stdio_profile();
        let config = profile.to_container_config().unwrap();
        assert_eq!(config.cap_drop, vec!["ALL"]);
        assert_eq!(config.cap_add, vec!["NET_BIND_SERVICE"]);
        assert_eq!(config.security_opt, vec!["no-new-privileges"]);
    }

    #[test]
    fn mount_paths_are_deduplicated_by_target_set() {
        let profile = PermissionProfile {
            read: vec!["/a".to_string(), "/b".to_string()],
            write: vec!["/a".to_string()],
            network: None,
        };
        let config = profile.to_container_config().unwrap();
        let targets: StdHashSet<String> = config.mounts.iter().map(|m| m.target.clone()).collect();
        assert!(targets.contains("/a"));
        assert!(targets.contains("/b"));
        assert_eq!(config.mounts.len(), 2);
    }

    #[test]
    fn from_file_errors_on_missing_file() {
        assert!(PermissionProfile::from_file("/nonexistent/path.json").is_err());
    }
}
