//! C6 Workload Registry: a process-wide `name -> Supervisor` index (§3, §4.6).
//!
//! This has no precedent in the teacher, which tracked running containers by
//! re-querying the engine on every CLI invocation (`list_containers`,
//! `get_container_info`) rather than keeping an in-process index. The
//! specification instead wants a single lock-protected map that `stop`/`rm`/
//! `logs`/`list` resolve against without a round trip to the engine, so this
//! module is grounded on §4.6's own description plus the fixed-name/prefix
//! resolution rule in §4.6 ("exact name wins over ID-prefix match; ambiguity
//! is an error").

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::supervisor::Supervisor;

/// Process-wide index of active workloads. Constructed once per process
/// (§9: "must be constructed once, guarded by a lock; do not allow implicit
/// initialization order dependencies") and shared behind an `Arc` by every
/// caller that can start, stop, list or remove workloads.
///
/// Holds only [`Weak`] references (§3: "The Registry holds weak references
/// (lookup only)"): the owning Supervisor's caller keeps the strong `Arc`,
/// and a Supervisor that has been dropped elsewhere simply stops resolving
/// here rather than being kept alive by this index.
#[derive(Default)]
pub struct Registry {
    workloads: RwLock<HashMap<String, Weak<Supervisor>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a newly-started workload under its name, stored as a `Weak`
    /// handle. Replaces any prior entry of the same name (the caller is
    /// responsible for ensuring the old one was already stopped; the
    /// Registry itself holds no opinion on that, it is purely a lookup
    /// index).
    pub async fn register(&self, supervisor: Arc<Supervisor>) {
        let name = supervisor.name().to_string();
        self.workloads.write().await.insert(name, Arc::downgrade(&supervisor));
    }

    /// Exact-name lookup only; used by the start path to detect an existing
    /// registration before deciding whether to reuse or replace it. A name
    /// whose Supervisor has already been dropped resolves to `None`, same
    /// as an absent entry.
    pub async fn lookup(&self, name: &str) -> Option<Arc<Supervisor>> {
        self.workloads.read().await.get(name).and_then(Weak::upgrade)
    }

    /// Upgradeable entries only; stale (dropped) entries are pruned as a
    /// side effect since listing is already a full-map scan.
    pub async fn list(&self) -> Vec<Arc<Supervisor>> {
        let mut workloads = self.workloads.write().await;
        workloads.retain(|_, weak| weak.strong_count() > 0);
        workloads.values().filter_map(Weak::upgrade).collect()
    }

    pub async fn unregister(&self, name: &str) -> Option<Arc<Supervisor>> {
        self.workloads.write().await.remove(name).and_then(|weak| weak.upgrade())
    }

    /// Resolve an external command's target by exact name first, falling
    /// back to a unique container-id prefix match (§4.6). Zero matches is
    /// `NotFound`; more than one prefix match is an ambiguity error. Entries
    /// whose Supervisor has already been dropped are treated as absent.
    pub async fn resolve(&self, name_or_prefix: &str) -> Result<Arc<Supervisor>> {
        let workloads = self.workloads.read().await;

        if let Some(exact) = workloads.get(name_or_prefix).and_then(Weak::upgrade) {
            return Ok(exact);
        }

        let mut prefix_matches = Vec::new();
        for weak in workloads.values() {
            let Some(supervisor) = weak.upgrade() else { continue };
            if let Some(id) = supervisor.main_container_id().await {
                if id.starts_with(name_or_prefix) {
                    prefix_matches.push(supervisor);
                }
            }
        }

        match prefix_matches.len() {
            0 => Err(Error::NotFound(name_or_prefix.to_string())),
            1 => Ok(prefix_matches.into_iter().next().unwrap()),
            _ => Err(Error::InvalidArgument(format!(
                "ambiguous workload reference {:?}: matches {} containers",
                name_or_prefix,
                prefix_matches.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, RuntimeConfig};
    use crate::permissions::profile::PermissionProfile;
    use crate::runtime::{
        AttachedRead, AttachedWrite, ContainerInfo, ContainerSpec, RuntimeAdapter,
    };
    use crate::workload::{TransportMode, WorkloadSpec};
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;

    struct NullAdapter;

    #[async_trait]
    impl RuntimeAdapter for NullAdapter {
        async fn deploy_workload(&self, _spec: &ContainerSpec) -> Result<String> {
            Ok("id".into())
        }
        async fn create_container(&self, _spec: &ContainerSpec) -> Result<String> {
            Ok("id".into())
        }
        async fn start_container(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn stop_container(&self, _id: &str, _grace: std::time::Duration) -> Result<()> {
            Ok(())
        }
        async fn remove_container(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn list_containers(&self, _label_filter: &str) -> Result<Vec<ContainerInfo>> {
            Ok(vec![])
        }
        async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
            Ok(ContainerInfo {
                id: id.to_string(),
                name: "wl".into(),
                image: "img".into(),
                status: "Up".into(),
                state: "running".into(),
                labels: StdHashMap::new(),
                ports: vec![],
                created: 0,
            })
        }
        async fn is_container_running(&self, _id: &str) -> Result<bool> {
            Ok(true)
        }
        async fn get_container_ip(&self, _id: &str, _network: &str) -> Result<String> {
            Ok("10.0.0.2".into())
        }
        async fn attach_container(
            &self,
            _id: &str,
        ) -> Result<(Box<dyn AttachedWrite>, Box<dyn AttachedRead>)> {
            Err(Error::ContainerRuntime("not supported in test".into()))
        }
        async fn container_logs(&self, _id: &str, _follow: bool) -> Result<String> {
            Ok(String::new())
        }
        async fn pull_image(&self, _image_ref: &str) -> Result<()> {
            Ok(())
        }
        async fn image_exists(&self, _image_ref: &str) -> Result<bool> {
            Ok(true)
        }
        async fn create_network(
            &self,
            _name: &str,
            _internal: bool,
            _labels: &StdHashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }
        async fn delete_network(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn connect_network(&self, _container_id: &str, _network_name: &str) -> Result<()> {
            Ok(())
        }
    }

    fn test_supervisor(name: &str) -> Arc<Supervisor> {
        let spec = WorkloadSpec {
            name: name.to_string(),
            image: "echo-mcp:latest".to_string(),
            transport: TransportMode::Stdio,
            permission_profile: PermissionProfile::builtin_stdio_profile(),
            env: StdHashMap::new(),
            port_bindings: vec![],
            exposed_ports: vec![],
            args: vec![],
            auth_config: None,
        };
        Arc::new(Supervisor::new(
            spec,
            Arc::new(NullAdapter),
            RuntimeConfig::default(),
            BridgeConfig::default(),
        ))
    }

    #[tokio::test]
    async fn register_then_lookup_by_exact_name() {
        let registry = Registry::new();
        let alpha = test_supervisor("alpha");
        registry.register(alpha.clone()).await;
        assert!(registry.lookup("alpha").await.is_some());
        assert!(registry.lookup("beta").await.is_none());
    }

    #[tokio::test]
    async fn list_reflects_all_registered_workloads() {
        let registry = Registry::new();
        let alpha = test_supervisor("alpha");
        let beta = test_supervisor("beta");
        registry.register(alpha.clone()).await;
        registry.register(beta.clone()).await;
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn unregister_removes_the_entry() {
        let registry = Registry::new();
        let alpha = test_supervisor("alpha");
        registry.register(alpha.clone()).await;
        assert!(registry.unregister("alpha").await.is_some());
        assert!(registry.lookup("alpha").await.is_none());
        assert!(registry.unregister("alpha").await.is_none());
    }

    #[tokio::test]
    async fn resolve_prefers_exact_name_over_prefix_match() {
        let registry = Registry::new();
        let alpha = test_supervisor("alpha");
        registry.register(alpha.clone()).await;
        let resolved = registry.resolve("alpha").await.unwrap();
        assert_eq!(resolved.name(), "alpha");
    }

    #[tokio::test]
    async fn resolve_unknown_name_is_not_found() {
        let registry = Registry::new();
        let err = registry.resolve("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    /// §3: the Registry holds weak references only — once every strong
    /// owner drops its `Arc<Supervisor>`, the entry stops resolving instead
    /// of being kept alive by the registry's own index.
    #[tokio::test]
    async fn dropped_supervisor_no_longer_resolves() {
        let registry = Registry::new();
        {
            let alpha = test_supervisor("alpha");
            registry.register(alpha.clone()).await;
            assert!(registry.lookup("alpha").await.is_some());
        }
        assert!(registry.lookup("alpha").await.is_none());
        assert!(registry.list().await.is_empty());
    }
}
