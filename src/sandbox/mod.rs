//! C3 Sandbox Builder: materializes the three-container, two-network
//! topology described in §3/§4.3. The teacher this crate grew from only
//! ever ran a single container per workload — this component has no direct
//! precedent there and is instead grounded on a Squid-forward-proxy +
//! dedicated-bridge-network pattern from the wider retrieval pack, adapted
//! to the fixed five-step build order and bind-mounted ACL delivery the
//! specification mandates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::labels;
use crate::permissions::compiler::{self, EGRESS_CONFIG_MOUNT_PATH, EGRESS_PROXY_PORT};
use crate::runtime::{ContainerSpec, MountSpec, RuntimeAdapter};
use crate::workload::{Names, TransportMode, WorkloadSpec};

pub const EGRESS_IMAGE: &str = "ubuntu/squid:latest";
pub const DNS_IMAGE: &str = "dockurr/dnsmasq:latest";

/// The three container identities and two networks that make up one
/// workload's sandbox, plus the temp file backing the egress ACL mount
/// (kept alive for the sandbox's lifetime; dropping it deletes the file).
pub struct SandboxTopology {
    pub main_id: String,
    pub egress_id: String,
    pub dns_id: String,
    pub internal_network: String,
    pub external_network: String,
    _acl_file: tempfile::NamedTempFile,
}

/// Tracks which artifacts have actually been created so a failure partway
/// through `build` can be unwound in reverse order (§4.3 / §9's
/// best-effort-teardown-on-image-pull-failure resolution).
#[derive(Default)]
struct BuildProgress {
    internal_network_created: bool,
    external_network_created: bool,
    dns_id: Option<String>,
    egress_id: Option<String>,
    main_id: Option<String>,
}

pub struct SandboxBuilder {
    runtime: Arc<dyn RuntimeAdapter>,
}

impl SandboxBuilder {
    pub fn new(runtime: Arc<dyn RuntimeAdapter>) -> Self {
        Self { runtime }
    }

    pub async fn build(&self, spec: &WorkloadSpec) -> Result<SandboxTopology> {
        spec.validate()?;

        let internal_network = Names::internal_network(&spec.name);
        let external_network = Names::external_network().to_string();
        let mut progress = BuildProgress::default();

        let result = self.build_inner(spec, &internal_network, &external_network, &mut progress).await;

        match result {
            Ok(topology) => Ok(topology),
            Err(e) => {
                self.unwind(&progress, &internal_network).await;
                Err(e)
            }
        }
    }

    async fn build_inner(
        &self,
        spec: &WorkloadSpec,
        internal_network: &str,
        external_network: &str,
        progress: &mut BuildProgress,
    ) -> Result<SandboxTopology> {
        // Step 1: networks.
        let mut internal_labels = HashMap::new();
        labels::add_network_labels(&mut internal_labels, &spec.name, internal_network);
        self.runtime.create_network(internal_network, true, &internal_labels).await?;
        progress.internal_network_created = true;

        let mut external_labels = HashMap::new();
        labels::add_network_labels(&mut external_labels, &spec.name, external_network);
        self.runtime.create_network(external_network, false, &external_labels).await?;
        progress.external_network_created = true;

        // Step 2: pull egress + dns images if absent.
        for image in [EGRESS_IMAGE, DNS_IMAGE] {
            if !self.runtime.image_exists(image).await? {
                self.runtime.pull_image(image).await.map_err(|e| {
                    Error::ImagePullFailed(format!("{}: {}", image, e))
                })?;
            }
        }

        // Step 3: DNS container, both networks, capture internal IP.
        let dns_name = Names::dns(&spec.name);
        let mut dns_labels = HashMap::new();
        labels::add_workload_labels(&mut dns_labels, &spec.name);

        let dns_spec = ContainerSpec {
            name: dns_name.clone(),
            image: DNS_IMAGE.to_string(),
            labels: dns_labels,
            network_mode: internal_network.to_string(),
            restart_unless_stopped: true,
            ..Default::default()
        };
        let dns_id = self.runtime.deploy_workload(&dns_spec).await?;
        progress.dns_id = Some(dns_id.clone());
        self.runtime.connect_network(&dns_id, external_network).await?;
        let dns_ip = self.runtime.get_container_ip(&dns_id, internal_network).await?;

        // Step 4: egress container, both networks, ACL mounted, host ports.
        let egress_name = Names::egress(&spec.name);
        let mut egress_labels = HashMap::new();
        labels::add_workload_labels(&mut egress_labels, &spec.name);

        let outbound = spec.permission_profile.outbound();
        let acl_doc = compiler::generate_acl_document(outbound, &Names::main(&spec.name), &spec.exposed_ports);
        let acl_file = compiler::write_acl_document(&acl_doc)?;

        let egress_spec = ContainerSpec {
            name: egress_name.clone(),
            image: EGRESS_IMAGE.to_string(),
            labels: egress_labels,
            network_mode: internal_network.to_string(),
            mounts: vec![MountSpec {
                source: acl_file.path().to_string_lossy().to_string(),
                target: EGRESS_CONFIG_MOUNT_PATH.to_string(),
                read_only: true,
            }],
            port_bindings: spec
                .port_bindings
                .iter()
                .map(|b| (b.host_port, b.container_port))
                .collect(),
            exposed_ports: vec![EGRESS_PROXY_PORT],
            restart_unless_stopped: true,
            ..Default::default()
        };
        let egress_id = self.runtime.deploy_workload(&egress_spec).await?;
        progress.egress_id = Some(egress_id.clone());
        self.runtime.connect_network(&egress_id, external_network).await?;

        // Step 5: main container, internal network only.
        let main_name = Names::main(&spec.name);
        let mut main_labels = HashMap::new();
        labels::add_main_labels(&mut main_labels, &spec.name, spec.transport.as_str(), spec.primary_host_port());

        let permission_config = spec.permission_profile.to_container_config()?;
        let mut env = spec.env.clone();
        inject_proxy_env(&mut env, &egress_name);
        env.insert("MCP_TRANSPORT".to_string(), spec.transport.as_str().to_string());

        let main_spec = ContainerSpec {
            name: main_name.clone(),
            image: spec.image.clone(),
            cmd: spec.args.clone(),
            env,
            labels: main_labels,
            mounts: permission_config.mounts.clone(),
            network_mode: internal_network.to_string(),
            cap_drop: permission_config.cap_drop.clone(),
            cap_add: permission_config.cap_add.clone(),
            security_opt: permission_config.security_opt.clone(),
            exposed_ports: spec.exposed_ports.clone(),
            dns: vec![dns_ip],
            attach_stdio: matches!(spec.transport, TransportMode::Stdio),
            restart_unless_stopped: true,
            ..Default::default()
        };
        let main_id = self.runtime.deploy_workload(&main_spec).await?;
        progress.main_id = Some(main_id.clone());

        Ok(SandboxTopology {
            main_id,
            egress_id,
            dns_id,
            internal_network: internal_network.to_string(),
            external_network: external_network.to_string(),
            _acl_file: acl_file,
        })
    }

    /// Best-effort teardown of whatever was actually created, in reverse
    /// order, used both on a failed `build` and as the public `teardown`.
    async fn unwind(&self, progress: &BuildProgress, internal_network: &str) {
        if let Some(id) = &progress.main_id {
            self.stop_and_remove(id).await;
        }
        if let Some(id) = &progress.egress_id {
            self.stop_and_remove(id).await;
        }
        if let Some(id) = &progress.dns_id {
            self.stop_and_remove(id).await;
        }
        if progress.internal_network_created {
            self.runtime.delete_network(internal_network).await.ok();
        }
        // The external network is shared; deleting it here on a partial
        // failure would affect other workloads, so teardown of the shared
        // network only happens via `teardown_external_if_unused`.
    }

    async fn stop_and_remove(&self, id: &str) {
        if let Err(e) = self.runtime.stop_container(id, Duration::from_secs(10)).await {
            tracing::warn!(container = %id, error = %e, "best-effort cleanup failed: stop");
        }
        if let Err(e) = self.runtime.remove_container(id).await {
            tracing::warn!(container = %id, error = %e, "best-effort cleanup failed: remove");
        }
    }

    /// Mirror teardown per §4.3: stop main, egress, dns (short grace),
    /// remove all three, delete the internal network. The caller decides
    /// whether the shared external network should also be deleted (only
    /// when no other workload still references it).
    pub async fn teardown(&self, topology: &SandboxTopology, grace: Duration) {
        for id in [&topology.main_id, &topology.egress_id, &topology.dns_id] {
            if let Err(e) = self.runtime.stop_container(id, grace).await {
                tracing::warn!(container = %id, error = %e, "best-effort cleanup failed: stop");
            }
        }
        for id in [&topology.main_id, &topology.egress_id, &topology.dns_id] {
            if let Err(e) = self.runtime.remove_container(id).await {
                tracing::warn!(container = %id, error = %e, "best-effort cleanup failed: remove");
            }
        }
        if let Err(e) = self.runtime.delete_network(&topology.internal_network).await {
            tracing::warn!(network = %topology.internal_network, error = %e, "best-effort cleanup failed: internal network removal");
        }
    }

    /// Delete the shared external network only if no other workload
    /// container still references it.
    pub async fn teardown_external_if_unused(&self, external_network: &str) {
        match self.runtime.list_containers(&labels::format_toolhive_filter()).await {
            Ok(containers) if containers.is_empty() => {
                if let Err(e) = self.runtime.delete_network(external_network).await {
                    tracing::warn!(network = %external_network, error = %e, "best-effort cleanup failed: external network removal");
                }
            }
            Ok(_) => {
                tracing::debug!("external network still referenced by another workload, leaving in place");
            }
            Err(e) => {
                tracing::warn!(error = %e, "best-effort cleanup failed: listing containers before external network removal");
            }
        }
    }
}

/// Inject the proxy/DNS env vars §3/§6 mandate into the main container.
fn inject_proxy_env(env: &mut HashMap<String, String>, egress_name: &str) {
    let proxy_url = format!("http://{}:{}", egress_name, EGRESS_PROXY_PORT);
    for key in ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"] {
        env.insert(key.to_string(), proxy_url.clone());
    }
    let no_proxy = "localhost,127.0.0.1,::1";
    env.insert("NO_PROXY".to_string(), no_proxy.to_string());
    env.insert("no_proxy".to_string(), no_proxy.to_string());
}
