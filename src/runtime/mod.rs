//! C1 Runtime Adapter: a thin, engine-agnostic capability surface over a
//! Docker-compatible container engine.
//!
//! Everything above this module (permission compiler, sandbox builder,
//! supervisor) talks only to the [`RuntimeAdapter`] trait, never to
//! `bollard` directly, so the engine can be swapped or mocked in tests.

pub mod docker;
pub mod discovery;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Inputs to create a single container. Deliberately flat: the caller
/// (Sandbox Builder) is responsible for translating higher-level concepts
/// (permission profiles, transport modes) into this shape.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<MountSpec>,
    pub network_mode: String,
    pub networks: Vec<String>,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub port_bindings: Vec<(u16, u16)>,
    pub exposed_ports: Vec<u16>,
    pub dns: Vec<String>,
    pub attach_stdio: bool,
    pub restart_unless_stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// A point-in-time snapshot of an engine-visible container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
    pub labels: HashMap<String, String>,
    pub ports: Vec<(u16, u16)>,
    pub created: i64,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// A diffable subset of [`ContainerSpec`] used by `deploy_workload` to
/// decide reuse-vs-recreate. Two specs with equal [`ReconcileKey`]s are
/// considered the same desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileKey {
    pub image: String,
    pub cmd: Vec<String>,
    pub env: std::collections::BTreeSet<(String, String)>,
    pub labels: std::collections::BTreeSet<(String, String)>,
    pub attach_stdio: bool,
    pub network_mode: String,
    pub cap_drop: std::collections::BTreeSet<String>,
    pub cap_add: std::collections::BTreeSet<String>,
    pub security_opt: std::collections::BTreeSet<String>,
    pub mounts: std::collections::BTreeSet<(String, String, bool)>,
    pub exposed_ports: std::collections::BTreeSet<u16>,
    pub port_bindings: std::collections::BTreeSet<(u16, u16)>,
}

impl From<&ContainerSpec> for ReconcileKey {
    fn from(spec: &ContainerSpec) -> Self {
        Self {
            image: spec.image.clone(),
            cmd: spec.cmd.clone(),
            env: spec.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            // Labels are compared as "existing is a superset of desired":
            // callers build the key from the desired spec and check
            // containment, see `docker::labels_are_superset`.
            labels: spec.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            attach_stdio: spec.attach_stdio,
            network_mode: spec.network_mode.clone(),
            cap_drop: spec.cap_drop.iter().cloned().collect(),
            cap_add: spec.cap_add.iter().cloned().collect(),
            security_opt: spec.security_opt.iter().cloned().collect(),
            mounts: spec
                .mounts
                .iter()
                .map(|m| (m.source.clone(), m.target.clone(), m.read_only))
                .collect(),
            exposed_ports: spec.exposed_ports.iter().cloned().collect(),
            port_bindings: spec.port_bindings.iter().cloned().collect(),
        }
    }
}

/// Half of an attached container's stdio.
pub trait AttachedRead: AsyncRead + Send + Unpin {}
impl<T: AsyncRead + Send + Unpin> AttachedRead for T {}

pub trait AttachedWrite: AsyncWrite + Send + Unpin {}
impl<T: AsyncWrite + Send + Unpin> AttachedWrite for T {}

/// The capability surface every sandbox/supervisor operation is built on.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Idempotent create-or-reuse. See §4.1: compares the reconcile key of
    /// `spec` against any existing container of the same name; reuses on
    /// match, otherwise stops+removes+recreates.
    async fn deploy_workload(&self, spec: &ContainerSpec) -> Result<String>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str, grace: std::time::Duration) -> Result<()>;
    /// No-op on not-found. Force removal.
    async fn remove_container(&self, id: &str) -> Result<()>;
    async fn list_containers(&self, label_filter: &str) -> Result<Vec<ContainerInfo>>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;
    async fn is_container_running(&self, id: &str) -> Result<bool>;
    async fn get_container_ip(&self, id: &str, network: &str) -> Result<String>;

    /// Requires the container to already be running; fails with
    /// `ContainerRuntime`/not-running otherwise.
    async fn attach_container(
        &self,
        id: &str,
    ) -> Result<(Box<dyn AttachedWrite>, Box<dyn AttachedRead>)>;

    async fn container_logs(&self, id: &str, follow: bool) -> Result<String>;

    async fn pull_image(&self, image_ref: &str) -> Result<()>;
    async fn image_exists(&self, image_ref: &str) -> Result<bool>;

    /// Idempotent; network-exists is success.
    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        labels: &HashMap<String, String>,
    ) -> Result<()>;
    /// Idempotent; network-not-found is success.
    async fn delete_network(&self, name: &str) -> Result<()>;

    /// Attach an already-created container to an additional network beyond
    /// the one set at creation time (`ContainerSpec::network_mode`). Used
    /// by the Sandbox Builder to put `egress` and `dns` on both networks.
    async fn connect_network(&self, container_id: &str, network_name: &str) -> Result<()>;
}
