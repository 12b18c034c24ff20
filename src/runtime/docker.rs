//! `bollard`-backed implementation of [`RuntimeAdapter`]. Works against both
//! Docker and rootless Podman, since both speak the Docker-compatible
//! engine API bollard targets; the only difference is which socket we dial.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CreateImageOptions, InspectImageOptions};
use bollard::models::{
    HostConfig, Mount, MountTypeEnum, PortBinding as BollardPortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions};
use bollard::Docker;
use futures::stream::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{Error, Result};
use crate::runtime::discovery::candidate_sockets;
use crate::runtime::{AttachedRead, AttachedWrite, ContainerInfo, ContainerSpec, ReconcileKey, RuntimeAdapter};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct DockerAdapter {
    client: Docker,
}

impl DockerAdapter {
    /// Connect using the first candidate socket that answers a ping,
    /// honouring an explicit override if given.
    pub async fn connect(socket_override: Option<std::path::PathBuf>) -> Result<Self> {
        if let Some(path) = socket_override {
            return Self::connect_socket(&path).await;
        }

        let mut last_err = None;
        for candidate in candidate_sockets() {
            if !candidate.exists() {
                continue;
            }
            match Self::connect_socket(&candidate).await {
                Ok(adapter) => return Ok(adapter),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::EngineUnavailable("no container engine socket responded to ping".into())
        }))
    }

    async fn connect_socket(path: &std::path::Path) -> Result<Self> {
        let client = Docker::connect_with_socket(
            &path.to_string_lossy(),
            DEFAULT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| Error::EngineUnavailable(e.to_string()))?;

        client
            .ping()
            .await
            .map_err(|e| Error::EngineUnavailable(e.to_string()))?;

        tracing::debug!(socket = %path.display(), "connected to container engine");
        Ok(Self { client })
    }

    fn labels_filter(label_filter: &str) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label_filter.to_string()]);
        filters
    }

    fn to_host_config(spec: &ContainerSpec) -> HostConfig {
        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let port_bindings = if spec.port_bindings.is_empty() {
            None
        } else {
            let mut map: HashMap<String, Option<Vec<BollardPortBinding>>> = HashMap::new();
            for (host_port, container_port) in &spec.port_bindings {
                map.insert(
                    format!("{}/tcp", container_port),
                    Some(vec![BollardPortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(host_port.to_string()),
                    }]),
                );
            }
            Some(map)
        };

        HostConfig {
            mounts: if mounts.is_empty() { None } else { Some(mounts) },
            network_mode: Some(spec.network_mode.clone()),
            cap_drop: if spec.cap_drop.is_empty() { None } else { Some(spec.cap_drop.clone()) },
            cap_add: if spec.cap_add.is_empty() { None } else { Some(spec.cap_add.clone()) },
            security_opt: if spec.security_opt.is_empty() {
                None
            } else {
                Some(spec.security_opt.clone())
            },
            port_bindings,
            dns: if spec.dns.is_empty() { None } else { Some(spec.dns.clone()) },
            restart_policy: if spec.restart_unless_stopped {
                Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                })
            } else {
                None
            },
            ..Default::default()
        }
    }

    fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
        let exposed_ports = if spec.exposed_ports.is_empty() {
            None
        } else {
            Some(
                spec.exposed_ports
                    .iter()
                    .map(|p| (format!("{}/tcp", p), HashMap::new()))
                    .collect(),
            )
        };

        Config {
            image: Some(spec.image.clone()),
            cmd: if spec.cmd.is_empty() { None } else { Some(spec.cmd.clone()) },
            env: Some(spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
            labels: Some(spec.labels.clone()),
            attach_stdin: Some(spec.attach_stdio),
            attach_stdout: Some(spec.attach_stdio),
            attach_stderr: Some(spec.attach_stdio),
            open_stdin: Some(spec.attach_stdio),
            tty: Some(false),
            exposed_ports,
            host_config: Some(Self::to_host_config(spec)),
            ..Default::default()
        }
    }

    fn existing_key(info: &bollard::models::ContainerInspectResponse) -> ReconcileKey {
        let config = info.config.clone().unwrap_or_default();
        let host_config = info.host_config.clone().unwrap_or_default();

        let env: std::collections::BTreeSet<(String, String)> = config
            .env
            .unwrap_or_default()
            .iter()
            .filter_map(|kv| kv.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let labels: std::collections::BTreeSet<(String, String)> = config
            .labels
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mounts: std::collections::BTreeSet<(String, String, bool)> = host_config
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| {
                (
                    m.source.unwrap_or_default(),
                    m.target.unwrap_or_default(),
                    m.read_only.unwrap_or(false),
                )
            })
            .collect();

        ReconcileKey {
            image: config.image.unwrap_or_default(),
            cmd: config.cmd.unwrap_or_default(),
            env,
            labels,
            attach_stdio: config.attach_stdin.unwrap_or(false),
            network_mode: host_config.network_mode.unwrap_or_default(),
            cap_drop: host_config.cap_drop.unwrap_or_default().into_iter().collect(),
            cap_add: host_config.cap_add.unwrap_or_default().into_iter().collect(),
            security_opt: host_config.security_opt.unwrap_or_default().into_iter().collect(),
            mounts,
            exposed_ports: config
                .exposed_ports
                .unwrap_or_default()
                .keys()
                .filter_map(|p| p.split('/').next().and_then(|s| s.parse().ok()))
                .collect(),
            port_bindings: std::collections::BTreeSet::new(),
        }
    }

    /// True if `existing` contains at least every key-value pair in
    /// `desired` ("labels as superset", per §4.1).
    fn labels_are_superset(
        existing: &std::collections::BTreeSet<(String, String)>,
        desired: &std::collections::BTreeSet<(String, String)>,
    ) -> bool {
        desired.iter().all(|pair| existing.contains(pair))
    }
}

#[async_trait]
impl RuntimeAdapter for DockerAdapter {
    async fn deploy_workload(&self, spec: &ContainerSpec) -> Result<String> {
        if !self.image_exists(&spec.image).await? {
            self.pull_image(&spec.image).await?;
        }

        let existing = self.client.inspect_container(&spec.name, None::<InspectContainerOptions>).await;

        match existing {
            Ok(info) => {
                let existing_key = Self::existing_key(&info);
                let desired_key = ReconcileKey::from(spec);
                let matches = existing_key.image == desired_key.image
                    && existing_key.cmd == desired_key.cmd
                    && existing_key.env == desired_key.env
                    && Self::labels_are_superset(&existing_key.labels, &desired_key.labels)
                    && existing_key.attach_stdio == desired_key.attach_stdio
                    && existing_key.network_mode == desired_key.network_mode
                    && existing_key.cap_drop == desired_key.cap_drop
                    && existing_key.cap_add == desired_key.cap_add
                    && existing_key.security_opt == desired_key.security_opt
                    && existing_key.mounts == desired_key.mounts
                    && existing_key.exposed_ports == desired_key.exposed_ports;

                let id = info.id.clone().unwrap_or_else(|| spec.name.clone());
                if matches {
                    tracing::debug!(container = %spec.name, "deploy_workload: reusing matching container");
                    if !self.is_container_running(&id).await? {
                        self.start_container(&id).await?;
                    }
                    Ok(id)
                } else {
                    tracing::info!(container = %spec.name, "deploy_workload: spec changed, recreating container");
                    self.stop_container(&id, Duration::from_secs(10)).await.ok();
                    self.remove_container(&id).await?;
                    let new_id = self.create_container(spec).await?;
                    self.start_container(&new_id).await?;
                    Ok(new_id)
                }
            }
            Err(_) => {
                let id = self.create_container(spec).await?;
                self.start_container(&id).await?;
                Ok(id)
            }
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Self::to_bollard_config(spec);

        let result = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(|e| Error::ContainerRuntime(e.to_string()))?;

        Ok(result.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        if self.is_container_running(id).await.unwrap_or(false) {
            return Ok(());
        }
        self.client
            .start_container::<String>(id, None)
            .await
            .map_err(|e| Error::ContainerRuntime(e.to_string()))?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()> {
        match self
            .client
            .stop_container(id, Some(StopContainerOptions { t: grace.as_secs() as i64 }))
            .await
        {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(Error::ContainerRuntime(e.to_string())),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        match self
            .client
            .remove_container(id, Some(RemoveContainerOptions { force: true, v: true, link: false }))
            .await
        {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => Err(Error::ContainerRuntime(e.to_string())),
        }
    }

    async fn list_containers(&self, label_filter: &str) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions {
            all: true,
            filters: Self::labels_filter(label_filter),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::ContainerRuntime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches('/')
                    .to_string(),
                image: c.image.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| Some((p.public_port?, p.private_port)))
                    .collect(),
                created: c.created.unwrap_or(0),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let info = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError { status_code: 404, .. } => {
                    Error::NotFound(id.to_string())
                }
                other => Error::ContainerRuntime(other.to_string()),
            })?;

        let state = info.state.clone().unwrap_or_default();
        let name = info.name.clone().unwrap_or_default();

        Ok(ContainerInfo {
            id: info.id.clone().unwrap_or_default(),
            name: name.trim_start_matches('/').to_string(),
            image: info.config.as_ref().and_then(|c| c.image.clone()).unwrap_or_default(),
            status: state.status.map(|s| format!("{:?}", s)).unwrap_or_default(),
            state: if state.running.unwrap_or(false) { "running".to_string() } else { "exited".to_string() },
            labels: info.config.and_then(|c| c.labels).unwrap_or_default(),
            ports: vec![],
            created: 0,
        })
    }

    async fn is_container_running(&self, id: &str) -> Result<bool> {
        match self.inspect_container(id).await {
            Ok(info) => Ok(info.is_running()),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_container_ip(&self, id: &str, network: &str) -> Result<String> {
        let info = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| Error::ContainerRuntime(e.to_string()))?;

        let networks = info
            .network_settings
            .and_then(|ns| ns.networks)
            .ok_or_else(|| Error::ContainerRuntime(format!("no network settings for {}", id)))?;

        networks
            .get(network)
            .and_then(|n| n.ip_address.clone())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| {
                Error::ContainerRuntime(format!("container {} has no IP on network {}", id, network))
            })
    }

    async fn attach_container(
        &self,
        id: &str,
    ) -> Result<(Box<dyn AttachedWrite>, Box<dyn AttachedRead>)> {
        if !self.is_container_running(id).await? {
            return Err(Error::ContainerRuntime(format!("container {} is not running", id)));
        }

        let AttachContainerResults { output, input } = self
            .client
            .attach_container(
                id,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    logs: Some(false),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::ContainerRuntime(e.to_string()))?;

        Ok((Box::new(AttachWriter { inner: input }), Box::new(AttachReader { inner: output })))
    }

    async fn container_logs(&self, id: &str, follow: bool) -> Result<String> {
        let mut stream = self.client.logs(
            id,
            Some(LogsOptions::<String> {
                follow,
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(log) => out.push_str(&log.to_string()),
                Err(e) => return Err(Error::ContainerRuntime(e.to_string())),
            }
        }
        Ok(out)
    }

    async fn pull_image(&self, image_ref: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image_ref.to_string(),
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(event) = stream.next().await {
            if let Err(e) = event {
                return Err(Error::ImagePullFailed(format!("{}: {}", image_ref, e)));
            }
        }
        Ok(())
    }

    async fn image_exists(&self, image_ref: &str) -> Result<bool> {
        match self
            .client
            .inspect_image(image_ref)
            .await
        {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(false),
            Err(e) => Err(Error::ContainerRuntime(e.to_string())),
        }
    }

    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        labels: &HashMap<String, String>,
    ) -> Result<()> {
        if self
            .client
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
            .is_ok()
        {
            return Ok(());
        }

        match self
            .client
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                driver: "bridge".to_string(),
                internal,
                labels: labels.clone(),
                ..Default::default()
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::ContainerRuntime(e.to_string())),
        }
    }

    async fn delete_network(&self, name: &str) -> Result<()> {
        match self.client.remove_network(name).await {
            Ok(_) => Ok(()),
            Err(BollardError::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(e) => {
                tracing::warn!(network = %name, error = %e, "best-effort cleanup failed: network removal");
                Ok(())
            }
        }
    }

    async fn connect_network(&self, container_id: &str, network_name: &str) -> Result<()> {
        match self
            .client
            .connect_network(
                network_name,
                ConnectNetworkOptions { container: container_id.to_string(), ..Default::default() },
            )
            .await
        {
            Ok(_) => Ok(()),
            // already connected: treat as success, matches the idempotence
            // the rest of the adapter's operations maintain.
            Err(BollardError::DockerResponseServerError { status_code: 403, .. }) => Ok(()),
            Err(e) => Err(Error::ContainerRuntime(e.to_string())),
        }
    }
}

/// Wraps bollard's boxed attach output stream as `AsyncRead`.
struct AttachReader {
    inner: Pin<Box<dyn futures::Stream<Item = std::result::Result<bollard::container::LogOutput, BollardError>> + Send>>,
}

impl AsyncRead for AttachReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.inner.as_mut().poll_next(cx) {
            std::task::Poll::Ready(Some(Ok(log))) => {
                let bytes = log.into_bytes();
                let n = bytes.len().min(buf.remaining());
                buf.put_slice(&bytes[..n]);
                std::task::Poll::Ready(Ok(()))
            }
            std::task::Poll::Ready(Some(Err(e))) => {
                std::task::Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, e)))
            }
            std::task::Poll::Ready(None) => std::task::Poll::Ready(Ok(())),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

/// Wraps bollard's pinned-box attach input sink as `AsyncWrite`.
struct AttachWriter {
    inner: Pin<Box<dyn AsyncWrite + Send>>,
}

impl AsyncWrite for AttachWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        self.inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_shutdown(cx)
    }
}
