pub mod list;
pub mod rm;
pub mod run;
pub mod start;
pub mod stop;

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mockall::predicate::*;
    use mockall::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::error::Result;
    use crate::runtime::{AttachedRead, AttachedWrite, ContainerInfo, ContainerSpec, RuntimeAdapter};

    mock! {
        pub RuntimeAdapter {}

        #[async_trait]
        impl RuntimeAdapter for RuntimeAdapter {
            async fn deploy_workload(&self, spec: &ContainerSpec) -> Result<String>;
            async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;
            async fn start_container(&self, id: &str) -> Result<()>;
            async fn stop_container(&self, id: &str, grace: Duration) -> Result<()>;
            async fn remove_container(&self, id: &str) -> Result<()>;
            async fn list_containers(&self, label_filter: &str) -> Result<Vec<ContainerInfo>>;
            async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;
            async fn is_container_running(&self, id: &str) -> Result<bool>;
            async fn get_container_ip(&self, id: &str, network: &str) -> Result<String>;
            async fn attach_container(&self, id: &str) -> Result<(Box<dyn AttachedWrite>, Box<dyn AttachedRead>)>;
            async fn container_logs(&self, id: &str, follow: bool) -> Result<String>;
            async fn pull_image(&self, image_ref: &str) -> Result<()>;
            async fn image_exists(&self, image_ref: &str) -> Result<bool>;
            async fn create_network(&self, name: &str, internal: bool, labels: &HashMap<String, String>) -> Result<()>;
            async fn delete_network(&self, name: &str) -> Result<()>;
            async fn connect_network(&self, container_id: &str, network_name: &str) -> Result<()>;
        }
    }

    pub fn create_mock_runtime() -> MockRuntimeAdapter {
        MockRuntimeAdapter::new()
    }

    pub fn create_test_container_info(id: &str, name: &str, status: &str) -> ContainerInfo {
        let state = if status.starts_with("Up") {
            "running".to_string()
        } else if status.starts_with("Exited") || status.starts_with("Dead") {
            "exited".to_string()
        } else {
            "unknown".to_string()
        };

        ContainerInfo {
            id: id.to_string(),
            name: name.to_string(),
            image: "test-image".to_string(),
            status: status.to_string(),
            state,
            created: 0,
            labels: HashMap::new(),
            ports: vec![(8080, 8080)],
        }
    }
}
