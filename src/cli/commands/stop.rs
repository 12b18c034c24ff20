//! `stop`: resolve a workload by name or container-id prefix directly
//! against the engine (§4.6's registry resolution rule, applied without a
//! live in-process [`Registry`] since a CLI invocation is a fresh process).

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::error::{Error, Result};
use crate::labels;
use crate::runtime::{ContainerInfo, RuntimeAdapter};

/// Stop an MCP server
#[derive(Args, Debug)]
pub struct StopCommand {
    /// Name or ID of the MCP server to stop
    pub name_or_id: String,
}

impl StopCommand {
    pub async fn execute(&self, runtime: Arc<dyn RuntimeAdapter>) -> Result<()> {
        let container = resolve_main_container(runtime.as_ref(), &self.name_or_id).await?;
        runtime.stop_container(&container.id, Duration::from_secs(30)).await?;
        println!("MCP server {} stopped", container.name);
        Ok(())
    }
}

/// Find the `main` container belonging to a workload by exact name first,
/// falling back to a container-id prefix match; ambiguous prefixes are an
/// error (mirrors [`crate::registry::Registry::resolve`]'s policy).
pub async fn resolve_main_container(runtime: &dyn RuntimeAdapter, name_or_id: &str) -> Result<ContainerInfo> {
    let containers = runtime.list_containers(&labels::format_toolhive_filter()).await?;
    let mains: Vec<_> = containers.into_iter().filter(|c| labels::is_main_container(&c.labels)).collect();

    if let Some(exact) = mains.iter().find(|c| c.name == name_or_id) {
        return Ok(exact.clone());
    }

    let mut prefix_matches: Vec<_> = mains.into_iter().filter(|c| c.id.starts_with(name_or_id)).collect();
    match prefix_matches.len() {
        0 => Err(Error::NotFound(name_or_id.to_string())),
        1 => Ok(prefix_matches.remove(0)),
        n => Err(Error::InvalidArgument(format!(
            "ambiguous workload reference {:?}: matches {} containers",
            name_or_id, n
        ))),
    }
}
