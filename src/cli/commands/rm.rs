//! `rm`: tear down one workload's full sandbox (main, egress, dns
//! containers and its internal network), not just the main container.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::cli::commands::stop::resolve_main_container;
use crate::error::{Error, Result};
use crate::labels;
use crate::runtime::RuntimeAdapter;
use crate::workload::Names;

/// Remove an MCP server
#[derive(Args, Debug)]
pub struct RemoveCommand {
    /// Name or ID of the MCP server to remove
    pub name_or_id: String,

    /// Force removal of a running workload
    #[arg(short, long)]
    pub force: bool,
}

impl RemoveCommand {
    pub async fn execute(&self, runtime: Arc<dyn RuntimeAdapter>) -> Result<()> {
        let main = resolve_main_container(runtime.as_ref(), &self.name_or_id).await?;

        let is_running = runtime.is_container_running(&main.id).await?;
        if is_running && !self.force {
            return Err(Error::ContainerRuntime(format!(
                "workload {} is running. Use --force to remove it",
                main.name
            )));
        }

        let workload_name = labels::get_workload_name(&main.labels).unwrap_or(&main.name).to_string();

        for sibling_name in [Names::egress(&workload_name), Names::dns(&workload_name)] {
            if let Some(sibling) = find_by_name(runtime.as_ref(), &workload_name, &sibling_name).await? {
                runtime.stop_container(&sibling.id, Duration::from_secs(10)).await.ok();
                runtime.remove_container(&sibling.id).await.ok();
            }
        }

        runtime.stop_container(&main.id, Duration::from_secs(10)).await.ok();
        runtime.remove_container(&main.id).await?;

        let internal_network = Names::internal_network(&workload_name);
        runtime.delete_network(&internal_network).await.ok();

        println!("MCP server {} removed", main.name);
        Ok(())
    }
}

async fn find_by_name(
    runtime: &dyn RuntimeAdapter,
    workload_name: &str,
    container_name: &str,
) -> Result<Option<crate::runtime::ContainerInfo>> {
    let containers = runtime.list_containers(&labels::format_workload_filter(workload_name)).await?;
    Ok(containers.into_iter().find(|c| c.name == container_name))
}
