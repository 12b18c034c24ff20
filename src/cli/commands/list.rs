//! `list`: enumerate workloads by querying the engine for every
//! toolhive-labeled `main` container, since a CLI invocation cannot see
//! another process's in-memory [`crate::registry::Registry`].

use std::sync::Arc;

use clap::Args;

use crate::error::Result;
use crate::labels;
use crate::runtime::RuntimeAdapter;

/// List running MCP servers
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Show all workloads, not just running ones
    #[arg(short, long)]
    pub all: bool,
}

impl ListCommand {
    pub async fn execute(&self, runtime: Arc<dyn RuntimeAdapter>) -> Result<()> {
        let containers = runtime.list_containers(&labels::format_toolhive_filter()).await?;
        let mains: Vec<_> = containers.into_iter().filter(|c| labels::is_main_container(&c.labels)).collect();

        let mains: Vec<_> = if self.all {
            mains
        } else {
            mains.into_iter().filter(|c| c.status.contains("Up")).collect()
        };

        println!("{:<20} {:<20} {:<40} {:<10} {:<10}", "CONTAINER ID", "NAME", "IMAGE", "TRANSPORT", "STATUS");
        for container in mains {
            println!(
                "{:<20} {:<20} {:<40} {:<10} {:<10}",
                container.id,
                container.name,
                container.image,
                labels::get_transport(&container.labels),
                container.status
            );
        }

        Ok(())
    }
}
