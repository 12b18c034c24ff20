//! CLI module for the toolhive workload runtime.
//!
//! This module handles the command-line interface: argument parsing only.
//! Dispatch and execution live in [`commands`].

pub mod commands;

use clap::{Parser, Subcommand};

use commands::list::ListCommand;
use commands::rm::RemoveCommand;
use commands::run::RunCommand;
use commands::start::StartCommand;
use commands::stop::StopCommand;

/// toolhive-rt runs MCP servers inside an isolated, egress-filtered sandbox.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

/// Supported subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an MCP server in the foreground
    Run(RunCommand),

    /// Start an MCP server and return immediately
    Start(StartCommand),

    /// List running MCP servers
    List(ListCommand),

    /// Stop an MCP server
    Stop(StopCommand),

    /// Remove an MCP server
    Rm(RemoveCommand),

    /// Show the current version
    Version,
}

/// Parse command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}
