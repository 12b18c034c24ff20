//! toolhive-runtime: a container-engine reconciler, permission compiler,
//! sandbox builder and HTTP/SSE<->stdio protocol bridge for running MCP
//! (Model Context Protocol) servers in an isolated, egress-filtered sandbox.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod labels;
pub mod networking;
pub mod permissions;
pub mod registry;
pub mod runtime;
pub mod sandbox;
pub mod supervisor;
pub mod workload;
