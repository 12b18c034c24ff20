//! C2 Permission Compiler: translates a declarative [`profile::PermissionProfile`]
//! into engine-level primitives (Output A) and an egress ACL document
//! (Output B, see [`compiler`]).

pub mod compiler;
pub mod profile;

pub use profile::{ContainerPermissionConfig, NetworkPermissions, OutboundNetworkPermissions, PermissionProfile};
