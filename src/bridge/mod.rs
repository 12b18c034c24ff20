//! C4 Protocol Bridge: HTTP/SSE front door bridging a single stdio MCP
//! server to the outside world (§3, §4.4, §6).

pub mod bridge;
pub mod jsonrpc;
pub mod middleware;
pub mod sse;

pub use bridge::Bridge;
pub use jsonrpc::{JsonRpcError, JsonRpcMessage};
pub use middleware::{Middleware, MiddlewareChain};
pub use sse::{PendingBuffer, PendingMessage, SseClient, SseMessage};
