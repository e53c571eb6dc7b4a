//! Murmur IPC
//!
//! JSON-RPC 2.0 over a Unix domain socket. The daemon exposes its API
//! (`tips.*`, `confessions.*`, `users.*`) through this transport; clients
//! send newline-delimited requests and receive responses plus broadcast
//! events on the same connection.

pub mod client;
pub mod namespace;
pub mod protocol;
pub mod server;

pub use client::{IpcClient, IpcError};
pub use namespace::NamespacedHandler;
pub use protocol::{RpcError, RpcEvent, RpcRequest, RpcResponse};
pub use server::{IpcHandler, IpcServer};
