//! Namespace routing for IPC handlers.
//!
//! Routes JSON-RPC methods by prefix: `"tips.admit"` → finds the `"tips"`
//! handler and calls `handle("admit", params)`. Methods without a `.` go to
//! an optional default handler (`status` and friends).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::server::{HandlerResult, IpcHandler};

/// Routes incoming method calls to namespace-specific handlers.
///
/// A method like `"tips.admit"` is split on the first `.` into namespace
/// `"tips"` and method `"admit"`. If no handler is registered for the
/// namespace (or the method has no `.`), the default handler is tried.
pub struct NamespacedHandler {
    handlers: HashMap<String, Arc<dyn IpcHandler>>,
    default: Option<Arc<dyn IpcHandler>>,
}

impl NamespacedHandler {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: None,
        }
    }

    /// Register a handler for the given namespace prefix.
    pub fn add_namespace(&mut self, prefix: &str, handler: Arc<dyn IpcHandler>) {
        self.handlers.insert(prefix.to_string(), handler);
    }

    /// Set the default handler for methods without a recognized namespace.
    pub fn set_default(&mut self, handler: Arc<dyn IpcHandler>) {
        self.default = Some(handler);
    }
}

impl Default for NamespacedHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcHandler for NamespacedHandler {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn Future<Output = HandlerResult> + Send + '_>> {
        // Resolve handler + stripped method synchronously to avoid lifetime issues
        let (handler, stripped): (Option<&Arc<dyn IpcHandler>>, String) =
            if let Some((ns, rest)) = method.split_once('.') {
                if let Some(h) = self.handlers.get(ns) {
                    (Some(h), rest.to_string())
                } else {
                    (self.default.as_ref(), method.to_string())
                }
            } else {
                (self.default.as_ref(), method.to_string())
            };

        match handler {
            Some(h) => h.handle(&stripped, params),
            None => {
                let method = method.to_string();
                Box::pin(async move { Err((-32601, format!("unknown method: {}", method))) })
            }
        }
    }
}
