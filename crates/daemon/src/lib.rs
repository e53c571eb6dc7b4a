//! Murmur Daemon
//!
//! Wires the store, chain verifier, rate limiter, and pipelines together
//! and exposes them over the IPC transport:
//!
//! - `tips.admit`: admit a claimed payment as a tip
//! - `confessions.submit` / `confessions.get` / `confessions.top`
//! - `users.get`
//! - `status` (default namespace)

pub mod config;
pub mod handlers;

use std::sync::Arc;

use murmur_ipc::NamespacedHandler;
use murmur_store::TipStore;
use murmur_tips::{ConfessionService, TipPipeline};

pub use config::DaemonConfig;

/// Shared service context behind the IPC surface.
pub struct AppContext {
    pub store: Arc<TipStore>,
    pub pipeline: Arc<TipPipeline>,
    pub confessions: Arc<ConfessionService>,
}

/// Build the namespaced method router over a service context.
pub fn build_router(ctx: &AppContext) -> NamespacedHandler {
    let mut router = NamespacedHandler::new();
    router.add_namespace(
        "tips",
        Arc::new(handlers::TipsHandler {
            pipeline: ctx.pipeline.clone(),
        }),
    );
    router.add_namespace(
        "confessions",
        Arc::new(handlers::ConfessionsHandler {
            confessions: ctx.confessions.clone(),
        }),
    );
    router.add_namespace(
        "users",
        Arc::new(handlers::UsersHandler {
            confessions: ctx.confessions.clone(),
        }),
    );
    router.set_default(Arc::new(handlers::StatusHandler {
        store: ctx.store.clone(),
    }));
    router
}
