//! HTTP and push-channel surface
//!
//! Thin adapters over the core: handlers validate transport concerns,
//! resolve the principal, and translate typed errors into status codes.
//! Everything interesting happens below this layer.

mod handlers;
mod types;
mod ws;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::auth::{TenantDirectory, TokenStore};
use crate::broadcast::Broadcaster;
use crate::lifecycle::{LifecycleManager, TeamDirectory};
use crate::liveness::LivenessTracker;
use crate::sidecar::SidecarControl;
use crate::store::Database;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    /// Read-only lookup view of the lifecycle manager, for the push channel
    pub directory: Arc<dyn TeamDirectory>,
    pub broadcaster: Arc<Broadcaster>,
    pub liveness: Arc<LivenessTracker>,
    pub sidecar: Arc<SidecarControl>,
    pub store: Database,
    pub tenants: Arc<dyn TenantDirectory>,
    pub tokens: Arc<TokenStore>,
}

impl AppState {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        broadcaster: Arc<Broadcaster>,
        liveness: Arc<LivenessTracker>,
        sidecar: Arc<SidecarControl>,
        store: Database,
        tenants: Arc<dyn TenantDirectory>,
    ) -> Self {
        let directory: Arc<dyn TeamDirectory> = lifecycle.clone();
        Self {
            lifecycle,
            directory,
            broadcaster,
            liveness,
            sidecar,
            store,
            tenants,
            tokens: Arc::new(TokenStore::new()),
        }
    }
}
