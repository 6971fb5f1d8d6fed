//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the position store, the update bus linking the ingester to the
//! WebSocket sessions, the auth gate, and the shutdown broadcast that
//! every live session subscribes to.
//!
//! The store is optional: an open failure at startup is logged and the
//! server comes up anyway, with store-backed endpoints reporting that the
//! store is not initialised.

use tokio::sync::broadcast;

use crate::services::auth::AuthGate;
use crate::services::store::{Store, StoreError};
use crate::services::updates::UpdateBus;

/// Shared application state, injected into Axum handlers via the State
/// extractor. Clone is required by Axum; all inner fields are cheap clones.
#[derive(Clone)]
pub struct AppState {
    /// Position store. `None` when the database failed to open.
    pub store: Option<Store>,
    /// Ingest-tick notifications for WebSocket sessions.
    pub updates: UpdateBus,
    /// Session token signing and validation.
    pub auth: AuthGate,
    /// Graceful-shutdown notice; each WS session holds a receiver.
    pub shutdown: broadcast::Sender<()>,
    /// OpenTelemetry collector base URL for the frontend trace proxy.
    pub otel_collector: Option<String>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Option<Store>, auth: AuthGate, otel_collector: Option<String>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self { store, updates: UpdateBus::new(), auth, shutdown, otel_collector }
    }

    /// The store, or the not-initialised error callers surface as a 500.
    pub fn store(&self) -> Result<&Store, StoreError> {
        self.store.as_ref().ok_or(StoreError::NotInitialised)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_accessor_reports_not_initialised() {
        let state = test_helpers::test_app_state_without_store();
        assert!(matches!(state.store(), Err(StoreError::NotInitialised)));

        let state = test_helpers::test_app_state().await;
        assert!(state.store().is_ok());
    }
}
