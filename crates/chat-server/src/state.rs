//! Application state

use std::sync::Arc;

use crate::coordinator::ChatCoordinator;
use crate::relay::ChannelRelay;

/// Shared state for HTTP routes and socket handlers
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    coordinator: ChatCoordinator,
    relay: Arc<ChannelRelay>,
}

impl AppState {
    pub fn new(coordinator: ChatCoordinator, relay: Arc<ChannelRelay>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { coordinator, relay }),
        }
    }

    pub fn coordinator(&self) -> &ChatCoordinator {
        &self.inner.coordinator
    }

    /// Channel registry the coordinator relays through
    pub fn relay(&self) -> &Arc<ChannelRelay> {
        &self.inner.relay
    }
}
