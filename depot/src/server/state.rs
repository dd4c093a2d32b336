//! Server state

use std::sync::Arc;

use crate::app::state::AppState;

/// Server state shared across handlers
pub struct ServerState {
    pub app_state: Arc<AppState>,

    /// Builds listed when the caller does not ask for a count
    pub default_window: usize,
}

impl ServerState {
    pub fn new(app_state: Arc<AppState>, default_window: usize) -> Self {
        Self {
            app_state,
            default_window: default_window.max(1),
        }
    }
}
