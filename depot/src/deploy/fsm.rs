//! Finite State Machine for environment promotion

use serde::{Deserialize, Serialize};

/// Environment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    /// Nothing deployed yet
    Empty,

    /// New content is being written and verified
    Deploying,

    /// Serving committed content
    Deployed,

    /// A backup is being restored
    RollingBack,
}

impl EnvironmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentState::Empty => "empty",
            EnvironmentState::Deploying => "deploying",
            EnvironmentState::Deployed => "deployed",
            EnvironmentState::RollingBack => "rolling_back",
        }
    }
}

/// Environment event
#[derive(Debug, Clone)]
pub enum EnvironmentEvent {
    /// Start a deployment
    Deploy,

    /// New content passed its health check
    Commit,

    /// Attempt abandoned, previous content put back
    Revert(String),

    /// Attempt abandoned, slot content is now unusable
    Discard(String),

    /// Start restoring a backup
    Rollback,

    /// Backup restored and healthy
    Restored,

    /// Backup restored but its health check failed
    RestoredUnhealthy(String),
}

/// Per-environment FSM
#[derive(Debug, Clone)]
pub struct EnvironmentFsm {
    state: EnvironmentState,

    /// Settled state to return to when an attempt is reverted
    settled: EnvironmentState,
    error: Option<String>,
    failure_count: u32,
}

impl EnvironmentFsm {
    /// Create an FSM for an environment that is empty or already deployed
    pub fn new(deployed: bool) -> Self {
        let state = if deployed {
            EnvironmentState::Deployed
        } else {
            EnvironmentState::Empty
        };
        Self {
            state,
            settled: state,
            error: None,
            failure_count: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    /// Get error message of the last failed attempt, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Consecutive failed attempts
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Check if an operation is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            EnvironmentState::Deploying | EnvironmentState::RollingBack
        )
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: EnvironmentEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            // Start of an attempt
            (EnvironmentState::Empty, EnvironmentEvent::Deploy)
            | (EnvironmentState::Deployed, EnvironmentEvent::Deploy) => {
                self.settled = self.state;
                EnvironmentState::Deploying
            }
            (EnvironmentState::Empty, EnvironmentEvent::Rollback)
            | (EnvironmentState::Deployed, EnvironmentEvent::Rollback) => {
                self.settled = self.state;
                EnvironmentState::RollingBack
            }

            // From Deploying
            (EnvironmentState::Deploying, EnvironmentEvent::Commit) => {
                self.error = None;
                self.failure_count = 0;
                EnvironmentState::Deployed
            }
            (EnvironmentState::Deploying, EnvironmentEvent::Discard(err)) => {
                self.error = Some(err.clone());
                self.failure_count += 1;
                EnvironmentState::Empty
            }

            // From RollingBack
            (EnvironmentState::RollingBack, EnvironmentEvent::Restored) => {
                self.error = None;
                self.failure_count = 0;
                EnvironmentState::Deployed
            }
            (EnvironmentState::RollingBack, EnvironmentEvent::RestoredUnhealthy(err)) => {
                self.error = Some(err.clone());
                self.failure_count += 1;
                EnvironmentState::Deployed
            }

            // Either attempt can be reverted
            (EnvironmentState::Deploying, EnvironmentEvent::Revert(err))
            | (EnvironmentState::RollingBack, EnvironmentEvent::Revert(err)) => {
                self.error = Some(err.clone());
                self.failure_count += 1;
                self.settled
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        if !self.is_busy() {
            self.settled = new_state;
        }
        Ok(())
    }
}

impl Default for EnvironmentFsm {
    fn default() -> Self {
        Self::new(false)
    }
}
