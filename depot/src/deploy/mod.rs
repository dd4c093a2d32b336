//! Deployment module

pub mod backups;
pub mod content;
pub mod fsm;
pub mod health;
pub mod manager;
pub mod rollback;

pub use manager::{DeploySettings, DeploymentConfig, DeploymentManager};
pub use rollback::RollbackController;
