//! Build and deployment ledgers

pub mod store;

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::DepotError;
use crate::models::build::BuildRecord;
use crate::models::deployment::DeploymentRecord;

pub use store::{Ledger, RecordId, Snapshot};

/// A record type that can live in a [`Ledger`]
pub trait LedgerRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Reject the record before it touches the ledger
    fn validate(&self) -> Result<(), DepotError> {
        Ok(())
    }
}

impl LedgerRecord for BuildRecord {
    fn validate(&self) -> Result<(), DepotError> {
        BuildRecord::validate(self)
    }
}

impl LedgerRecord for DeploymentRecord {}

/// Ledger of CI build outcomes
pub type BuildLedger = Ledger<BuildRecord>;

/// Ledger of deployment and rollback outcomes
pub type DeploymentLedger = Ledger<DeploymentRecord>;
