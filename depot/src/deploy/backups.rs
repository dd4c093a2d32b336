//! Bounded per-environment backup set

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::models::deployment::{Backup, Environment};

/// Default number of backups kept per environment
pub const DEFAULT_BACKUP_RETENTION: usize = 5;

/// Backups of one environment, oldest first.
///
/// Ordering is by `created_at`, ties broken by insertion order.
#[derive(Debug, Clone)]
pub struct BackupSet {
    environment: Environment,
    retention: usize,
    backups: Vec<Backup>,
    next_seq: u64,
}

impl BackupSet {
    /// Create an empty set; a retention of zero is treated as one
    pub fn new(environment: Environment, retention: usize) -> Self {
        Self {
            environment,
            retention: retention.max(1),
            backups: Vec::new(),
            next_seq: 0,
        }
    }

    /// Rebuild a set from previously persisted backups
    pub fn from_existing(environment: Environment, retention: usize, mut backups: Vec<Backup>) -> Self {
        backups.sort_by_key(|b| (b.created_at, b.seq));
        let next_seq = backups.iter().map(|b| b.seq + 1).max().unwrap_or(0);
        Self {
            environment,
            retention: retention.max(1),
            backups,
            next_seq,
        }
    }

    /// Record a new backup and return the ones evicted to stay within retention
    pub fn insert(
        &mut self,
        created_at: DateTime<Utc>,
        content_ref: PathBuf,
        version: Option<String>,
    ) -> (Backup, Vec<Backup>) {
        let backup = Backup {
            environment: self.environment,
            created_at,
            content_ref,
            version,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        self.backups.push(backup.clone());
        self.backups.sort_by_key(|b| (b.created_at, b.seq));

        let excess = self.backups.len().saturating_sub(self.retention);
        let evicted = self.backups.drain(..excess).collect();
        (backup, evicted)
    }

    /// Most recent backup
    pub fn latest(&self) -> Option<&Backup> {
        self.backups.last()
    }

    pub fn list(&self) -> &[Backup] {
        &self.backups
    }

    pub fn len(&self) -> usize {
        self.backups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}
