//! Append-only record ledger

use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::DepotError;
use crate::filesys::file::File;
use crate::filesys::lock::FileLock;
use crate::ledger::LedgerRecord;

/// Position of a record in its ledger, starting at 1
pub type RecordId = u64;

/// Persisted form of one ledger line
#[derive(Debug, Serialize, Deserialize)]
struct Entry<T> {
    id: RecordId,
    record: T,
}

/// Ordered, append-only store of records.
///
/// Appends are serialized on a writer lock that is held across the persisted
/// write and the in-memory push, so readers only ever observe whole records in
/// insertion order. A file-backed ledger also holds an advisory lock on its
/// file while appending, and first replays whatever other handles (or other
/// processes) appended since it last looked, so ids stay contiguous.
pub struct Ledger<T> {
    name: String,
    journal: Option<Arc<std::sync::Mutex<FileLock>>>,
    entries: RwLock<Vec<Arc<T>>>,
    /// Bytes of the file already replayed into `entries`
    writer: Mutex<u64>,
}

impl<T: LedgerRecord> Ledger<T> {
    /// Create a ledger that lives only in memory
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            journal: None,
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(0),
        }
    }

    /// Open a ledger backed by a JSON-lines file, loading existing records
    pub async fn open(name: impl Into<String>, file: File) -> Result<Self, DepotError> {
        let name = name.into();
        let load_err = |e: DepotError| {
            DepotError::StorageError(format!(
                "unable to load ledger {} from {}: {}",
                name,
                file.path().display(),
                e
            ))
        };

        let journal = FileLock::open(file.path()).await.map_err(load_err)?;
        let ledger = Self {
            name: name.clone(),
            journal: Some(Arc::new(std::sync::Mutex::new(journal))),
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(0),
        };
        ledger.sync().await.map_err(load_err)?;

        info!("Opened ledger {} with {} records", ledger.name, ledger.len());
        Ok(ledger)
    }

    /// Ledger name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate and append a record
    pub async fn append(&self, record: T) -> Result<RecordId, DepotError> {
        record.validate()?;

        let mut offset = self.writer.lock().await;
        let Some(journal) = self.journal.clone() else {
            let id = self.len() as RecordId + 1;
            self.push([record]);
            debug!("Appended record {} to ledger {}", id, self.name);
            return Ok(id);
        };

        let known = self.len() as RecordId;
        let from = *offset;
        let (tail, record, id, end) = tokio::task::spawn_blocking(move || {
            let mut journal = journal.lock().unwrap_or_else(|e| e.into_inner());
            let mut file = journal.hold()?;

            let (tail, end) = read_tail::<T, _>(&mut *file, from)?;
            let id = known + tail.len() as RecordId + 1;

            // drop a torn line left by a writer that died mid-append
            if file.metadata()?.len() > end {
                warn!("Truncating incomplete line at byte {}", end);
                file.set_len(end)?;
            }

            let mut line = serde_json::to_vec(&Entry { id, record: &record })?;
            line.push(b'\n');
            file.seek(SeekFrom::Start(end))?;
            file.write_all(&line)?;
            file.sync_all()?;

            Ok::<_, DepotError>((tail, record, id, end + line.len() as u64))
        })
        .await?
        .map_err(|e| DepotError::StorageError(format!("unable to append to ledger {}: {}", self.name, e)))?;

        self.check_contiguous(&tail)?;
        self.push(tail.into_iter().map(|entry| entry.record).chain([record]));
        *offset = end;

        debug!("Appended record {} to ledger {}", id, self.name);
        Ok(id)
    }

    /// Load records appended to the file through other handles.
    ///
    /// Returns how many were picked up. In-memory ledgers have nothing to sync.
    pub async fn sync(&self) -> Result<usize, DepotError> {
        let Some(journal) = self.journal.clone() else {
            return Ok(0);
        };

        let mut offset = self.writer.lock().await;
        let from = *offset;
        let (tail, end) = tokio::task::spawn_blocking(move || {
            let journal = journal.lock().unwrap_or_else(|e| e.into_inner());
            let file = journal.hold_shared()?;
            read_tail::<T, _>(&*file, from)
        })
        .await??;

        let count = tail.len();
        if count > 0 {
            self.check_contiguous(&tail)?;
            self.push(tail.into_iter().map(|entry| entry.record));
            debug!("Picked up {} records appended to ledger {}", count, self.name);
        }
        *offset = end;
        Ok(count)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if the ledger holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent view of every record appended so far
    pub fn all(&self) -> Snapshot<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Snapshot {
            entries: entries.clone(),
        }
    }

    /// Replayed entries must continue the ids already held
    fn check_contiguous(&self, tail: &[Entry<T>]) -> Result<(), DepotError> {
        let known = self.len() as RecordId;
        for (i, entry) in tail.iter().enumerate() {
            let expected = known + i as RecordId + 1;
            if entry.id != expected {
                return Err(DepotError::StorageError(format!(
                    "ledger {} is out of order: expected record {}, found {}",
                    self.name, expected, entry.id
                )));
            }
        }
        Ok(())
    }

    fn push(&self, records: impl IntoIterator<Item = T>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(records.into_iter().map(Arc::new));
    }
}

/// Complete lines written after `offset`, and the offset just past them
fn read_tail<T: DeserializeOwned, R: Read + Seek>(
    mut reader: R,
    offset: u64,
) -> Result<(Vec<Entry<T>>, u64), DepotError> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    let complete = buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    let entries = buf[..complete]
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| serde_json::from_slice(line).map_err(DepotError::from))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((entries, offset + complete as u64))
}

impl<T: LedgerRecord + Clone> Ledger<T> {
    /// The last `n` records, oldest first
    pub fn list_recent(&self, n: NonZeroUsize) -> Vec<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let start = entries.len().saturating_sub(n.get());
        entries[start..].iter().map(|r| (**r).clone()).collect()
    }
}

/// Point-in-time view of a ledger.
///
/// Records appended after the snapshot was taken are not visible through it,
/// and it can be iterated any number of times.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    entries: Vec<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|r| &**r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a T;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, Arc<T>>, fn(&'a Arc<T>) -> &'a T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().map(unwrap_arc as fn(&'a Arc<T>) -> &'a T)
    }
}

fn unwrap_arc<T>(record: &Arc<T>) -> &T {
    record
}
