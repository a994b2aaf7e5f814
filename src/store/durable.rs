use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::wal::{Record, Wal};
use super::{DocumentStore, StoreError};
use crate::observability;

/// Document store backed by an append-only log.
///
/// Reads are served from memory. Writes hold the log lock across the
/// existence check, append, fsync and in-memory apply, so the log order is
/// the order in which writes became visible.
pub struct LogStore<D> {
    documents: DashMap<String, D>,
    wal: Mutex<Wal>,
}

/// Apply a replayed record. Records that do not fit the current state
/// (update of a deleted id, second create) are skipped.
fn apply_record<D>(documents: &DashMap<String, D>, record: Record<D>) {
    match record {
        Record::Created { id, document } => {
            documents.entry(id).or_insert(document);
        }
        Record::Updated { id, document } => {
            if let Some(mut slot) = documents.get_mut(&id) {
                *slot = document;
            }
        }
        Record::Deleted { id } => {
            documents.remove(&id);
        }
    }
}

impl<D> LogStore<D>
where
    D: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open the log at `path`, replaying every record into memory.
    pub fn open(path: &Path) -> io::Result<Self> {
        let replay = Wal::replay::<D>(path)?;
        let records = replay.records;
        let replayed = records.len();
        let wal = Wal::open(path, replay.valid_len)?;

        let documents = DashMap::new();
        for record in records {
            apply_record(&documents, record);
        }
        info!(
            "replayed {replayed} records from {}, {} documents live",
            path.display(),
            documents.len()
        );

        let store = Self {
            documents,
            wal: Mutex::new(wal),
        };
        store.report_size();
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.wal.lock().await.appends_since_compact()
    }

    /// Rewrite the log as one `Created` record per live document.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let mut wal = self.wal.lock().await;
        let snapshot: Vec<Record<D>> = self
            .documents
            .iter()
            .map(|e| Record::Created {
                id: e.key().clone(),
                document: e.value().clone(),
            })
            .collect();
        wal.compact(&snapshot)?;
        info!("compacted {} to {} records", wal.path().display(), snapshot.len());
        Ok(())
    }

    /// Append and sync one record. A failed append leaves the log as it was.
    fn commit(wal: &mut Wal, record: &Record<D>) -> Result<(), StoreError> {
        let flush_start = Instant::now();
        let appended = wal.append(record);
        metrics::histogram!(observability::LOG_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        appended.map_err(StoreError::from)
    }

    fn report_size(&self) {
        metrics::gauge!(observability::AMBULANCES_ACTIVE).set(self.documents.len() as f64);
    }
}

#[async_trait]
impl<D> DocumentStore<D> for LogStore<D>
where
    D: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn create(&self, id: &str, document: &D) -> Result<(), StoreError> {
        let mut wal = self.wal.lock().await;
        if self.documents.contains_key(id) {
            return Err(StoreError::AlreadyExists);
        }
        let record = Record::Created {
            id: id.to_string(),
            document: document.clone(),
        };
        Self::commit(&mut wal, &record)?;
        apply_record(&self.documents, record);
        self.report_size();
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<D, StoreError> {
        self.documents
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: &str, document: &D) -> Result<(), StoreError> {
        let mut wal = self.wal.lock().await;
        if !self.documents.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        let record = Record::Updated {
            id: id.to_string(),
            document: document.clone(),
        };
        Self::commit(&mut wal, &record)?;
        apply_record(&self.documents, record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut wal = self.wal.lock().await;
        if !self.documents.contains_key(id) {
            return Err(StoreError::NotFound);
        }
        let record = Record::Deleted { id: id.to_string() };
        Self::commit(&mut wal, &record)?;
        apply_record(&self.documents, record);
        self.report_size();
        Ok(())
    }
}

/// Background task that compacts the log once enough appends piled up.
pub async fn run_compactor<D>(store: Arc<LogStore<D>>, threshold: u64, shutdown: CancellationToken)
where
    D: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        let appends = store.appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact().await {
            Ok(()) => info!("compaction after {appends} appends"),
            Err(e) => tracing::error!("compaction failed: {e}"),
        }
    }
}
