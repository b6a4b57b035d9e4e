//! Append-only metric storage, one JSON record per line, one file per turbine.
//!
//! Layout under the data directory:
//!
//! ```text
//! data/metrics_data/
//!   turbine_1.jsonl
//!   turbine_2.jsonl
//!   ...
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::retry::Transient;
use crate::types::{MetricRecord, TurbineId};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(..))
    }
}

/// Trait for pluggable metric persistence backends.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
    /// Append one record to the turbine's segment.
    async fn append(&self, turbine_id: TurbineId, record: &MetricRecord) -> Result<(), StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
impl<S: MetricStore + ?Sized> MetricStore for std::sync::Arc<S> {
    async fn append(&self, turbine_id: TurbineId, record: &MetricRecord) -> Result<(), StoreError> {
        (**self).append(turbine_id, record).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

// ============================================================================
// JSON-lines files
// ============================================================================

/// Durable store writing `turbine_<id>.jsonl` files.
#[derive(Debug, Clone)]
pub struct JsonlMetricStore {
    dir: PathBuf,
}

impl JsonlMetricStore {
    /// Create the data directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(dir.clone(), e))?;
        debug!(dir = %dir.display(), "Metric store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the segment holding one turbine's records.
    pub fn segment_path(&self, turbine_id: TurbineId) -> PathBuf {
        self.dir.join(format!("turbine_{turbine_id}.jsonl"))
    }

    /// Read back every record stored for a turbine, oldest first.
    pub async fn read_turbine(&self, turbine_id: TurbineId) -> Result<Vec<MetricRecord>, StoreError> {
        let path = self.segment_path(turbine_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(path, e)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl MetricStore for JsonlMetricStore {
    async fn append(&self, turbine_id: TurbineId, record: &MetricRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let path = self.segment_path(turbine_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Io(path.clone(), e))?;

        // Single write so a record is never split across two appends.
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::Io(path.clone(), e))?;
        file.flush().await.map_err(|e| StoreError::Io(path, e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory store for testing and dry runs.
///
/// Thread-safe via `RwLock`. Not durable; data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryMetricStore {
    segments: std::sync::RwLock<HashMap<TurbineId, Vec<MetricRecord>>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record stored for a turbine, oldest first.
    pub fn records(&self, turbine_id: TurbineId) -> Vec<MetricRecord> {
        self.segments
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&turbine_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Ids of every turbine with at least one record, ascending.
    pub fn turbine_ids(&self) -> Vec<TurbineId> {
        let segments = self
            .segments
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut ids: Vec<TurbineId> = segments.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn total_records(&self) -> usize {
        self.segments
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn append(&self, turbine_id: TurbineId, record: &MetricRecord) -> Result<(), StoreError> {
        self.segments
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(turbine_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationalStatus;

    fn record(turbine_id: TurbineId, status: OperationalStatus, ts: f64) -> MetricRecord {
        MetricRecord {
            turbine_id,
            wind_speed: 20.0,
            power_output_kwh: 700.0,
            status,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonlMetricStore::open(tmp.path().join("metrics")).unwrap();

        store.append(1, &record(1, OperationalStatus::Ok, 1.0)).await.unwrap();
        store.append(1, &record(1, OperationalStatus::Broken, 2.0)).await.unwrap();

        let raw = std::fs::read_to_string(store.segment_path(1)).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.lines().next().unwrap().contains("\"operational_status\":\"ok\""));

        let records = store.read_turbine(1).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, OperationalStatus::Broken);
    }

    #[tokio::test]
    async fn test_jsonl_segments_per_turbine() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonlMetricStore::open(tmp.path()).unwrap();

        store.append(1, &record(1, OperationalStatus::Ok, 1.0)).await.unwrap();
        store.append(2, &record(2, OperationalStatus::Ok, 1.0)).await.unwrap();
        store.append(2, &record(2, OperationalStatus::Ok, 2.0)).await.unwrap();

        assert!(tmp.path().join("turbine_1.jsonl").exists());
        assert_eq!(store.read_turbine(1).await.unwrap().len(), 1);
        assert_eq!(store.read_turbine(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = JsonlMetricStore::open(tmp.path()).unwrap();
            store.append(3, &record(3, OperationalStatus::Ok, 1.0)).await.unwrap();
        }
        let store = JsonlMetricStore::open(tmp.path()).unwrap();
        store.append(3, &record(3, OperationalStatus::Ok, 2.0)).await.unwrap();
        assert_eq!(store.read_turbine(3).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_segment_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonlMetricStore::open(tmp.path()).unwrap();
        assert!(store.read_turbine(9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryMetricStore::new();
        store.append(2, &record(2, OperationalStatus::Ok, 1.0)).await.unwrap();
        store.append(1, &record(1, OperationalStatus::Ok, 1.0)).await.unwrap();

        assert_eq!(store.turbine_ids(), vec![1, 2]);
        assert_eq!(store.total_records(), 2);
        assert_eq!(store.records(2).len(), 1);
    }
}
