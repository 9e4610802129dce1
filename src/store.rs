//! Persistence seam for analysis records.
//!
//! [`RecordStore`] is the opaque remote store. [`LocalStore`] keeps records
//! in memory and optionally mirrors them to a JSON file; [`FallbackStore`]
//! prefers a remote store and falls back to its local one on error.
use crate::backend::AnalysisResult;
use crate::error::CaptureError;
use crate::image::io::{read_json_file, write_json_file};
use crate::tracking::PageId;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// Assigned by the store on insert.
    #[serde(default)]
    pub id: Option<RecordId>,
    pub session_id: String,
    pub page: PageId,
    pub document_type: String,
    pub confidence: f32,
    pub offline_estimate: bool,
    pub result: AnalysisResult,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
}

impl AnalysisRecord {
    pub fn new(session_id: impl Into<String>, page: PageId, confidence: f32, result: AnalysisResult) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            page,
            document_type: result.document_type.clone(),
            confidence,
            offline_estimate: result.offline_estimate,
            result,
            warnings: Vec::new(),
            created_at_ms: unix_millis(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    pub id: Option<RecordId>,
    pub session_id: Option<String>,
    pub document_type: Option<String>,
}

impl RecordFilter {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        self.id.as_ref().map_or(true, |id| record.id.as_ref() == Some(id))
            && self
                .session_id
                .as_ref()
                .map_or(true, |s| &record.session_id == s)
            && self
                .document_type
                .as_ref()
                .map_or(true, |d| &record.document_type == d)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Persist(#[from] CaptureError),
}

pub trait RecordStore: Send {
    fn insert(&mut self, record: AnalysisRecord) -> Result<RecordId, StoreError>;
    fn query(&self, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError>;
}

/// In-memory store with ids `local-1`, `local-2`, ...
#[derive(Default)]
pub struct LocalStore {
    records: Vec<AnalysisRecord>,
    next_id: u64,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store mirrored to `path`; existing records in the file are loaded.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let records: Vec<AnalysisRecord> = if path.exists() {
            read_json_file(path)?
        } else {
            Vec::new()
        };
        let next_id = records
            .iter()
            .filter_map(|r| r.id.as_ref()?.0.strip_prefix("local-")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        debug!("LocalStore: loaded {} records from {}", records.len(), path.display());
        Ok(Self {
            records,
            next_id,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for LocalStore {
    fn insert(&mut self, mut record: AnalysisRecord) -> Result<RecordId, StoreError> {
        self.next_id += 1;
        let id = RecordId(format!("local-{}", self.next_id));
        record.id = Some(id.clone());
        self.records.push(record);
        if let Some(path) = &self.path {
            write_json_file(path, &self.records)?;
        }
        Ok(id)
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

/// Remote store when configured, local store otherwise or when the remote fails.
pub struct FallbackStore {
    remote: Option<Box<dyn RecordStore>>,
    local: LocalStore,
}

impl FallbackStore {
    pub fn new(remote: Option<Box<dyn RecordStore>>, local: LocalStore) -> Self {
        Self { remote, local }
    }

    pub fn local_only() -> Self {
        Self::new(None, LocalStore::new())
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }
}

impl RecordStore for FallbackStore {
    fn insert(&mut self, record: AnalysisRecord) -> Result<RecordId, StoreError> {
        if let Some(remote) = self.remote.as_mut() {
            match remote.insert(record.clone()) {
                Ok(id) => return Ok(id),
                Err(err) => warn!("FallbackStore: remote insert failed ({err}), keeping record locally"),
            }
        }
        self.local.insert(record)
    }

    /// Remote matches followed by records that only reached the local store.
    fn query(&self, filter: &RecordFilter) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut out = match self.remote.as_ref().map(|r| r.query(filter)) {
            Some(Ok(records)) => records,
            Some(Err(err)) => {
                warn!("FallbackStore: remote query failed ({err}), using local records");
                Vec::new()
            }
            None => Vec::new(),
        };
        out.extend(self.local.query(filter)?);
        Ok(out)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
