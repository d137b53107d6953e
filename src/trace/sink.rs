//! Destinations for persisted trace logs.

use super::error::TraceError;
use super::record::TraceRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Version identifier for the trace document format
pub const TRACE_VERSION: u32 = 1;

/// A persisted snapshot of a trace log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceDocument {
    /// Document format version
    pub version: u32,

    /// Session of the log that produced the snapshot
    pub session: Uuid,

    /// Name the snapshot was persisted under
    pub name: String,

    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,

    pub records: Vec<TraceRecord>,
}

impl TraceDocument {
    pub fn new(session: Uuid, name: impl Into<String>, records: Vec<TraceRecord>) -> Self {
        Self {
            version: TRACE_VERSION,
            session,
            name: name.into(),
            saved_at: Utc::now(),
            records,
        }
    }

    fn check_version(self) -> Result<Self, TraceError> {
        if self.version == TRACE_VERSION {
            Ok(self)
        } else {
            Err(TraceError::UnsupportedVersion {
                found: self.version,
                supported: TRACE_VERSION,
            })
        }
    }
}

/// On-disk encoding of a [`TraceDocument`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFormat {
    #[default]
    Json,
    Binary,
}

impl TraceFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "bin",
        }
    }

    pub fn encode(self, document: &TraceDocument) -> Result<Vec<u8>, TraceError> {
        match self {
            Self::Json => serde_json::to_vec_pretty(document)
                .map_err(|e| TraceError::SerializationFailed(e.to_string())),
            Self::Binary => bincode::serialize(document)
                .map_err(|e| TraceError::SerializationFailed(e.to_string())),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<TraceDocument, TraceError> {
        let document: TraceDocument = match self {
            Self::Json => serde_json::from_slice(bytes)
                .map_err(|e| TraceError::DeserializationFailed(e.to_string()))?,
            Self::Binary => bincode::deserialize(bytes)
                .map_err(|e| TraceError::DeserializationFailed(e.to_string()))?,
        };
        document.check_version()
    }
}

/// Where [`TraceLog::persist`](super::TraceLog::persist) writes snapshots.
pub trait TraceSink: Send + Sync {
    fn save(&self, document: &TraceDocument) -> Result<(), TraceError>;
}

/// Keeps saved documents in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemorySink {
    documents: Mutex<HashMap<String, TraceDocument>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<TraceDocument> {
        self.documents.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.documents.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl TraceSink for MemorySink {
    fn save(&self, document: &TraceDocument) -> Result<(), TraceError> {
        self.documents
            .lock()
            .insert(document.name.clone(), document.clone());
        Ok(())
    }
}

/// Writes each document to `<directory>/<name>.<ext>`.
#[derive(Clone, Debug)]
pub struct FileSink {
    directory: PathBuf,
    format: TraceFormat,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>, format: TraceFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, TraceError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(TraceError::InvalidName(name.to_string()));
        }
        Ok(self
            .directory
            .join(format!("{}.{}", name, self.format.extension())))
    }

    /// Read a document previously saved under `name`.
    pub fn load(&self, name: &str) -> Result<TraceDocument, TraceError> {
        let bytes = fs::read(self.path_for(name)?)?;
        self.format.decode(&bytes)
    }
}

impl TraceSink for FileSink {
    fn save(&self, document: &TraceDocument) -> Result<(), TraceError> {
        let path = self.path_for(&document.name)?;
        let bytes = self.format.encode(document)?;
        fs::create_dir_all(&self.directory)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension(format!("{}.tmp", self.format.extension()));
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}
