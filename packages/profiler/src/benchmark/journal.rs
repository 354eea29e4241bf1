//! Durable benchmark storage: a per-session append-only journal plus a
//! periodically rewritten aggregates snapshot.
//!
//! Journal lines are one JSON object each. Concurrent writers serialize
//! around the file handle; a short critical section per sample keeps the
//! lines whole.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::benchmark::{AggregateSnapshot, BenchmarkSample};
use crate::error::CacheError;

/// File-backed sample journal for one session.
pub struct Journal {
    session_path: PathBuf,
    aggregate_path: PathBuf,
    writer: Mutex<tokio::fs::File>,
}

impl Journal {
    /// Open (creating the directory if needed) a journal under `dir`. The
    /// session file is named by the session's start timestamp.
    pub async fn open(dir: impl AsRef<Path>, session_started: &str) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let session_path = dir.join(format!("session_{session_started}.jsonl"));
        let writer = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&session_path)
            .await?;

        Ok(Self {
            session_path,
            aggregate_path: dir.join("aggregate.json"),
            writer: Mutex::new(writer),
        })
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Append one sample as a JSON line.
    pub async fn append(&self, sample: &BenchmarkSample) -> Result<(), CacheError> {
        let mut line = serde_json::to_vec(sample).map_err(|e| {
            CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Rewrite the aggregates snapshot.
    pub async fn write_aggregate(&self, snapshot: &AggregateSnapshot) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| {
            CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        tokio::fs::write(&self.aggregate_path, json).await?;
        debug!(path = %self.aggregate_path.display(), "Aggregate snapshot written");
        Ok(())
    }
}
