//! Persisted "last successful" timestamps, one per entity kind.

use crate::error::{ApplyError, ApplyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haforward_types::EntityKind;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Storage for catch-up checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, kind: EntityKind) -> ApplyResult<Option<DateTime<Utc>>>;

    /// Moves the checkpoint to `to` unless it is already later.
    ///
    /// Returns the stored checkpoint.
    async fn advance(&self, kind: EntityKind, to: DateTime<Utc>) -> ApplyResult<DateTime<Utc>>;
}

/// One RFC 3339 file per kind under a data directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(kind.as_str())
    }
}

fn io_error(path: &Path, e: io::Error) -> ApplyError {
    ApplyError::Checkpoint(format!("{}: {e}", path.display()))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, kind: EntityKind) -> ApplyResult<Option<DateTime<Utc>>> {
        let path = self.path(kind);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        let parsed = DateTime::parse_from_rfc3339(text.trim()).map_err(|e| {
            ApplyError::Checkpoint(format!("{}: invalid timestamp: {e}", path.display()))
        })?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    async fn advance(&self, kind: EntityKind, to: DateTime<Utc>) -> ApplyResult<DateTime<Utc>> {
        if let Some(current) = self.load(kind).await? {
            if current >= to {
                return Ok(current);
            }
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path(kind);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, to.to_rfc3339())
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;
        debug!("{kind} checkpoint advanced to {to}");
        Ok(to)
    }
}

/// Checkpoints held in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<EntityKind, DateTime<Utc>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, kind: EntityKind) -> ApplyResult<Option<DateTime<Utc>>> {
        let checkpoints = self.checkpoints.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(checkpoints.get(&kind).copied())
    }

    async fn advance(&self, kind: EntityKind, to: DateTime<Utc>) -> ApplyResult<DateTime<Utc>> {
        let mut checkpoints = self.checkpoints.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = checkpoints.entry(kind).or_insert(to);
        if *stored < to {
            *stored = to;
        }
        Ok(*stored)
    }
}
