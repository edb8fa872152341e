//! Shared test helpers for apply tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use haforward_apply::{
    ApplyConfig, ApplyHosts, CacheHost, ChangeStateReader, EntityScanner, EventHost, HostError,
    HostResult, IndexHost, ModifiedEntity, ProjectListHost,
};
use haforward_transport::{RetryConfig, context};
use haforward_types::{CacheEntry, ChangeId, EntityKind, IndexEvent, ProjectName};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;
use tokio::sync::mpsc as async_mpsc;

/// Pauses the next index call until released.
struct Gate {
    entered: async_mpsc::UnboundedSender<()>,
    release: mpsc::Receiver<()>,
}

/// An in-memory host recording every mutation.
#[derive(Default)]
pub struct FakeHost {
    /// Entities present in the index.
    pub index: Mutex<BTreeSet<(EntityKind, String)>>,
    /// Number of host mutations of any kind.
    pub mutations: AtomicUsize,
    /// `is_forwarded()` as seen by each mutation.
    pub forwarded_seen: Mutex<Vec<bool>>,
    /// Local change state; changes absent here are not found.
    pub changes: Mutex<HashMap<ChangeId, IndexEvent>>,
    pub evicted: Mutex<Vec<CacheEntry>>,
    pub events: Mutex<Vec<Value>>,
    pub projects: Mutex<BTreeSet<String>>,
    /// Entities reported by the scanner.
    pub modified: Mutex<HashMap<EntityKind, Vec<ModifiedEntity>>>,
    /// Ids whose index call fails with an I/O error.
    pub failing: Mutex<BTreeSet<String>>,
    pub panic_on_index: AtomicBool,
    gate: Mutex<Option<Gate>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next index call block until the returned sender fires.
    /// The receiver yields once the call has started.
    pub fn hold_next_index(&self) -> (async_mpsc::UnboundedReceiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = async_mpsc::unbounded_channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    pub fn set_change(&self, change: &ChangeId, ts: i64, target: &str) {
        self.changes.lock().unwrap().insert(
            change.clone(),
            IndexEvent::at(ts).with_meta("meta").with_target(target),
        );
    }

    pub fn fail_index_of(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn is_indexed(&self, kind: EntityKind, id: &str) -> bool {
        self.index.lock().unwrap().contains(&(kind, id.to_string()))
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn indexed(&self) -> BTreeSet<(EntityKind, String)> {
        self.index.lock().unwrap().clone()
    }

    fn record(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.forwarded_seen
            .lock()
            .unwrap()
            .push(context::is_forwarded());
    }

    pub fn all_mutations_forwarded(&self) -> bool {
        self.forwarded_seen.lock().unwrap().iter().all(|seen| *seen)
    }
}

impl IndexHost for FakeHost {
    fn index(&self, kind: EntityKind, id: &str) -> HostResult<()> {
        if self.panic_on_index.load(Ordering::SeqCst) {
            panic!("index of {kind} {id} exploded");
        }
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        if self.failing.lock().unwrap().contains(id) {
            return Err(HostError::Io(std::io::Error::other("disk full")));
        }
        self.record();
        self.index.lock().unwrap().insert((kind, id.to_string()));
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: &str) -> HostResult<()> {
        self.record();
        self.index.lock().unwrap().remove(&(kind, id.to_string()));
        Ok(())
    }

    fn delete_all_changes(&self, project: &ProjectName) -> HostResult<()> {
        self.record();
        let prefix = format!("{project}~");
        self.index
            .lock()
            .unwrap()
            .retain(|(kind, id)| !(*kind == EntityKind::Change && id.starts_with(&prefix)));
        Ok(())
    }
}

impl ChangeStateReader for FakeHost {
    fn current_timestamp(&self, change: &ChangeId) -> HostResult<i64> {
        self.changes
            .lock()
            .unwrap()
            .get(change)
            .map(|c| c.ts)
            .ok_or_else(|| HostError::NotFound(change.to_string()))
    }

    fn meta_fingerprint(&self, change: &ChangeId) -> HostResult<Option<String>> {
        Ok(self
            .changes
            .lock()
            .unwrap()
            .get(change)
            .and_then(|c| c.meta_sha.clone()))
    }

    fn target_fingerprint(&self, change: &ChangeId) -> HostResult<Option<String>> {
        Ok(self
            .changes
            .lock()
            .unwrap()
            .get(change)
            .and_then(|c| c.target_sha.clone()))
    }
}

impl CacheHost for FakeHost {
    fn evict(&self, entry: &CacheEntry) -> HostResult<()> {
        self.record();
        self.evicted.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

impl EventHost for FakeHost {
    fn dispatch(&self, event: &Value) -> HostResult<()> {
        self.record();
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl ProjectListHost for FakeHost {
    fn update(&self, project: &ProjectName, added: bool) -> HostResult<()> {
        self.record();
        let mut projects = self.projects.lock().unwrap();
        if added {
            projects.insert(project.to_string());
        } else {
            projects.remove(project.as_str());
        }
        Ok(())
    }
}

impl EntityScanner for FakeHost {
    fn modified_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> HostResult<Vec<ModifiedEntity>> {
        Ok(self
            .modified
            .lock()
            .unwrap()
            .get(&kind)
            .map(|all| all.iter().filter(|e| e.modified > since).cloned().collect())
            .unwrap_or_default())
    }
}

pub fn hosts(host: &Arc<FakeHost>) -> ApplyHosts {
    ApplyHosts {
        index: host.clone(),
        changes: host.clone(),
        caches: host.clone(),
        events: host.clone(),
        project_list: host.clone(),
    }
}

/// Apply settings with a fast index retry.
pub fn fast_config(max_tries: u32) -> ApplyConfig {
    ApplyConfig {
        index: RetryConfig::default()
            .with_max_tries(max_tries)
            .with_retry_interval(Duration::from_millis(10)),
        ..ApplyConfig::default()
    }
}
