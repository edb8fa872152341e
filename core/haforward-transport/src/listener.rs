//! Local mutation listeners.
//!
//! The host calls these hooks after it changed its own state. Each hook
//! checks [`is_forwarded`](crate::context::is_forwarded) synchronously, in
//! the caller's execution scope, and only then hands the work to a spawned
//! task. A mutation that is itself the replay of a forwarded command is
//! never forwarded again.

use crate::context;
use crate::error::{ForwardError, ForwardResult};
use crate::forwarder::Forwarder;
use haforward_types::{AccountId, CacheKey, ChangeId, GroupUuid, IndexEvent, InstanceId, ProjectName};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Field of a stream event naming the instance that raised it.
const EVENT_INSTANCE_FIELD: &str = "instanceId";

/// Which cache evictions are forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheForwardingConfig {
    /// Full-match regular expressions over the cache name.
    pub patterns: Vec<String>,
}

impl Default for CacheForwardingConfig {
    fn default() -> Self {
        Self {
            patterns: ["accounts", "groups.*", "ldap_groups.*", "projects", "project_list", "changes"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl CacheForwardingConfig {
    /// Compiles the patterns, anchored at both ends.
    pub fn compile(&self) -> ForwardResult<RegexSet> {
        RegexSet::new(self.patterns.iter().map(|p| format!("^(?:{p})$")))
            .map_err(|e| ForwardError::Config(format!("invalid cache pattern: {e}")))
    }
}

/// Forwards local mutations unless they are replays of forwarded ones.
///
/// Every hook returns `None` when nothing was forwarded, otherwise the
/// handle of the spawned delivery.
pub struct ForwardingListener {
    forwarder: Arc<dyn Forwarder>,
    cache_filter: RegexSet,
    instance_id: InstanceId,
}

impl ForwardingListener {
    pub fn new(
        forwarder: Arc<dyn Forwarder>,
        cache: &CacheForwardingConfig,
        instance_id: InstanceId,
    ) -> ForwardResult<Self> {
        Ok(Self {
            forwarder,
            cache_filter: cache.compile()?,
            instance_id,
        })
    }

    fn spawn<Fut>(
        &self,
        what: &str,
        job: impl FnOnce(Arc<dyn Forwarder>) -> Fut,
    ) -> Option<JoinHandle<bool>>
    where
        Fut: Future<Output = bool> + Send + 'static,
    {
        if context::is_forwarded() {
            debug!("Not forwarding {what}: it replays a forwarded command");
            return None;
        }
        Some(tokio::spawn(job(Arc::clone(&self.forwarder))))
    }

    pub fn on_change_indexed(
        &self,
        change: &ChangeId,
        event: Option<IndexEvent>,
    ) -> Option<JoinHandle<bool>> {
        let change = change.clone();
        self.spawn(&format!("index of change {change}"), |f| async move {
            f.index_change(&change, event).await
        })
    }

    pub fn on_change_batch_indexed(
        &self,
        change: &ChangeId,
        event: Option<IndexEvent>,
    ) -> Option<JoinHandle<bool>> {
        let change = change.clone();
        self.spawn(&format!("batch index of change {change}"), |f| async move {
            f.batch_index_change(&change, event).await
        })
    }

    pub fn on_change_deleted(&self, change: &ChangeId) -> Option<JoinHandle<bool>> {
        let change = change.clone();
        self.spawn(&format!("deletion of change {change}"), |f| async move {
            f.delete_change_from_index(&change).await
        })
    }

    pub fn on_all_changes_deleted(&self, project: &ProjectName) -> Option<JoinHandle<bool>> {
        let project = project.clone();
        self.spawn(&format!("deletion of all changes of {project}"), |f| async move {
            f.delete_all_changes_for_project(&project).await
        })
    }

    pub fn on_account_indexed(
        &self,
        account: AccountId,
        event: Option<IndexEvent>,
    ) -> Option<JoinHandle<bool>> {
        self.spawn(&format!("index of account {account}"), |f| async move {
            f.index_account(account, event).await
        })
    }

    pub fn on_group_indexed(
        &self,
        group: &GroupUuid,
        event: Option<IndexEvent>,
    ) -> Option<JoinHandle<bool>> {
        let group = group.clone();
        self.spawn(&format!("index of group {group}"), |f| async move {
            f.index_group(&group, event).await
        })
    }

    pub fn on_project_indexed(
        &self,
        project: &ProjectName,
        event: Option<IndexEvent>,
    ) -> Option<JoinHandle<bool>> {
        let project = project.clone();
        self.spawn(&format!("index of project {project}"), |f| async move {
            f.index_project(&project, event).await
        })
    }

    pub fn on_project_deleted(&self, project: &ProjectName) -> Option<JoinHandle<bool>> {
        let project = project.clone();
        self.spawn(&format!("deletion of project {project}"), |f| async move {
            f.delete_project(&project).await
        })
    }

    /// Forwards an eviction if the cache name matches a configured pattern.
    pub fn on_cache_evicted(&self, cache_name: &str, key: &CacheKey) -> Option<JoinHandle<bool>> {
        if !self.cache_filter.is_match(cache_name) {
            return None;
        }
        let cache_name = cache_name.to_string();
        let key = key.clone();
        self.spawn(&format!("eviction from {cache_name}"), |f| async move {
            f.evict(&cache_name, &key).await
        })
    }

    /// Forwards a stream event raised by this instance.
    ///
    /// Events carrying another instance's id are replays and stay local.
    pub fn on_event(&self, event: serde_json::Value) -> Option<JoinHandle<bool>> {
        if let Some(origin) = event.get(EVENT_INSTANCE_FIELD).and_then(|v| v.as_str()) {
            if origin != self.instance_id.to_string() {
                debug!("Not forwarding event from instance {origin}");
                return None;
            }
        }
        self.spawn("stream event", |f| async move { f.send(event).await })
    }

    pub fn on_project_created(&self, project: &ProjectName) -> Option<JoinHandle<bool>> {
        let project = project.clone();
        self.spawn(&format!("creation of project {project}"), |f| async move {
            f.add_to_project_list(&project).await
        })
    }

    pub fn on_project_removed(&self, project: &ProjectName) -> Option<JoinHandle<bool>> {
        let project = project.clone();
        self.spawn(&format!("removal of project {project}"), |f| async move {
            f.remove_from_project_list(&project).await
        })
    }
}
