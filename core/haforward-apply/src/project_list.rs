//! Forwarded project list updates.

use crate::error::ApplyResult;
use crate::handler::{HandlerCore, blocking};
use crate::host::ProjectListHost;
use haforward_transport::WorkerPool;
use haforward_types::ProjectName;
use std::sync::Arc;
use tracing::debug;

pub struct ProjectListHandler {
    core: HandlerCore,
    list: Arc<dyn ProjectListHost>,
    pool: WorkerPool,
}

impl ProjectListHandler {
    pub fn new(list: Arc<dyn ProjectListHost>, pool: WorkerPool) -> Self {
        Self {
            core: HandlerCore::new("project list"),
            list,
            pool,
        }
    }

    pub async fn update(&self, project: &ProjectName, added: bool) -> ApplyResult<()> {
        let list = Arc::clone(&self.list);
        let name = project.clone();
        self.core
            .apply(&self.pool, project.as_str(), async move {
                blocking(move || {
                    list.update(&name, added)?;
                    if added {
                        debug!("Added {name} to the project list");
                    } else {
                        debug!("Removed {name} from the project list");
                    }
                    Ok(())
                })
                .await
            })
            .await
    }
}
