use std::sync::Arc;

use tokio::sync::RwLock;

use datalayer::{ConnectionManager, Datalayer};

/// Shared across every request handler. `datalayer` is swapped wholesale
/// by the config refresh task rather than mutated in place, so a handler
/// that grabs an `Arc<Datalayer>` at the top of a request sees a
/// consistent snapshot even if the config changes mid-flight.
pub struct AppState {
    datalayer: RwLock<Arc<Datalayer>>,
    pub conn_mgr: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(datalayer: Datalayer, conn_mgr: Arc<ConnectionManager>) -> Self {
        AppState {
            datalayer: RwLock::new(Arc::new(datalayer)),
            conn_mgr,
        }
    }

    pub async fn current_datalayer(&self) -> Arc<Datalayer> {
        self.datalayer.read().await.clone()
    }

    /// Installs `fresh` as the active configuration if its digest differs
    /// from what's currently loaded. Returns `true` on replacement.
    pub async fn replace_if_changed(&self, fresh: Datalayer) -> bool {
        let mut guard = self.datalayer.write().await;
        if guard.digest == fresh.digest {
            return false;
        }
        *guard = Arc::new(fresh);
        true
    }
}
