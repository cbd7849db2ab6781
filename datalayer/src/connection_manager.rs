use std::sync::Arc;

use common::err::{CResult, DatalayerError};
use connection::{SqlClient, SqlPool};
use tokio::sync::Mutex;

struct CachedConnection {
    digest: String,
    url: String,
    client: Arc<dyn SqlClient>,
}

/// Holds at most one live pooled connection per layer (read, write).
/// `ensure_read`/`ensure_write` compare the caller's configuration
/// digest and resolved URL against the cached connection's and, on any
/// mismatch, close the stale one (best-effort) and open + ping a fresh
/// pool before handing it back.
pub struct ConnectionManager {
    pool: Arc<dyn SqlPool>,
    read: Mutex<Option<CachedConnection>>,
    write: Mutex<Option<CachedConnection>>,
}

impl ConnectionManager {
    pub fn new(pool: Arc<dyn SqlPool>) -> Self {
        ConnectionManager {
            pool,
            read: Mutex::new(None),
            write: Mutex::new(None),
        }
    }

    pub async fn ensure_read(&self, digest: &str, url: &str) -> CResult<Arc<dyn SqlClient>> {
        self.ensure(&self.read, digest, url).await
    }

    pub async fn ensure_write(&self, digest: &str, url: &str) -> CResult<Arc<dyn SqlClient>> {
        self.ensure(&self.write, digest, url).await
    }

    async fn ensure(
        &self,
        slot: &Mutex<Option<CachedConnection>>,
        digest: &str,
        url: &str,
    ) -> CResult<Arc<dyn SqlClient>> {
        let mut guard = slot.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.digest == digest && cached.url == url {
                return Ok(cached.client.clone());
            }
        }
        // old pool is simply dropped; closing errors, if the driver
        // surfaced any, would be best-effort and are not propagated.
        let opened = self.pool.open(url).await?;
        let client: Arc<dyn SqlClient> = Arc::from(opened);
        client
            .ping()
            .await
            .map_err(|e| DatalayerError::ConnectionFailed(e.to_string()))?;
        *guard = Some(CachedConnection {
            digest: digest.to_string(),
            url: url.to_string(),
            client: client.clone(),
        });
        Ok(client)
    }

    /// Drops both cached connections. Called on process shutdown.
    pub async fn shutdown(&self) {
        self.read.lock().await.take();
        self.write.lock().await.take();
    }
}
