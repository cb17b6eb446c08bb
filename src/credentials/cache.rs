use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CredentialError, CredentialProvider, MerchantCredentials};

#[derive(Clone)]
struct CachedEntry {
    credentials: Arc<MerchantCredentials>,
    fetched_at: Instant,
}

/// Read-mostly credential cache with a per-entry TTL.
///
/// Lookups are lock-free snapshot reads. Misses, refreshes and invalidations
/// go through a single writer that swaps in a new map.
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    ttl: Duration,
    inner: ArcSwap<HashMap<Uuid, CachedEntry>>,
    writer: Mutex<()>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            inner: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    pub async fn get(
        &self,
        merchant_id: Uuid,
    ) -> Result<Arc<MerchantCredentials>, CredentialError> {
        if let Some(hit) = self.fresh(merchant_id) {
            return Ok(hit);
        }

        let _writer = self.writer.lock().await;
        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.fresh(merchant_id) {
            return Ok(hit);
        }

        let credentials = Arc::new(self.provider.get_merchant(merchant_id).await?);
        let mut next = HashMap::clone(&self.inner.load());
        next.insert(
            merchant_id,
            CachedEntry {
                credentials: credentials.clone(),
                fetched_at: Instant::now(),
            },
        );
        self.inner.store(Arc::new(next));
        tracing::debug!(merchant_id = %merchant_id, "Merchant credentials cached");

        Ok(credentials)
    }

    /// Drops the cached entry so the next lookup re-reads the provider.
    /// Call whenever a merchant's credentials change.
    pub async fn invalidate(&self, merchant_id: Uuid) {
        let _writer = self.writer.lock().await;
        let current = self.inner.load();
        if !current.contains_key(&merchant_id) {
            return;
        }
        let mut next = HashMap::clone(&current);
        next.remove(&merchant_id);
        self.inner.store(Arc::new(next));
        tracing::info!(merchant_id = %merchant_id, "Merchant credentials invalidated");
    }

    fn fresh(&self, merchant_id: Uuid) -> Option<Arc<MerchantCredentials>> {
        self.inner
            .load()
            .get(&merchant_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.credentials.clone())
    }
}
