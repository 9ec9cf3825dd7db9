//! Lazy per-batch code lists.
//!
//! Each batch id maps to one slot. A fetch in flight is stored as a shared
//! future, so every caller that asks for the same batch while it loads awaits
//! that one request and sees the same outcome, success or failure.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, warn};
use wty_backend::{AdminToken, Backend};
use wty_core::{BatchId, Code, CodeId, Error, Result};

type Codes = Arc<Vec<Code>>;
type SharedFetch = Shared<BoxFuture<'static, Result<Codes>>>;

enum Slot {
    Loading { fetch: SharedFetch, generation: u64 },
    Ready(Codes),
    Failed(Error),
}

pub struct BatchExpansionCache {
    backend: Arc<dyn Backend>,
    slots: DashMap<BatchId, Slot>,
    generation: AtomicU64,
}

impl BatchExpansionCache {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            slots: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the batch's codes, fetching them on first use.
    ///
    /// A failed fetch is remembered for [`error_for`](Self::error_for) and
    /// retried by the next call.
    pub async fn ensure_loaded(&self, token: &AdminToken, batch_id: &BatchId) -> Result<Codes> {
        let (fetch, generation) = match self.slots.entry(batch_id.clone()) {
            Entry::Occupied(mut entry) => {
                let in_flight = match entry.get() {
                    Slot::Ready(codes) => return Ok(Arc::clone(codes)),
                    Slot::Loading { fetch, generation } => Some((fetch.clone(), *generation)),
                    Slot::Failed(_) => None,
                };
                match in_flight {
                    Some(joined) => joined,
                    None => {
                        let started = self.start(token, batch_id);
                        entry.insert(Slot::Loading {
                            fetch: started.0.clone(),
                            generation: started.1,
                        });
                        started
                    }
                }
            }
            Entry::Vacant(entry) => {
                let started = self.start(token, batch_id);
                entry.insert(Slot::Loading {
                    fetch: started.0.clone(),
                    generation: started.1,
                });
                started
            }
        };

        let outcome = fetch.await;
        self.settle(batch_id, generation, &outcome);
        outcome
    }

    fn start(&self, token: &AdminToken, batch_id: &BatchId) -> (SharedFetch, u64) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let backend = Arc::clone(&self.backend);
        let token = token.clone();
        let id = batch_id.clone();
        debug!("Fetching codes for batch {}", batch_id);

        let fetch = async move { backend.list_batch_codes(&token, &id).await.map(Arc::new) }
            .boxed()
            .shared();
        (fetch, generation)
    }

    /// Stores a finished fetch unless the slot has moved on since it started.
    fn settle(&self, batch_id: &BatchId, generation: u64, outcome: &Result<Codes>) {
        let Some(mut slot) = self.slots.get_mut(batch_id) else {
            debug!("Discarding codes for batch {} (invalidated)", batch_id);
            return;
        };
        let current = matches!(&*slot, Slot::Loading { generation: g, .. } if *g == generation);
        if !current {
            return;
        }
        *slot = match outcome {
            Ok(codes) => Slot::Ready(Arc::clone(codes)),
            Err(e) => {
                warn!("Loading batch {} failed: {}", batch_id, e);
                Slot::Failed(e.clone())
            }
        };
    }

    /// Cached codes, without fetching.
    pub fn get(&self, batch_id: &BatchId) -> Option<Codes> {
        match self.slots.get(batch_id).as_deref() {
            Some(Slot::Ready(codes)) => Some(Arc::clone(codes)),
            _ => None,
        }
    }

    pub fn is_loading(&self, batch_id: &BatchId) -> bool {
        matches!(self.slots.get(batch_id).as_deref(), Some(Slot::Loading { .. }))
    }

    pub fn error_for(&self, batch_id: &BatchId) -> Option<Error> {
        match self.slots.get(batch_id).as_deref() {
            Some(Slot::Failed(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Forgets the batch; the next [`ensure_loaded`](Self::ensure_loaded)
    /// fetches again. A fetch still in flight will not be stored.
    pub fn invalidate(&self, batch_id: &BatchId) {
        self.slots.remove(batch_id);
    }

    /// Invalidates and fetches again right away.
    pub async fn refresh(&self, token: &AdminToken, batch_id: &BatchId) -> Result<Codes> {
        self.invalidate(batch_id);
        self.ensure_loaded(token, batch_id).await
    }

    /// Drops a batch that no longer exists.
    pub fn evict(&self, batch_id: &BatchId) {
        if self.slots.remove(batch_id).is_some() {
            debug!("Evicted batch {}", batch_id);
        }
    }

    /// Keeps only the listed batches.
    pub fn retain_batches(&self, batch_ids: &HashSet<&BatchId>) {
        self.slots.retain(|id, _| batch_ids.contains(id));
    }

    /// Ids of every code held by a loaded batch.
    pub fn cached_ids(&self) -> HashSet<CodeId> {
        let mut ids = HashSet::new();
        for slot in self.slots.iter() {
            if let Slot::Ready(codes) = slot.value() {
                ids.extend(codes.iter().map(|c| c.id.clone()));
            }
        }
        ids
    }

    /// Loaded batches holding any of `ids`.
    pub fn batches_containing(&self, ids: &[CodeId]) -> Vec<BatchId> {
        let wanted: HashSet<&CodeId> = ids.iter().collect();
        let mut batches: Vec<BatchId> = self
            .slots
            .iter()
            .filter(|slot| match slot.value() {
                Slot::Ready(codes) => codes.iter().any(|c| wanted.contains(&c.id)),
                _ => false,
            })
            .map(|slot| slot.key().clone())
            .collect();
        batches.sort();
        batches
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wty_backend::MemoryBackend;
    use wty_core::Product;

    async fn setup() -> (Arc<MemoryBackend>, AdminToken) {
        let backend = MemoryBackend::new()
            .with_admin("admin", "pw")
            .with_product(Product {
                product_id: "P-100".into(),
                product_name: "Kettle".into(),
                manufacturer: String::new(),
                category: String::new(),
                image_url: String::new(),
                warranty_duration: 365,
            });
        backend.seed_batch("B-1", "P-100", &["SN-001", "SN-002"]);
        backend.seed_batch("B-2", "P-100", &["SN-003"]);
        let token = backend.admin_login("admin", "pw").await.unwrap();
        (Arc::new(backend), token)
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (backend, token) = setup().await;
        let cache = BatchExpansionCache::new(backend.clone());
        let batch: BatchId = "B-1".into();

        let first = cache.ensure_loaded(&token, &batch).await.unwrap();
        let second = cache.ensure_loaded(&token, &batch).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.batch_fetches(&batch), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let (backend, token) = setup().await;
        backend.set_latency(Some(Duration::from_millis(20)));
        let cache = BatchExpansionCache::new(backend.clone());
        let batch: BatchId = "B-1".into();

        let (a, b, c) = tokio::join!(
            cache.ensure_loaded(&token, &batch),
            cache.ensure_loaded(&token, &batch),
            cache.ensure_loaded(&token, &batch),
        );
        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(c.unwrap().len(), 2);
        assert_eq!(backend.batch_fetches(&batch), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure_then_retry() {
        let (backend, token) = setup().await;
        backend.set_latency(Some(Duration::from_millis(20)));
        backend.fail("list_batch_codes:B-1", Error::Network("reset".into()));
        let cache = BatchExpansionCache::new(backend.clone());
        let batch: BatchId = "B-1".into();

        let (a, b) = tokio::join!(
            cache.ensure_loaded(&token, &batch),
            cache.ensure_loaded(&token, &batch),
        );
        assert_eq!(a.unwrap_err(), Error::Network("reset".into()));
        assert_eq!(b.unwrap_err(), Error::Network("reset".into()));
        assert_eq!(backend.batch_fetches(&batch), 1);
        assert!(cache.error_for(&batch).is_some());

        backend.clear_failures();
        assert_eq!(cache.ensure_loaded(&token, &batch).await.unwrap().len(), 2);
        assert!(cache.error_for(&batch).is_none());
        assert_eq!(backend.batch_fetches(&batch), 2);
    }

    #[tokio::test]
    async fn test_failure_leaves_siblings_alone() {
        let (backend, token) = setup().await;
        let cache = BatchExpansionCache::new(backend.clone());
        cache.ensure_loaded(&token, &"B-2".into()).await.unwrap();

        backend.fail("list_batch_codes:B-1", Error::Network("reset".into()));
        assert!(cache.ensure_loaded(&token, &"B-1".into()).await.is_err());
        assert_eq!(cache.get(&"B-2".into()).unwrap().len(), 1);
        assert!(cache.get(&"B-1".into()).is_none());
    }

    #[tokio::test]
    async fn test_invalidate_refetches() {
        let (backend, token) = setup().await;
        let cache = BatchExpansionCache::new(backend.clone());
        let batch: BatchId = "B-1".into();

        cache.ensure_loaded(&token, &batch).await.unwrap();
        cache.invalidate(&batch);
        assert!(cache.get(&batch).is_none());
        cache.refresh(&token, &batch).await.unwrap();
        assert_eq!(backend.batch_fetches(&batch), 2);
    }

    #[tokio::test]
    async fn test_stale_fetch_does_not_overwrite() {
        let (backend, token) = setup().await;
        let cache = Arc::new(BatchExpansionCache::new(backend.clone()));
        let batch: BatchId = "B-1".into();

        backend.pause();
        let pending = {
            let cache = Arc::clone(&cache);
            let token = token.clone();
            let batch = batch.clone();
            tokio::spawn(async move { cache.ensure_loaded(&token, &batch).await })
        };
        while backend.batch_fetches(&batch) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(cache.is_loading(&batch));

        cache.invalidate(&batch);
        backend.resume();
        // The stale caller still gets its answer, but the slot stays empty.
        assert!(pending.await.unwrap().is_ok());
        assert!(cache.get(&batch).is_none());
        assert!(!cache.is_loading(&batch));
    }

    #[tokio::test]
    async fn test_cached_ids_and_lookup_by_code() {
        let (backend, token) = setup().await;
        let cache = BatchExpansionCache::new(backend.clone());
        let codes = cache.ensure_loaded(&token, &"B-1".into()).await.unwrap();
        cache.ensure_loaded(&token, &"B-2".into()).await.unwrap();

        assert_eq!(cache.cached_ids().len(), 3);
        assert_eq!(
            cache.batches_containing(&[codes[0].id.clone()]),
            vec![BatchId::from("B-1")]
        );

        cache.evict(&"B-2".into());
        assert_eq!(cache.cached_ids().len(), 2);
    }
}
