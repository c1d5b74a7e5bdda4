// src/sync/collection.rs
//
// Collection - the per-entity read/write surface over the page cache.
//
// One Collection owns the cache store, the warm-up loop, and the
// filter/page state for a single backend collection. Reads go through the
// materialized-view computation; writes arrive either from the app's
// mutation flows (upsert_one, patch_one) or from realtime reducers
// (strip/invalidate).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::backend::{PageFetcher, PageMeta, PageRequest, RawPage};
use crate::cache::{
    compute_view, distinct_count, next_missing_page, CachedPage, FetchKey, PageCacheStore,
    ViewPage,
};
use crate::domain::{CacheEntity, FilterSet};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server page size requested per fetch.
    pub page_size: u32,
    /// Delay between warm-up iterations, to avoid saturating the backend.
    pub warmup_pacing: Duration,
    /// Hard cap on pages per key when the server never reports a total.
    pub warmup_max_pages: u32,
    /// Bound on each individual page fetch inside the warm-up loop.
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            warmup_pacing: Duration::from_millis(100),
            warmup_max_pages: 200,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// How a collection pages.
///
/// `HeadTail` keeps the first page refreshed independently of the warmed
/// tail: new rows land on page 1, so refetching just the head keeps a
/// high-churn collection fresh without discarding pages 2..n.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    Uniform,
    HeadTail,
}

/// Explicit plan for applying a realtime `created` event, so both paths
/// stay independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePlan {
    /// Fetch the single new entity by id and splice it into the head page;
    /// falls back to Invalidate if the fetch fails.
    OptimisticFetch { id: i64 },
    /// Bump the generation and refetch from page 1.
    Invalidate,
}

#[derive(Debug, Clone, Default)]
struct CollectionState {
    params: BTreeMap<String, String>,
    filters: FilterSet,
    page: u32,
    generation: u64,
    loading: bool,
    last_error: Option<String>,
}

pub struct Collection<E: CacheEntity> {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<PageCacheStore<E>>,
    state: Arc<Mutex<CollectionState>>,
    config: SyncConfig,
    mode: PagingMode,
    /// Serializes page fetches: at most one in flight per collection,
    /// shared between the warm-up loop and read-triggered fetches.
    fetch_gate: Arc<AsyncMutex<()>>,
    warmup: Mutex<Option<JoinHandle<()>>>,
}

impl<E: CacheEntity> Collection<E> {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: SyncConfig, mode: PagingMode) -> Self {
        Self {
            fetcher,
            store: Arc::new(PageCacheStore::new()),
            state: Arc::new(Mutex::new(CollectionState {
                page: 1,
                ..Default::default()
            })),
            config,
            mode,
            fetch_gate: Arc::new(AsyncMutex::new(())),
            warmup: Mutex::new(None),
        }
    }

    pub fn resource(&self) -> &'static str {
        E::RESOURCE
    }

    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    /// The fetch key all reads and writes currently resolve against.
    pub fn current_key(&self) -> FetchKey {
        let state = self.state.lock().unwrap();
        FetchKey {
            collection: E::RESOURCE.to_string(),
            page_size: self.config.page_size,
            params: state.params.clone(),
            generation: state.generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    pub fn page(&self) -> u32 {
        self.state.lock().unwrap().page
    }

    pub fn set_page(&self, page: u32) {
        self.state.lock().unwrap().page = page.max(1);
    }

    pub fn filters(&self) -> FilterSet {
        self.state.lock().unwrap().filters.clone()
    }

    /// Replace the client-side filters. Any filter change resets the
    /// requested page to 1. The fetch key is untouched: these predicates run
    /// over the local cache only.
    pub fn set_filters(&self, filters: FilterSet) {
        let mut state = self.state.lock().unwrap();
        if state.filters != filters {
            state.filters = filters;
            state.page = 1;
        }
    }

    /// Replace the server-side params. This changes the fetch key, so the
    /// cached entry loses affinity and a fresh one starts on the next read.
    pub fn set_server_params(&self, params: BTreeMap<String, String>) {
        let key = {
            let mut state = self.state.lock().unwrap();
            if state.params == params {
                return;
            }
            state.params = params;
            state.generation += 1;
            state.page = 1;
            state.last_error = None;
            FetchKey {
                collection: E::RESOURCE.to_string(),
                page_size: self.config.page_size,
                params: state.params.clone(),
                generation: state.generation,
            }
        };
        self.store.purge_except(&key);
    }

    pub fn loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    /// Compute the current materialized view, fetching whatever server pages
    /// are still needed to satisfy the requested client page.
    ///
    /// A fetch failure never blanks previously loaded rows: the view is
    /// computed from whatever is cached and the error is surfaced through
    /// `last_error`.
    pub async fn view(&self) -> ViewPage<E> {
        let key = self.current_key();
        let (filters, requested_page) = {
            let state = self.state.lock().unwrap();
            (state.filters.clone(), state.page)
        };

        let first_load = self
            .store
            .snapshot(&key)
            .map_or(true, |(pages, _)| pages.is_empty());
        if first_load {
            if fetch_page_into(&self.fetcher, &self.store, &self.state, &self.fetch_gate, &self.config, &key, 1)
                .await
            {
                self.start_warmup();
            }
        }

        self.ensure_resident(&key, requested_page).await;

        let (pages, meta) = self.store.snapshot(&key).unwrap_or_else(|| (Vec::new(), PageMeta::default()));
        compute_view(&pages, &meta, &filters, requested_page, self.config.page_size)
    }

    /// Bump the generation and refetch from page 1. The old entry is purged;
    /// any fetch still in flight for it will fail the generation check and
    /// be discarded.
    pub async fn reload(&self) {
        let key = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.last_error = None;
            FetchKey {
                collection: E::RESOURCE.to_string(),
                page_size: self.config.page_size,
                params: state.params.clone(),
                generation: state.generation,
            }
        };
        self.store.purge_except(&key);

        if fetch_page_into(&self.fetcher, &self.store, &self.state, &self.fetch_gate, &self.config, &key, 1).await {
            self.start_warmup();
        }
    }

    /// Refetch only the head page, keeping the warmed tail. Head/tail
    /// collections call this instead of a full reload when page 1 churns.
    pub async fn refresh_head(&self) {
        let key = self.current_key();
        fetch_page_into(&self.fetcher, &self.store, &self.state, &self.fetch_gate, &self.config, &key, 1).await;
    }

    /// Integration point for the app's mutation flows: after a successful
    /// create/update elsewhere, push the fresh entity into the cache.
    /// Replaces in place when the id is resident, otherwise falls back to a
    /// full invalidate so the item lands at its correct server position.
    pub async fn upsert_one(&self, entity: E) {
        let key = self.current_key();
        if !self.store.replace_item(&key, &entity) {
            self.reload().await;
        }
    }

    /// Optimistic local edit: shallow-merge a field patch into the cached
    /// copy. No-op if the id is not cached.
    pub fn patch_one(&self, id: i64, patch: &Value) -> AppResult<bool> {
        self.store.patch_item(&self.current_key(), id, patch)
    }

    /// Strip an id from every cached page across all fetch keys. Safe for
    /// ids that were never fetched.
    pub fn strip(&self, id: i64) {
        self.store.remove_everywhere(id);
    }

    /// Strip every row referencing a deleted parent document.
    pub fn strip_children(&self, parent_resource: &str, parent_id: i64) {
        self.store.remove_children_everywhere(parent_resource, parent_id);
    }

    /// Decide how a realtime `created` event is applied to this collection.
    pub fn plan_create(&self, id: i64) -> CreatePlan {
        match self.mode {
            // A new item's correct sort position is not knowable client-side
            // for a uniformly paged list.
            PagingMode::Uniform => CreatePlan::Invalidate,
            PagingMode::HeadTail => CreatePlan::OptimisticFetch { id },
        }
    }

    /// Apply a realtime `created` event according to `plan_create`.
    pub async fn apply_created(&self, id: i64) {
        match self.plan_create(id) {
            CreatePlan::Invalidate => self.reload().await,
            CreatePlan::OptimisticFetch { id } => {
                match self.fetch_created(id).await {
                    Ok(entity) => self.store.insert_at_head(&self.current_key(), entity),
                    Err(e) => {
                        log::debug!(
                            "optimistic create fetch failed for {} id {}: {}",
                            E::RESOURCE,
                            id,
                            e
                        );
                        self.reload().await;
                    }
                }
            }
        }
    }

    /// Start (or restart) the warm-up loop for the current key. A newer
    /// start supersedes the previous loop both by aborting its task and by
    /// the generation check it performs every iteration.
    pub fn start_warmup(&self) {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let gate = Arc::clone(&self.fetch_gate);
        let config = self.config.clone();
        let key = self.current_key();

        let task = tokio::spawn(async move {
            warm_up(fetcher, store, state, gate, config, key).await;
        });

        let mut slot = self.warmup.lock().unwrap();
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
    }

    async fn fetch_created(&self, id: i64) -> AppResult<E> {
        let value = self.fetcher.fetch_one(E::RESOURCE, id).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch server pages until the requested client page is locally
    /// resident or no further page exists. Bounded by the warm-up page cap.
    async fn ensure_resident(&self, key: &FetchKey, requested_page: u32) {
        let needed = requested_page as usize * self.config.page_size as usize;

        loop {
            let Some((pages, meta)) = self.store.snapshot(key) else {
                return;
            };
            if distinct_count(&pages) >= needed {
                return;
            }
            let Some(next) = next_missing_page(&pages, &meta, self.config.warmup_max_pages)
            else {
                return;
            };
            if !fetch_page_into(&self.fetcher, &self.store, &self.state, &self.fetch_gate, &self.config, key, next)
                .await
            {
                return;
            }
        }
    }
}

impl<E: CacheEntity> Drop for Collection<E> {
    fn drop(&mut self) {
        if let Some(task) = self.warmup.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Warm-Up Loop: keep requesting subsequent pages, one in flight at a time,
/// until the collection is fully loaded, the generation moves on, or the
/// page cap is hit. A failed iteration stops the loop silently; the next
/// read-triggered fetch may reattempt.
async fn warm_up<E: CacheEntity>(
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<PageCacheStore<E>>,
    state: Arc<Mutex<CollectionState>>,
    gate: Arc<AsyncMutex<()>>,
    config: SyncConfig,
    key: FetchKey,
) {
    loop {
        if state.lock().unwrap().generation != key.generation {
            return;
        }

        let Some((pages, meta)) = store.snapshot(&key) else {
            return;
        };
        if next_missing_page(&pages, &meta, config.warmup_max_pages).is_none() {
            return;
        }

        tokio::time::sleep(config.warmup_pacing).await;

        if state.lock().unwrap().generation != key.generation {
            return;
        }
        // Decide the page after the sleep: a read-triggered fetch may have
        // landed pages in the meantime.
        let Some((pages, meta)) = store.snapshot(&key) else {
            return;
        };
        let Some(next) = next_missing_page(&pages, &meta, config.warmup_max_pages) else {
            return;
        };
        if !fetch_page_into(&fetcher, &store, &state, &gate, &config, &key, next).await {
            return;
        }
    }
}

/// Fetch one page and append it under `key`, with the stale-write check:
/// a response that resolves after the collection moved to a newer
/// generation is discarded before it can touch the cache. Returns whether a
/// page was stored.
async fn fetch_page_into<E: CacheEntity>(
    fetcher: &Arc<dyn PageFetcher>,
    store: &PageCacheStore<E>,
    state: &Mutex<CollectionState>,
    gate: &AsyncMutex<()>,
    config: &SyncConfig,
    key: &FetchKey,
    page_number: u32,
) -> bool {
    // At most one fetch in flight per collection: the warm-up loop and
    // read-triggered fetches serialize here.
    let _in_flight = gate.lock().await;

    if state.lock().unwrap().generation != key.generation {
        return false;
    }
    state.lock().unwrap().loading = true;

    let request = PageRequest {
        collection: key.collection.clone(),
        page: page_number,
        page_size: key.page_size,
        params: key.params.clone(),
    };

    let result = match tokio::time::timeout(config.fetch_timeout, fetcher.fetch_page(&request))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout),
    };

    match result {
        Ok(raw) => {
            {
                let mut state = state.lock().unwrap();
                if state.generation != key.generation {
                    state.loading = false;
                    log::debug!(
                        "discarding stale page {} for {} (superseded generation {})",
                        page_number,
                        key.collection,
                        key.generation
                    );
                    return false;
                }
            }
            match typed_page::<E>(raw) {
                Ok(page) => {
                    store.append(key, page);
                    let mut state = state.lock().unwrap();
                    state.loading = false;
                    state.last_error = None;
                    true
                }
                Err(e) => {
                    let mut state = state.lock().unwrap();
                    state.loading = false;
                    state.last_error = Some(e.to_string());
                    false
                }
            }
        }
        Err(e) => {
            log::debug!(
                "page fetch failed for {} page {}: {}",
                key.collection,
                page_number,
                e
            );
            let mut state = state.lock().unwrap();
            state.loading = false;
            state.last_error = Some(e.to_string());
            false
        }
    }
}

fn typed_page<E: CacheEntity>(raw: RawPage) -> AppResult<CachedPage<E>> {
    let meta = PageMeta::from_raw(&raw);
    let items = raw
        .items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<E>, _>>()?;
    Ok(CachedPage {
        number: raw.page,
        items,
        meta,
    })
}
