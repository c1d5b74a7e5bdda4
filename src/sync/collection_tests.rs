// src/sync/collection_tests.rs
//
// End-to-end tests for the collection surface: residency fetching, warm-up
// cancellation, stale-write rejection, and the realtime delete flow.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::backend::{MockPageFetcher, PageFetcher, PageRequest, RawPage};
use crate::domain::Customer;
use crate::error::{AppError, AppResult};
use crate::sync::{Collection, CreatePlan, PagingMode, SyncConfig};

fn customer_value(id: i64) -> Value {
    json!({
        "id": id,
        "name": format!("Customer {id}"),
        "phone": "",
        "city": "Bogota",
        "balance_due": 0.0,
        "created_at": "2024-03-15T12:00:00Z",
    })
}

/// Serves pages out of an in-memory dataset, recording every request.
/// Individual pages can be scripted to fail.
struct ScriptedFetcher {
    items: Mutex<Vec<Value>>,
    requests: Mutex<Vec<PageRequest>>,
    fail_pages: Mutex<HashSet<u32>>,
}

impl ScriptedFetcher {
    fn with_customers(count: i64) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new((1..=count).map(customer_value).collect()),
            requests: Mutex::new(Vec::new()),
            fail_pages: Mutex::new(HashSet::new()),
        })
    }

    fn fail_page(&self, page: u32) {
        self.fail_pages.lock().unwrap().insert(page);
    }

    fn delete_item(&self, id: i64) {
        self.items.lock().unwrap().retain(|v| v["id"] != id);
    }

    fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<RawPage> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_pages.lock().unwrap().contains(&request.page) {
            return Err(AppError::Transport("scripted failure".to_string()));
        }

        let items = self.items.lock().unwrap();
        let total = items.len();
        let start = ((request.page - 1) * request.page_size) as usize;
        let end = (start + request.page_size as usize).min(total);
        let slice = if start < total {
            items[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(RawPage {
            items: slice,
            page: request.page,
            page_size: request.page_size,
            total: Some(total as u64),
            total_pages: None,
            has_next: None,
        })
    }

    async fn fetch_one(&self, _collection: &str, id: i64) -> AppResult<Value> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|v| v["id"] == id)
            .cloned()
            .ok_or(AppError::Status {
                status: 404,
                message: "not found".to_string(),
            })
    }
}

fn test_config() -> SyncConfig {
    SyncConfig {
        page_size: 10,
        warmup_pacing: Duration::from_millis(100),
        warmup_max_pages: 200,
        fetch_timeout: Duration::from_secs(5),
    }
}

fn collection(fetcher: Arc<ScriptedFetcher>) -> Collection<Customer> {
    Collection::new(fetcher, test_config(), PagingMode::Uniform)
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

/// Release one warm-up iteration under paused time.
async fn tick(pacing: Duration) {
    tokio::time::advance(pacing).await;
    settle().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_requesting_a_page_beyond_the_end_clamps_to_the_last() {
    // 25 customers, page_size 10, server reports total 25.
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = collection(Arc::clone(&fetcher));

    col.set_page(4);
    let view = col.view().await;

    assert_eq!(view.total, 25);
    assert_eq!(view.total_pages, 3);
    assert_eq!(view.page, 3);
    assert_eq!(
        view.items.iter().map(|c| c.id).collect::<Vec<_>>(),
        (21..=25).collect::<Vec<_>>()
    );
    assert!(view.has_prev);
    assert!(!view.has_next);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_view_fetches_only_what_the_requested_page_needs() {
    let fetcher = ScriptedFetcher::with_customers(50);
    let col = collection(Arc::clone(&fetcher));

    let view = col.view().await;
    assert_eq!(view.items.len(), 10);

    // Page 1 resident satisfies the read; deeper pages are the warm-up
    // loop's job.
    let direct: Vec<u32> = fetcher.requests().iter().map(|r| r.page).collect();
    assert_eq!(direct, vec![1]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_warmup_loads_the_full_collection_one_page_at_a_time() {
    let fetcher = ScriptedFetcher::with_customers(50);
    let col = collection(Arc::clone(&fetcher));

    col.view().await;
    for _ in 0..6 {
        tick(test_config().warmup_pacing).await;
    }

    let pages: Vec<u32> = fetcher.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2, 3, 4, 5]);

    // Everything resident: a deep page read triggers no further fetch.
    col.set_page(5);
    let view = col.view().await;
    assert_eq!(view.items.len(), 10);
    assert_eq!(fetcher.requests().len(), 5);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_superseded_warmup_stops_within_one_iteration() {
    // Five server pages; generation 1 gets through two of them before the
    // key changes.
    let fetcher = ScriptedFetcher::with_customers(50);
    let col = collection(Arc::clone(&fetcher));

    col.view().await;
    // The first tick parks the freshly spawned loop on its pacing sleep;
    // the second releases the page 2 fetch.
    tick(test_config().warmup_pacing).await;
    tick(test_config().warmup_pacing).await;
    assert_eq!(fetcher.requests().len(), 2);

    let mut params = BTreeMap::new();
    params.insert("status".to_string(), "active".to_string());
    col.set_server_params(params.clone());

    // The old loop wakes once, observes the generation bump, and exits
    // without issuing another request.
    for _ in 0..5 {
        tick(test_config().warmup_pacing).await;
    }
    let requests = fetcher.requests();
    let stale: Vec<&PageRequest> = requests.iter().filter(|r| r.params.is_empty()).collect();
    assert_eq!(stale.len(), 2);

    // The new generation starts its own sequence from page 1 of its key.
    col.view().await;
    let fresh: Vec<u32> = fetcher
        .requests()
        .iter()
        .filter(|r| r.params == params)
        .map(|r| r.page)
        .collect();
    assert_eq!(fresh[0], 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_failed_warmup_page_keeps_loaded_rows_and_stops_silently() {
    let fetcher = ScriptedFetcher::with_customers(50);
    fetcher.fail_page(2);
    let col = collection(Arc::clone(&fetcher));

    col.view().await;
    for _ in 0..4 {
        tick(test_config().warmup_pacing).await;
    }

    // The loop stopped at the failure instead of marching on to page 3.
    let pages: Vec<u32> = fetcher.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2]);
    assert!(col.last_error().is_some());

    // Page 1 stays fully visible despite the later failure.
    col.set_page(1);
    let view = col.view().await;
    assert_eq!(view.items.len(), 10);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_realtime_delete_flow_strips_then_reconciles_totals() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = collection(Arc::clone(&fetcher));
    let before = col.view().await;
    assert_eq!(before.total, 25);

    // Deleted event for customer 7: synchronous strip first.
    col.strip(7);
    let stripped = col.view().await;
    assert!(stripped.items.iter().all(|c| c.id != 7));

    // The backend processed the delete; the reconciling refetch lands.
    fetcher.delete_item(7);
    col.reload().await;
    for _ in 0..4 {
        tick(test_config().warmup_pacing).await;
    }

    let after = col.view().await;
    assert_eq!(after.total, 24);
    assert!(after.items.iter().all(|c| c.id != 7));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_late_fetch_for_a_superseded_generation_is_discarded() {
    // A fetch that resolves after the generation moved on must not write
    // into the cache.
    struct GatedFetcher {
        inner: Arc<ScriptedFetcher>,
        gate: Semaphore,
    }

    #[async_trait]
    impl PageFetcher for GatedFetcher {
        async fn fetch_page(&self, request: &PageRequest) -> AppResult<RawPage> {
            let _permit = self.gate.acquire().await.map_err(|_| AppError::ConnectionClosed)?;
            self.inner.fetch_page(request).await
        }

        async fn fetch_one(&self, collection: &str, id: i64) -> AppResult<Value> {
            self.inner.fetch_one(collection, id).await
        }
    }

    let scripted = ScriptedFetcher::with_customers(25);
    let gated = Arc::new(GatedFetcher {
        inner: Arc::clone(&scripted),
        gate: Semaphore::new(0),
    });
    let col = Arc::new(Collection::<Customer>::new(
        gated.clone(),
        test_config(),
        PagingMode::Uniform,
    ));

    let stale_view = {
        let col = Arc::clone(&col);
        tokio::spawn(async move { col.view().await })
    };
    settle().await;

    // While page 1 of generation 0 is in flight, the key changes.
    let mut params = BTreeMap::new();
    params.insert("status".to_string(), "active".to_string());
    col.set_server_params(params);
    gated.gate.add_permits(100);

    // The late response was dropped: the superseded read computed its view
    // from an empty cache.
    let view = stale_view.await.unwrap();
    assert!(view.items.is_empty());
    // The discarded response must not leave the collection stuck loading.
    assert!(!col.loading());

    // The new generation fetches fresh data for its own key.
    let fresh = col.view().await;
    assert_eq!(fresh.items.len(), 10);
    assert!(fresh.items.iter().all(|c| c.id >= 1));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_changing_filters_resets_the_requested_page() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = collection(fetcher);
    col.view().await;

    col.set_page(3);
    assert_eq!(col.page(), 3);

    col.set_filters(crate::domain::FilterSet {
        query: Some("customer 1".to_string()),
        ..Default::default()
    });
    assert_eq!(col.page(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_upsert_replaces_in_place_when_resident() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = collection(Arc::clone(&fetcher));
    col.view().await;
    let requests_before = fetcher.requests().len();

    let mut updated = col.view().await.items[2].clone();
    updated.name = "Renamed locally".to_string();
    col.upsert_one(updated.clone()).await;

    let view = col.view().await;
    assert_eq!(view.items[2].name, "Renamed locally");
    // Resident id: no refetch needed.
    assert_eq!(fetcher.requests().len(), requests_before);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_upsert_of_unseen_id_falls_back_to_invalidate() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = collection(Arc::clone(&fetcher));
    col.view().await;
    let generation_before = col.generation();

    let unseen: Customer = serde_json::from_value(customer_value(999)).unwrap();
    col.upsert_one(unseen).await;

    assert_eq!(col.generation(), generation_before + 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_optimistic_create_splices_into_the_head_page() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = Collection::<Customer>::new(
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        test_config(),
        PagingMode::HeadTail,
    );
    col.view().await;

    assert_eq!(col.plan_create(26), CreatePlan::OptimisticFetch { id: 26 });

    fetcher.items.lock().unwrap().push(customer_value(26));
    col.apply_created(26).await;

    let view = col.view().await;
    assert_eq!(view.items[0].id, 26);
    assert_eq!(view.items.len(), 10);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_failed_optimistic_create_falls_back_to_invalidate() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = Collection::<Customer>::new(
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        test_config(),
        PagingMode::HeadTail,
    );
    col.view().await;
    let generation_before = col.generation();

    // id 999 does not exist on the backend; the single-entity fetch 404s.
    col.apply_created(999).await;

    assert_eq!(col.generation(), generation_before + 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_uniform_collections_invalidate_on_create() {
    let fetcher = ScriptedFetcher::with_customers(25);
    let col = collection(fetcher);
    assert_eq!(col.plan_create(26), CreatePlan::Invalidate);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_head_refresh_keeps_the_warmed_tail() {
    let fetcher = ScriptedFetcher::with_customers(30);
    let col = Collection::<Customer>::new(
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        test_config(),
        PagingMode::HeadTail,
    );

    col.view().await;
    for _ in 0..4 {
        tick(test_config().warmup_pacing).await;
    }
    assert_eq!(fetcher.requests().len(), 3);

    // A new row lands at the front on the backend.
    fetcher.items.lock().unwrap().insert(0, customer_value(31));
    col.refresh_head().await;

    // Exactly one more request, for page 1 only; pages 2-3 stay cached.
    let pages: Vec<u32> = fetcher.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2, 3, 1]);

    let view = col.view().await;
    assert_eq!(view.items[0].id, 31);
    assert_eq!(view.total, 31);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_terminal_fetch_error_is_surfaced_through_last_error() {
    let mut mock = MockPageFetcher::new();
    mock.expect_fetch_page().returning(|_| {
        Err(AppError::Status {
            status: 403,
            message: "forbidden".to_string(),
        })
    });

    let col = Collection::<Customer>::new(Arc::new(mock), test_config(), PagingMode::Uniform);
    let view = col.view().await;

    assert!(view.items.is_empty());
    assert!(!col.loading());
    assert!(col.last_error().unwrap().contains("403"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_reload_counter() {
    let fetcher = ScriptedFetcher::with_customers(5);
    let col = collection(Arc::clone(&fetcher));
    col.view().await;

    col.reload().await;
    col.reload().await;

    // Each reload starts over from page 1 under a fresh key.
    let pages: Vec<u32> = fetcher.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 1, 1]);
    assert_eq!(col.generation(), 2);
}

/// Counts overlapping fetch_page calls while delaying each response.
struct CountingFetcher {
    inner: Arc<ScriptedFetcher>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<RawPage> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.fetch_page(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_one(&self, collection: &str, id: i64) -> AppResult<Value> {
        self.inner.fetch_one(collection, id).await
    }
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_fetches_for_one_key_never_overlap() {
    let scripted = ScriptedFetcher::with_customers(30);
    let counting = Arc::new(CountingFetcher {
        inner: Arc::clone(&scripted),
        delay: Duration::from_millis(250),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let col = Arc::new(Collection::<Customer>::new(
        Arc::clone(&counting) as Arc<dyn PageFetcher>,
        test_config(),
        PagingMode::Uniform,
    ));

    col.view().await;

    // Park the warm-up loop inside its page 2 fetch, then request client
    // page 2 so the read path wants the very same server page.
    tick(test_config().warmup_pacing).await;
    tick(test_config().warmup_pacing).await;
    col.set_page(2);
    let read = {
        let col = Arc::clone(&col);
        tokio::spawn(async move { col.view().await })
    };

    let view = read.await.unwrap();
    assert_eq!(
        view.items.iter().map(|c| c.id).collect::<Vec<_>>(),
        (11..=20).collect::<Vec<_>>()
    );
    assert_eq!(counting.max_in_flight.load(Ordering::SeqCst), 1);
}
