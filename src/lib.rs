// src/lib.rs
// TradeHub Sync - client-side paginated data synchronization engine
//
// Architecture:
// - Page-oriented: the server's pages are the cache unit, the client
//   re-paginates locally
// - Read-triggered: fetching happens on view() and in a paced warm-up loop,
//   never speculatively
// - Event-driven: realtime events flow through per-resource reducers
// - Explicit: connection lifecycle behind init()/teardown(), no globals

pub mod backend;
pub mod cache;
pub mod domain;
pub mod engine;
pub mod error;
pub mod realtime;
pub mod sync;

// ============================================================================
// PUBLIC API - Error Types
// ============================================================================

pub use error::{AppError, AppResult};

// ============================================================================
// PUBLIC API - Domain Entities
// ============================================================================

pub use domain::{
    CacheEntity,
    Customer,
    FilterSet,
    Product,
    ProfitRow,
    Purchase,
    PurchasePayment,
    Sale,
    SalePayment,
    Supplier,
    Transaction,
};

// ============================================================================
// PUBLIC API - Backend
// ============================================================================

pub use backend::{FetcherConfig, HttpPageFetcher, PageFetcher, PageMeta, PageRequest, RawPage};

// ============================================================================
// PUBLIC API - Page Cache
// ============================================================================

pub use cache::{CachedPage, FetchKey, PageCacheStore, ViewPage};

// ============================================================================
// PUBLIC API - Sync
// ============================================================================

pub use sync::{Collection, CreatePlan, PagingMode, SyncConfig};

// ============================================================================
// PUBLIC API - Realtime
// ============================================================================

pub use realtime::{
    BridgeConfig,
    CascadeRule,
    ConnectionState,
    EventAction,
    JsonLineTransport,
    RealtimeBridge,
    RealtimeStream,
    RealtimeTransport,
    ReducerRegistry,
    RemoteEvent,
    ResourceCache,
    StaticTokenSource,
    TokenSource,
};

// ============================================================================
// PUBLIC API - Engine
// ============================================================================

pub use engine::{EngineConfig, SyncEngine};
