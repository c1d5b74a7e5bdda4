// src/cache/mod.rs
mod key;
mod store;
mod view;

pub use key::FetchKey;
pub use store::{CacheEntry, CachedPage, PageCacheStore};
pub use view::{compute_view, distinct_count, flatten_dedup, next_missing_page, ViewPage};
