// src/backend/mod.rs
mod fetcher;
mod paging;

#[cfg(test)]
pub use fetcher::MockPageFetcher;
pub use fetcher::{FetcherConfig, HttpPageFetcher, PageFetcher};
pub use paging::{PageMeta, PageRequest, RawPage};
