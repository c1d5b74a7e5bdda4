// src/sync/mod.rs
mod collection;

#[cfg(test)]
mod collection_tests;

pub use collection::{Collection, CreatePlan, PagingMode, SyncConfig};
