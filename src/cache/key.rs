// src/cache/key.rs

use std::collections::BTreeMap;

/// Identity of one cache entry: collection + server paging/filter params +
/// a generation counter.
///
/// Two keys are equal iff every component is equal. Bumping the generation
/// produces a fresh key, which is how a cache entry gets invalidated without
/// touching the old one: in-flight fetches tagged with the old generation
/// no longer match and their results are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub collection: String,
    pub page_size: u32,
    pub params: BTreeMap<String, String>,
    pub generation: u64,
}

impl FetchKey {
    pub fn new(collection: impl Into<String>, page_size: u32) -> Self {
        Self {
            collection: collection.into(),
            page_size,
            params: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn at_generation(&self, generation: u64) -> Self {
        Self {
            generation,
            ..self.clone()
        }
    }
}
