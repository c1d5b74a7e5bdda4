// src/cache/store.rs
//
// Page Cache Store - fetched pages per fetch key.
//
// All mutation entry points take the lock once and apply completely, so a
// concurrent reader observes either the prior state or the new one, never an
// interleaving. Operations on one key never touch another key's entry.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::backend::PageMeta;
use crate::cache::key::FetchKey;
use crate::domain::CacheEntity;
use crate::error::{AppError, AppResult};

/// One fetched server page, typed.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage<E> {
    pub number: u32,
    pub items: Vec<E>,
    pub meta: PageMeta,
}

/// All pages fetched so far for one fetch key, ordered by page number.
#[derive(Debug, Clone)]
pub struct CacheEntry<E> {
    pub pages: Vec<CachedPage<E>>,
    /// Merged pagination metadata, freshest page wins.
    pub meta: PageMeta,
}

impl<E> Default for CacheEntry<E> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            meta: PageMeta::default(),
        }
    }
}

pub struct PageCacheStore<E: CacheEntity> {
    entries: Mutex<HashMap<FetchKey, CacheEntry<E>>>,
}

impl<E: CacheEntity> Default for PageCacheStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CacheEntity> PageCacheStore<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a page in page-number order. A page identical to the one
    /// already cached under the same number is a no-op; a differing page
    /// under the same number replaces it (a refetch observed newer data).
    /// Returns whether the entry changed.
    pub fn append(&self, key: &FetchKey, page: CachedPage<E>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_default();

        entry.meta = entry.meta.merge(&page.meta);

        match entry.pages.binary_search_by_key(&page.number, |p| p.number) {
            Ok(pos) => {
                if entry.pages[pos] == page {
                    return false;
                }
                entry.pages[pos] = page;
            }
            Err(pos) => entry.pages.insert(pos, page),
        }
        true
    }

    /// Shallow-merge a JSON patch into the cached item with the given id,
    /// wherever it sits in this key's pages. No-op if the id is not cached.
    pub fn patch_item(&self, key: &FetchKey, id: i64, patch: &Value) -> AppResult<bool> {
        let Value::Object(patch_fields) = patch else {
            return Err(AppError::Other("item patch must be a JSON object".to_string()));
        };

        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };

        for page in &mut entry.pages {
            if let Some(item) = page.items.iter_mut().find(|item| item.id() == id) {
                let mut value = serde_json::to_value(&*item)?;
                let Value::Object(fields) = &mut value else {
                    return Err(AppError::Other("cached item is not a JSON object".to_string()));
                };
                for (k, v) in patch_fields {
                    fields.insert(k.clone(), v.clone());
                }
                *item = serde_json::from_value(value)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Replace the cached copy of an entity wherever it sits in this key's
    /// pages. Returns false if the id is not cached.
    pub fn replace_item(&self, key: &FetchKey, entity: &E) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };

        for page in &mut entry.pages {
            if let Some(item) = page.items.iter_mut().find(|item| item.id() == entity.id()) {
                *item = entity.clone();
                return true;
            }
        }
        false
    }

    /// Splice an entity at the front of the first page of this key's entry,
    /// trimming the page back to its size. Used by the optimistic create
    /// path on head/tail collections.
    pub fn insert_at_head(&self, key: &FetchKey, entity: E) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_default();

        let head = match entry.pages.first_mut() {
            Some(head) if head.number == 1 => head,
            _ => {
                entry.pages.insert(
                    0,
                    CachedPage {
                        number: 1,
                        items: Vec::new(),
                        meta: entry.meta,
                    },
                );
                &mut entry.pages[0]
            }
        };

        head.items.retain(|item| item.id() != entity.id());
        head.items.insert(0, entity);
        head.items.truncate(key.page_size as usize);
    }

    /// Remove the item with the given id from whichever page of this key's
    /// entry contains it. Unknown ids are a silent no-op; a delete event may
    /// target an item never fetched.
    pub fn remove_item(&self, key: &FetchKey, id: i64) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        Self::strip_from_entry(entry, id)
    }

    /// Remove the item with the given id from every entry, across all fetch
    /// keys. Returns how many entries were touched.
    pub fn remove_everywhere(&self, id: i64) -> usize {
        let mut entries = self.entries.lock().unwrap();
        entries
            .values_mut()
            .map(|entry| Self::strip_from_entry(entry, id))
            .filter(|&changed| changed)
            .count()
    }

    /// Remove every item referencing `parent_id` under `parent_resource`,
    /// across all fetch keys. Cascade path for deleted parent documents.
    pub fn remove_children_everywhere(&self, parent_resource: &str, parent_id: i64) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let mut touched = 0;
        for entry in entries.values_mut() {
            let mut changed = false;
            for page in &mut entry.pages {
                let before = page.items.len();
                page.items
                    .retain(|item| item.parent_id(parent_resource) != Some(parent_id));
                changed |= page.items.len() != before;
            }
            if changed {
                touched += 1;
            }
        }
        touched
    }

    /// Snapshot one entry's pages and merged metadata.
    pub fn snapshot(&self, key: &FetchKey) -> Option<(Vec<CachedPage<E>>, PageMeta)> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .map(|entry| (entry.pages.clone(), entry.meta))
    }

    /// Drop every entry except the one under `current`. Superseded
    /// generations have no readers left once their key changed.
    pub fn purge_except(&self, current: &FetchKey) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|key, _| key == current);
    }

    fn strip_from_entry(entry: &mut CacheEntry<E>, id: i64) -> bool {
        let mut changed = false;
        for page in &mut entry.pages {
            let before = page.items.len();
            page.items.retain(|item| item.id() != id);
            changed |= page.items.len() != before;
        }
        changed
    }
}
