// src/cache/view.rs
//
// Client Filter/Sort/Paginate Layer.
//
// Pure functions from cached pages + filters + requested page to the
// materialized view. Nothing here is stored; identical inputs yield an
// identical ordered list.

use crate::backend::PageMeta;
use crate::cache::store::CachedPage;
use crate::domain::{CacheEntity, FilterSet};

/// The client-paginated projection handed to the UI. Page boundaries here
/// are the caller's page size, independent of how the server paginated.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewPage<E> {
    pub items: Vec<E>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Flatten all cached pages into one ordered, deduplicated list. Later
/// occurrences of an id win (a refetch shifting page boundaries may surface
/// the same item twice); the item keeps its first position so server order
/// is preserved.
pub fn flatten_dedup<E: CacheEntity>(pages: &[CachedPage<E>]) -> Vec<E> {
    let mut ordered: Vec<E> = Vec::new();
    let mut index_by_id = std::collections::HashMap::new();

    for page in pages {
        for item in &page.items {
            match index_by_id.get(&item.id()) {
                Some(&pos) => ordered[pos] = item.clone(),
                None => {
                    index_by_id.insert(item.id(), ordered.len());
                    ordered.push(item.clone());
                }
            }
        }
    }
    ordered
}

/// Deduplicated count of locally resident items, before any filtering.
pub fn distinct_count<E: CacheEntity>(pages: &[CachedPage<E>]) -> usize {
    let mut seen = std::collections::HashSet::new();
    pages
        .iter()
        .flat_map(|page| &page.items)
        .filter(|item| seen.insert(item.id()))
        .count()
}

/// Compute the materialized view for one read.
pub fn compute_view<E: CacheEntity>(
    pages: &[CachedPage<E>],
    meta: &PageMeta,
    filters: &FilterSet,
    requested_page: u32,
    page_size: u32,
) -> ViewPage<E> {
    let page_size = page_size.max(1);
    let mut items = flatten_dedup(pages);
    items.retain(|item| filters.matches(item));

    // Server total is authoritative for how many exist, but only while no
    // client-side filter narrows the set; a filter can only count what has
    // been fetched so far. Never claim fewer pages than the server knows
    // about while warm-up is still catching up.
    let total = if filters.is_empty() {
        match meta.total {
            Some(server_total) => server_total.max(items.len() as u64),
            None => items.len() as u64,
        }
    } else {
        items.len() as u64
    };

    let total_pages = (total.div_ceil(u64::from(page_size)) as u32).max(1);
    let page = requested_page.clamp(1, total_pages);

    let start = ((page - 1) * page_size) as usize;
    let end = (start + page_size as usize).min(items.len());
    let items = if start < items.len() {
        items[start..end].to_vec()
    } else {
        Vec::new()
    };

    ViewPage {
        items,
        page,
        page_size,
        total,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
    }
}

/// The explicit fetch scheduler: given what is cached and what the server
/// reported, decide the next server page to request, if any. Drives both the
/// warm-up loop and on-demand residency fetches.
pub fn next_missing_page<E: CacheEntity>(
    pages: &[CachedPage<E>],
    meta: &PageMeta,
    max_pages: u32,
) -> Option<u32> {
    let mut next = 1u32;
    for page in pages {
        if page.number == next {
            next += 1;
        } else if page.number > next {
            // Gap inside the cached range; fill it first.
            break;
        }
    }

    if next > max_pages {
        return None;
    }

    if let Some(total_pages) = meta.total_pages {
        if next > total_pages {
            return None;
        }
        return Some(next);
    }

    // No reported page count: past the cached tail we only continue while
    // the freshest page said there is more.
    let past_tail = pages.last().map_or(true, |last| next > last.number);
    if past_tail && !pages.is_empty() && !meta.has_next {
        return None;
    }
    Some(next)
}
