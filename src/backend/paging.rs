// src/backend/paging.rs
//
// Wire types for the backend paging endpoint.
//
// The backend reports any subset of `total` / `total_pages` / `has_next`;
// PageMeta derives whichever are missing from the others or from what the
// page itself shows.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// One request against `GET /<collection>?page=<n>&page_size=<m>&<params>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub collection: String,
    pub page: u32,
    pub page_size: u32,
    /// Server-side filter params that actually affect backend results.
    pub params: BTreeMap<String, String>,
}

/// One page of a collection as returned by the backend, items still raw.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub items: Vec<Value>,
    pub page: u32,
    pub page_size: u32,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub has_next: Option<bool>,
}

/// Pagination metadata with the missing pieces derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub total: Option<u64>,
    pub total_pages: Option<u32>,
    pub has_next: bool,
}

impl PageMeta {
    pub fn from_raw(raw: &RawPage) -> Self {
        let page_size = raw.page_size.max(1);

        let total_pages = raw.total_pages.or_else(|| {
            raw.total
                .map(|total| (total.div_ceil(u64::from(page_size)) as u32).max(1))
        });

        let has_next = raw.has_next.unwrap_or_else(|| match total_pages {
            Some(tp) => raw.page < tp,
            // Nothing reported: a full page suggests there is more.
            None => raw.items.len() >= page_size as usize && !raw.items.is_empty(),
        });

        Self {
            total: raw.total,
            total_pages,
            has_next,
        }
    }

    /// Merge metadata from a newer page over older knowledge. Later pages
    /// carry fresher totals.
    pub fn merge(&self, newer: &Self) -> Self {
        Self {
            total: newer.total.or(self.total),
            total_pages: newer.total_pages.or(self.total_pages),
            has_next: newer.has_next,
        }
    }
}
