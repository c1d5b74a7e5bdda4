// src/domain/filters.rs
//
// Client-side filter predicates.
//
// All predicates are ANDed. Filtering happens over the locally cached set,
// independent of whatever server-side params were part of the fetch key.

use chrono::NaiveDate;

use crate::domain::entity::CacheEntity;

/// The set of active client-side filters for one collection view.
///
/// An empty set matches everything. The date range is inclusive at day
/// granularity: an entity dated anywhere inside `date_from`'s day through
/// `date_to`'s day matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    /// Case-insensitive substring match against the entity's search haystack.
    pub query: Option<String>,
    pub city: Option<String>,
    pub bank: Option<String>,
    pub category: Option<String>,
    /// Only entities with an outstanding balance.
    pub pending_only: bool,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.query.is_none()
            && self.city.is_none()
            && self.bank.is_none()
            && self.category.is_none()
            && !self.pending_only
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    pub fn matches<E: CacheEntity>(&self, entity: &E) -> bool {
        if let Some(query) = &self.query {
            let haystack = entity.search_haystack().to_lowercase();
            if !haystack.contains(&query.to_lowercase()) {
                return false;
            }
        }

        if let Some(city) = &self.city {
            match entity.city() {
                Some(c) if c.eq_ignore_ascii_case(city) => {}
                _ => return false,
            }
        }

        if let Some(bank) = &self.bank {
            match entity.bank() {
                Some(b) if b.eq_ignore_ascii_case(bank) => {}
                _ => return false,
            }
        }

        if let Some(category) = &self.category {
            match entity.category() {
                Some(c) if c.eq_ignore_ascii_case(category) => {}
                _ => return false,
            }
        }

        if self.pending_only && !entity.has_pending_balance() {
            return false;
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = entity.date() else {
                return false;
            };
            let day = date.date_naive();
            if let Some(from) = self.date_from {
                if day < from {
                    return false;
                }
            }
            if let Some(to) = self.date_to {
                if day > to {
                    return false;
                }
            }
        }

        true
    }
}
