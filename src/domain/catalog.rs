// src/domain/catalog.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::CacheEntity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntity for Product {
    const RESOURCE: &'static str = "product";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.name, self.category)
    }

    fn category(&self) -> Option<&str> {
        Some(&self.category)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }
}
