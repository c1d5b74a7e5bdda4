// src/domain/parties.rs
//
// Customers and suppliers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::CacheEntity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub city: String,
    /// Outstanding amount the customer still owes.
    #[serde(default)]
    pub balance_due: f64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntity for Customer {
    const RESOURCE: &'static str = "customer";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.name, self.phone)
    }

    fn city(&self) -> Option<&str> {
        Some(&self.city)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn has_pending_balance(&self) -> bool {
        self.balance_due > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub city: String,
    /// Outstanding amount owed to the supplier.
    #[serde(default)]
    pub balance_due: f64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntity for Supplier {
    const RESOURCE: &'static str = "supplier";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.name, self.phone)
    }

    fn city(&self) -> Option<&str> {
        Some(&self.city)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.created_at)
    }

    fn has_pending_balance(&self) -> bool {
        self.balance_due > 0.0
    }
}
