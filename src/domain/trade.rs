// src/domain/trade.rs
//
// Sales, purchases, and their payment rows.
//
// Payment rows reference their parent document by id; a deleted sale or
// purchase cascades into its payments (see realtime::reducers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::CacheEntity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub paid: f64,
    pub date: DateTime<Utc>,
}

impl CacheEntity for Sale {
    const RESOURCE: &'static str = "sale";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.id, self.customer_name)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn has_pending_balance(&self) -> bool {
        self.paid < self.total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePayment {
    pub id: i64,
    pub sale_id: i64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub bank: String,
    pub date: DateTime<Utc>,
}

impl CacheEntity for SalePayment {
    const RESOURCE: &'static str = "sale_payment";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.id, self.bank)
    }

    fn bank(&self) -> Option<&str> {
        Some(&self.bank)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn parent_id(&self, parent_resource: &str) -> Option<i64> {
        (parent_resource == Sale::RESOURCE).then_some(self.sale_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: i64,
    pub supplier_id: i64,
    #[serde(default)]
    pub supplier_name: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub paid: f64,
    pub date: DateTime<Utc>,
}

impl CacheEntity for Purchase {
    const RESOURCE: &'static str = "purchase";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.id, self.supplier_name)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn has_pending_balance(&self) -> bool {
        self.paid < self.total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasePayment {
    pub id: i64,
    pub purchase_id: i64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub bank: String,
    pub date: DateTime<Utc>,
}

impl CacheEntity for PurchasePayment {
    const RESOURCE: &'static str = "purchase_payment";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {}", self.id, self.bank)
    }

    fn bank(&self) -> Option<&str> {
        Some(&self.bank)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn parent_id(&self, parent_resource: &str) -> Option<i64> {
        (parent_resource == Purchase::RESOURCE).then_some(self.purchase_id)
    }
}
