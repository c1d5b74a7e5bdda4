// src/domain/ledger.rs
//
// Bank transactions and profit-report rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entity::CacheEntity;
use crate::domain::trade::{Purchase, Sale};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// "deposit", "withdrawal", "sale_payment", "purchase_payment", ...
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub bank: String,
    #[serde(default)]
    pub sale_id: Option<i64>,
    #[serde(default)]
    pub purchase_id: Option<i64>,
    pub date: DateTime<Utc>,
}

impl CacheEntity for Transaction {
    const RESOURCE: &'static str = "transaction";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        format!("{} {} {}", self.id, self.kind, self.bank)
    }

    fn bank(&self) -> Option<&str> {
        Some(&self.bank)
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn parent_id(&self, parent_resource: &str) -> Option<i64> {
        if parent_resource == Sale::RESOURCE {
            self.sale_id
        } else if parent_resource == Purchase::RESOURCE {
            self.purchase_id
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitRow {
    pub id: i64,
    #[serde(default)]
    pub sale_id: Option<i64>,
    #[serde(default)]
    pub revenue: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub profit: f64,
    pub date: DateTime<Utc>,
}

impl CacheEntity for ProfitRow {
    const RESOURCE: &'static str = "profit";

    fn id(&self) -> i64 {
        self.id
    }

    fn search_haystack(&self) -> String {
        self.id.to_string()
    }

    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }

    fn parent_id(&self, parent_resource: &str) -> Option<i64> {
        if parent_resource == Sale::RESOURCE {
            self.sale_id
        } else {
            None
        }
    }
}
