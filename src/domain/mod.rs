// src/domain/mod.rs
mod catalog;
mod entity;
mod filters;
mod ledger;
mod parties;
mod trade;

pub use catalog::Product;
pub use entity::CacheEntity;
pub use filters::FilterSet;
pub use ledger::{ProfitRow, Transaction};
pub use parties::{Customer, Supplier};
pub use trade::{Purchase, PurchasePayment, Sale, SalePayment};
