//! Product catalog records (read-only to the ledger core).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One product row as the dispatcher sees it. SKU is the lookup key;
/// `cost_price` drives inventory valuation, `unit_price` the list price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub cost_price: f64,
    pub unit_price: f64,
}
