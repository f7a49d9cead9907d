//! Sales order records.
//!
//! Orders are written exactly once when `ORDER_CONFIRMED` is applied and
//! read (never mutated) by later delivery/return handlers to recover the
//! agreed unit price per SKU.

use anchorledger_core::round2;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status. The dispatcher only ever creates confirmed orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Confirmed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
        }
    }
}

/// A persisted sales order header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub order_date: NaiveDate,
    pub subtotal: f64,
    pub total_amount: f64,
    pub source_event_id: Uuid,
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub id: Uuid,
    pub sales_order_id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
    pub source_event_id: Uuid,
}

/// Insert form of one order line.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub sku: String,
    pub quantity: f64,
    pub unit_price: f64,
}

impl NewOrderItem {
    pub fn line_total(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Insert form of a sales order with its lines.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSalesOrder {
    pub order_number: String,
    pub customer_id: String,
    pub order_date: NaiveDate,
    pub items: Vec<NewOrderItem>,
    pub source_event_id: Uuid,
}

impl NewSalesOrder {
    /// Sum of line totals, rounded at the output boundary.
    pub fn subtotal(&self) -> f64 {
        round2(self.items.iter().map(NewOrderItem::line_total).sum())
    }
}

/// Agreed price lookup: one entry per SKU of the originating order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderLinePrice {
    pub product_id: Uuid,
    pub unit_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtotal_sums_line_totals() {
        let order = NewSalesOrder {
            order_number: "SO-1001".into(),
            customer_id: "CUST-1".into(),
            order_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            items: vec![
                NewOrderItem {
                    product_id: Uuid::nil(),
                    sku: "SKU-1".into(),
                    quantity: 1.0,
                    unit_price: 25.0,
                },
                NewOrderItem {
                    product_id: Uuid::nil(),
                    sku: "SKU-2".into(),
                    quantity: 1.0,
                    unit_price: 35.0,
                },
            ],
            source_event_id: Uuid::nil(),
        };

        assert_eq!(order.subtotal(), 60.0);
    }
}
