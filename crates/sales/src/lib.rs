//! `anchorledger-sales` — sales orders created by `ORDER_CONFIRMED`.

pub mod order;

pub use order::{NewOrderItem, NewSalesOrder, OrderLinePrice, OrderStatus, SalesOrder, SalesOrderItem};
