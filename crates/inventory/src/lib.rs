//! `anchorledger-inventory` — products and stock movements.

pub mod movement;
pub mod product;

pub use movement::{MovementType, StockMovement};
pub use product::Product;
