//! Stock movements written alongside inventory-affecting journals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Ship,
    Return,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ship => "SHIP",
            Self::Return => "RETURN",
        }
    }
}

/// One stock movement row, stamped with the producing event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: i64,
    pub movement_type: MovementType,
    pub quantity: f64,
    pub unit_cost: f64,
    pub total_value: f64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub movement_date: DateTime<Utc>,
    pub source_event_id: Uuid,
}

impl StockMovement {
    /// Build a movement; `total_value` is always `quantity * unit_cost`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_id: Uuid,
        warehouse_id: i64,
        movement_type: MovementType,
        quantity: f64,
        unit_cost: f64,
        reference: Option<String>,
        notes: Option<String>,
        movement_date: DateTime<Utc>,
        source_event_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            product_id,
            warehouse_id,
            movement_type,
            quantity,
            unit_cost,
            total_value: quantity * unit_cost,
            reference,
            notes,
            movement_date,
            source_event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_value_is_quantity_times_cost() {
        let movement = StockMovement::new(
            Uuid::nil(),
            1,
            MovementType::Ship,
            3.0,
            10.0,
            Some("SO-1".into()),
            None,
            Utc::now(),
            Uuid::nil(),
        );
        assert_eq!(movement.total_value, 30.0);
        assert_eq!(movement.movement_type.as_str(), "SHIP");
    }
}
