use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Cart Snapshot - read model handed over by the cart collaborator
// ============================================================================
//
// The cart itself is owned elsewhere. Checkout only ever sees this frozen
// copy: lines carry the unit price stored when the product was added and the
// product name as it reads right now.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            lines: Vec::new(),
        }
    }

    pub fn with_line(
        mut self,
        product_id: Uuid,
        product_name: impl Into<String>,
        unit_price: Decimal,
        quantity: i32,
    ) -> Self {
        self.lines.push(CartLine {
            id: Uuid::new_v4(),
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Ids of the lines in this snapshot; checkout removes exactly these.
    pub fn line_ids(&self) -> Vec<Uuid> {
        self.lines.iter().map(|line| line.id).collect()
    }
}
