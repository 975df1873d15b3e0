//! Cart domain types.

use serde::Serialize;

use crave_core::{FoodItemId, Price};

/// One food item in a user's cart, joined with its current menu data.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub food_item_id: FoodItemId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
    pub is_available: bool,
    pub subtotal: Price,
}

/// A user's whole cart.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub total: Price,
}

impl CartSummary {
    /// Build a summary, computing the count and total from the lines.
    #[must_use]
    pub fn from_lines(lines: Vec<CartLine>) -> Self {
        let item_count = lines.iter().map(|l| l.quantity).sum();
        let total = lines.iter().map(|l| l.subtotal).sum();
        Self {
            lines,
            item_count,
            total,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: i64, cents: i64, quantity: u32) -> CartLine {
        let unit_price = Price::from_cents(cents).unwrap();
        CartLine {
            food_item_id: FoodItemId::new(id),
            name: format!("item {id}"),
            unit_price,
            quantity,
            is_available: true,
            subtotal: unit_price.times(quantity),
        }
    }

    #[test]
    fn test_summary_totals() {
        let summary = CartSummary::from_lines(vec![line(1, 450, 2), line(2, 1299, 1)]);
        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.total.cents(), 450 * 2 + 1299);
        assert!(!summary.is_empty());
    }

    #[test]
    fn test_empty_summary() {
        let summary = CartSummary::from_lines(Vec::new());
        assert!(summary.is_empty());
        assert_eq!(summary.total, Price::ZERO);
    }
}
