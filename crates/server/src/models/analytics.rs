//! Sales analytics result types.

use chrono::NaiveDate;
use serde::Serialize;

use crave_core::{OrderStatus, Price};

/// Totals over completed orders in a period.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SalesSummary {
    pub order_count: u64,
    pub revenue: Price,
    pub average_order_value: Price,
}

/// A best-selling item.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TopItem {
    pub item_name: String,
    pub quantity: u64,
    pub revenue: Price,
}

/// Revenue for a single UTC calendar day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailySales {
    pub date: NaiveDate,
    pub order_count: u64,
    pub revenue: Price,
}

/// Number of orders in a given status.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}
