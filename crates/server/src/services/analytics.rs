//! Sales aggregates for the back office.
//!
//! Revenue only counts completed orders; pending and cancelled orders show up
//! in [`AnalyticsService::status_breakdown`] and nowhere else.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::SqlitePool;

use crave_core::{OrderStatus, Price};

use super::error::ServiceError;
use crate::db::{OrderRepository, RepositoryError};
use crate::models::analytics::{DailySales, SalesSummary, StatusCount, TopItem};

/// Longest window `daily_sales` will report.
pub const MAX_DAYS: u32 = 366;

/// Analytics service.
pub struct AnalyticsService<'a> {
    orders: OrderRepository<'a>,
}

impl<'a> AnalyticsService<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            orders: OrderRepository::new(pool),
        }
    }

    /// Order count, revenue and average order value over `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if `from` is not before `to`.
    pub async fn sales_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<SalesSummary, ServiceError> {
        if let (Some(from), Some(to)) = (from, to)
            && from >= to
        {
            return Err(ServiceError::Validation(
                "`from` must be before `to`".to_owned(),
            ));
        }

        let totals = self.orders.completed_totals(from, to).await?;
        let revenue = cents_to_price(totals.revenue_cents)?;
        Ok(SalesSummary {
            order_count: totals.order_count,
            revenue,
            average_order_value: revenue.average_over(totals.order_count),
        })
    }

    /// Best sellers by quantity, ties broken by revenue.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn top_items(&self, limit: Option<u32>) -> Result<Vec<TopItem>, ServiceError> {
        let rows = self.orders.top_items(limit).await?;
        rows.into_iter()
            .map(|row| {
                Ok(TopItem {
                    quantity: u64::try_from(row.quantity).map_err(|_| {
                        RepositoryError::DataCorruption(format!(
                            "negative quantity for {}",
                            row.item_name
                        ))
                    })?,
                    revenue: cents_to_price(row.revenue_cents)?,
                    item_name: row.item_name,
                })
            })
            .collect()
    }

    /// Completed orders per UTC day for the last `days` days, today included.
    ///
    /// `days` is clamped to `1..=366`. Days without sales are present with zeros.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn daily_sales(&self, days: u32) -> Result<Vec<DailySales>, ServiceError> {
        self.daily_sales_at(days, Utc::now()).await
    }

    /// [`Self::daily_sales`] as seen at `now`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn daily_sales_at(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailySales>, ServiceError> {
        let days = days.clamp(1, MAX_DAYS);
        let today = now.date_naive();
        let first = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(NaiveDate::MIN);
        let since = first.and_time(chrono::NaiveTime::MIN).and_utc();

        let mut buckets: BTreeMap<NaiveDate, (u64, i64)> = first
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|d| (d, (0, 0)))
            .collect();

        for (created_at, total_cents) in self.orders.completed_since(since).await? {
            if let Some((count, cents)) = buckets.get_mut(&created_at.date_naive()) {
                *count += 1;
                *cents += total_cents;
            }
        }

        buckets
            .into_iter()
            .map(|(date, (order_count, cents))| {
                Ok(DailySales {
                    date,
                    order_count,
                    revenue: cents_to_price(cents)?,
                })
            })
            .collect()
    }

    /// Number of orders in every status, including statuses with none.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn status_breakdown(&self) -> Result<Vec<StatusCount>, ServiceError> {
        let counts: BTreeMap<_, _> = self
            .orders
            .status_counts()
            .await?
            .into_iter()
            .map(|(status, count)| (status.as_str(), count))
            .collect();

        Ok(OrderStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                count: counts
                    .get(status.as_str())
                    .and_then(|c| u64::try_from(*c).ok())
                    .unwrap_or(0),
            })
            .collect())
    }
}

fn cents_to_price(cents: i64) -> Result<Price, RepositoryError> {
    Price::from_cents(cents)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative revenue: {cents}")))
}
