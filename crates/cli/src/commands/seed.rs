//! Seed the menu from a YAML file.
//!
//! # File format
//!
//! ```yaml
//! - name: Margherita
//!   category: Pizza
//!   description: Tomato, mozzarella, basil
//!   price: "11.50"
//!   image_path: /images/margherita.jpg
//! - name: Tiramisu
//!   category: Desserts
//!   price: 6
//!   available: false
//! ```
//!
//! Items whose name is already on the menu are skipped, so the command can be
//! re-run safely.

use std::path::Path;

use crave_core::Price;
use crave_server::models::food::FoodDraft;
use crave_server::services::{CatalogService, ImportSummary, ServiceError};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use super::{ConnectError, connect};

/// One entry of the seed file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedFood {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub image_path: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid price for {name}: {reason}")]
    Price { name: String, reason: String },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Parse seed file contents into drafts.
///
/// # Errors
///
/// Returns `SeedError::Yaml` for malformed YAML and `SeedError::Price` for
/// negative or sub-cent prices.
pub fn parse_menu(content: &str) -> Result<Vec<FoodDraft>, SeedError> {
    let entries: Vec<SeedFood> = serde_yaml::from_str(content)?;
    entries
        .into_iter()
        .map(|entry| {
            let price = Price::from_decimal(entry.price).map_err(|e| SeedError::Price {
                name: entry.name.clone(),
                reason: e.to_string(),
            })?;
            Ok(FoodDraft {
                name: entry.name,
                description: entry.description,
                category: entry.category,
                price,
                image_path: entry.image_path,
                is_available: entry.available,
            })
        })
        .collect()
}

/// Import menu items from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, an entry is
/// invalid, or the database fails.
pub async fn foods(file_path: &str) -> Result<ImportSummary, SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::NotFound(file_path.to_owned()));
    }

    tracing::info!(path = %file_path, "Loading menu from file");
    let content = tokio::fs::read_to_string(path).await?;
    let drafts = parse_menu(&content)?;
    tracing::info!(items = drafts.len(), "Parsed seed file");

    let (_, pool) = connect().await?;
    let summary = CatalogService::new(&pool).import(drafts).await?;

    tracing::info!(
        created = summary.created,
        skipped = summary.skipped,
        "Menu seeding complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu() {
        let drafts = parse_menu(
            r#"
- name: Margherita
  category: Pizza
  description: Tomato, mozzarella, basil
  price: "11.50"
- name: Tiramisu
  category: Desserts
  price: 6
  available: false
"#,
        )
        .unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].price.cents(), 1150);
        assert!(drafts[0].is_available);
        assert_eq!(drafts[1].price.cents(), 600);
        assert_eq!(drafts[1].description, "");
        assert!(!drafts[1].is_available);
    }

    #[test]
    fn test_parse_menu_rejects_bad_prices() {
        let err = parse_menu("- name: Soup\n  category: Starters\n  price: \"-1\"\n").unwrap_err();
        assert!(matches!(err, SeedError::Price { name, .. } if name == "Soup"));

        let err = parse_menu("- name: Soup\n  category: Starters\n  price: \"1.005\"\n").unwrap_err();
        assert!(matches!(err, SeedError::Price { .. }));
    }

    #[test]
    fn test_parse_menu_rejects_unknown_fields() {
        let err = parse_menu("- name: Soup\n  category: Starters\n  price: 4\n  spicy: true\n")
            .unwrap_err();
        assert!(matches!(err, SeedError::Yaml(_)));
    }
}
