//! Menu browsing and menu management.

use std::collections::HashSet;

use sqlx::SqlitePool;

use crave_core::{FoodItemId, Price, UserId};

use super::error::{ServiceError, clean_text};
use crate::db::{AuditRepository, FoodRepository};
use crate::models::audit::actions;
use crate::models::food::{FoodDraft, FoodFilter, FoodItem};

const MAX_NAME_LENGTH: usize = 100;
const MAX_CATEGORY_LENGTH: usize = 50;
const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_IMAGE_PATH_LENGTH: usize = 500;
/// Highest menu price, $10,000.00.
const MAX_PRICE_CENTS: i64 = 1_000_000;

/// Outcome of [`CatalogService::import`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub skipped: usize,
}

/// Catalog service.
pub struct CatalogService<'a> {
    foods: FoodRepository<'a>,
    audit: AuditRepository<'a>,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            foods: FoodRepository::new(pool),
            audit: AuditRepository::new(pool),
        }
    }

    /// List menu items.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list(&self, filter: &FoodFilter) -> Result<Vec<FoodItem>, ServiceError> {
        let filter = FoodFilter {
            category: filter
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_owned),
            search: filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned),
            available_only: filter.available_only,
        };
        Ok(self.foods.list(&filter).await?)
    }

    /// Get one menu item.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the item doesn't exist.
    pub async fn get(&self, id: FoodItemId) -> Result<FoodItem, ServiceError> {
        self.foods
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("food item"))
    }

    /// Distinct categories in use.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.foods.categories().await?)
    }

    /// Add a menu item.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a blank name or category or a
    /// price above the menu ceiling.
    pub async fn create(&self, actor: UserId, draft: FoodDraft) -> Result<FoodItem, ServiceError> {
        let draft = validate_draft(draft)?;
        let item = self.foods.create(&draft).await?;

        self.audit
            .record(
                Some(actor),
                actions::FOOD_CREATED,
                &format!("food_id={} name={}", item.id, item.name),
            )
            .await?;
        tracing::info!(food_id = %item.id, name = %item.name, "Menu item created");
        Ok(item)
    }

    /// Replace a menu item.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` or `ServiceError::NotFound`.
    pub async fn update(
        &self,
        actor: UserId,
        id: FoodItemId,
        draft: FoodDraft,
    ) -> Result<FoodItem, ServiceError> {
        let draft = validate_draft(draft)?;
        let item = self
            .foods
            .update(id, &draft)
            .await
            .map_err(ServiceError::not_found("food item"))?;

        self.audit
            .record(Some(actor), actions::FOOD_UPDATED, &format!("food_id={id}"))
            .await?;
        Ok(item)
    }

    /// Show or hide a menu item.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the item doesn't exist.
    pub async fn set_available(
        &self,
        actor: UserId,
        id: FoodItemId,
        available: bool,
    ) -> Result<FoodItem, ServiceError> {
        self.foods
            .set_available(id, available)
            .await
            .map_err(ServiceError::not_found("food item"))?;

        self.audit
            .record(
                Some(actor),
                actions::FOOD_UPDATED,
                &format!("food_id={id} available={available}"),
            )
            .await?;
        self.get(id).await
    }

    /// Remove a menu item. Past orders keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the item doesn't exist.
    pub async fn delete(&self, actor: UserId, id: FoodItemId) -> Result<(), ServiceError> {
        self.foods
            .delete(id)
            .await
            .map_err(ServiceError::not_found("food item"))?;

        self.audit
            .record(Some(actor), actions::FOOD_DELETED, &format!("food_id={id}"))
            .await?;
        tracing::info!(food_id = %id, "Menu item deleted");
        Ok(())
    }

    /// Bulk-load menu items, skipping names already on the menu.
    ///
    /// Every draft is validated before anything is written. Returns the number
    /// of items created and skipped.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` naming the first invalid entry.
    pub async fn import(&self, drafts: Vec<FoodDraft>) -> Result<ImportSummary, ServiceError> {
        let drafts = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| {
                validate_draft(draft).map_err(|e| match e {
                    ServiceError::Validation(msg) => {
                        ServiceError::Validation(format!("entry {}: {msg}", i + 1))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut known: HashSet<String> = self
            .foods
            .list(&FoodFilter::default())
            .await?
            .into_iter()
            .map(|item| item.name.to_lowercase())
            .collect();

        let mut summary = ImportSummary::default();
        for draft in drafts {
            if !known.insert(draft.name.to_lowercase()) {
                tracing::debug!(name = %draft.name, "Menu item already present, skipping");
                summary.skipped += 1;
                continue;
            }
            self.foods.create(&draft).await?;
            summary.created += 1;
        }

        self.audit
            .record(
                None,
                actions::FOOD_CREATED,
                &format!("import created={} skipped={}", summary.created, summary.skipped),
            )
            .await?;
        tracing::info!(created = summary.created, skipped = summary.skipped, "Menu import finished");
        Ok(summary)
    }
}

/// Trim and bound every text field and cap the price. Price sign is enforced by `Price` itself.
fn validate_draft(draft: FoodDraft) -> Result<FoodDraft, ServiceError> {
    if draft.price.cents() > MAX_PRICE_CENTS {
        return Err(ServiceError::Validation(format!(
            "price must be at most {}",
            Price::from_cents(MAX_PRICE_CENTS).unwrap_or(Price::ZERO)
        )));
    }
    let name = clean_text("name", &draft.name, MAX_NAME_LENGTH, true)?.unwrap_or_default();
    let category =
        clean_text("category", &draft.category, MAX_CATEGORY_LENGTH, true)?.unwrap_or_default();
    let description = clean_text(
        "description",
        &draft.description,
        MAX_DESCRIPTION_LENGTH,
        false,
    )?
    .unwrap_or_default();
    let image_path = match draft.image_path.as_deref() {
        Some(path) => clean_text("image_path", path, MAX_IMAGE_PATH_LENGTH, false)?,
        None => None,
    };

    Ok(FoodDraft {
        name,
        description,
        category,
        image_path,
        ..draft
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crave_core::UserRole;

    use super::*;
    use crate::db::create_memory_pool;
    use crate::db::foods::tests::draft;
    use crate::db::users::tests::insert_user;

    #[tokio::test]
    async fn test_create_trims_and_audits() {
        let pool = create_memory_pool().await.unwrap();
        let admin = insert_user(&pool, "chef@example.com", UserRole::Admin).await;
        let catalog = CatalogService::new(&pool);

        let item = catalog
            .create(admin.id, draft("  Miso Soup ", " Starters", 450))
            .await
            .unwrap();
        assert_eq!(item.name, "Miso Soup");
        assert_eq!(item.category, "Starters");

        let log = AuditRepository::new(&pool).recent(None, None).await.unwrap();
        assert_eq!(log[0].action, actions::FOOD_CREATED);
        assert_eq!(log[0].user_id, Some(admin.id));
    }

    #[tokio::test]
    async fn test_validation() {
        let pool = create_memory_pool().await.unwrap();
        let admin = insert_user(&pool, "chef@example.com", UserRole::Admin).await;
        let catalog = CatalogService::new(&pool);

        assert!(matches!(
            catalog.create(admin.id, draft("   ", "Mains", 100)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            catalog.create(admin.id, draft("Soup", "", 100)).await,
            Err(ServiceError::Validation(_))
        ));
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            catalog.create(admin.id, draft(&long, "Mains", 100)).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_price_ceiling() {
        let pool = create_memory_pool().await.unwrap();
        let admin = insert_user(&pool, "chef@example.com", UserRole::Admin).await;
        let catalog = CatalogService::new(&pool);

        assert!(matches!(
            catalog
                .create(admin.id, draft("Gold Leaf Steak", "Mains", MAX_PRICE_CENTS + 1))
                .await,
            Err(ServiceError::Validation(msg)) if msg.contains("$10000.00")
        ));
        let steak = catalog
            .create(admin.id, draft("Wagyu Steak", "Mains", MAX_PRICE_CENTS))
            .await
            .unwrap();
        assert!(matches!(
            catalog
                .update(admin.id, steak.id, draft("Wagyu Steak", "Mains", i64::MAX / 2))
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_availability_and_listing() {
        let pool = create_memory_pool().await.unwrap();
        let admin = insert_user(&pool, "chef@example.com", UserRole::Admin).await;
        let catalog = CatalogService::new(&pool);

        let soup = catalog
            .create(admin.id, draft("Soup", "Starters", 450))
            .await
            .unwrap();
        catalog
            .create(admin.id, draft("Curry", "Mains", 1250))
            .await
            .unwrap();

        let hidden = catalog.set_available(admin.id, soup.id, false).await.unwrap();
        assert!(!hidden.is_available);

        let visible = catalog
            .list(&FoodFilter {
                available_only: true,
                search: Some("  ".to_owned()),
                ..FoodFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Curry");

        assert_eq!(catalog.categories().await.unwrap(), vec!["Mains", "Starters"]);
    }

    #[tokio::test]
    async fn test_missing_items() {
        let pool = create_memory_pool().await.unwrap();
        let admin = insert_user(&pool, "chef@example.com", UserRole::Admin).await;
        let catalog = CatalogService::new(&pool);
        let ghost = FoodItemId::new(999);

        assert!(matches!(catalog.get(ghost).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(
            catalog.update(admin.id, ghost, draft("Soup", "Starters", 1)).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            catalog.delete(admin.id, ghost).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_skips_known_names() {
        let pool = create_memory_pool().await.unwrap();
        let admin = insert_user(&pool, "chef@example.com", UserRole::Admin).await;
        let catalog = CatalogService::new(&pool);
        catalog
            .create(admin.id, draft("Soup", "Starters", 450))
            .await
            .unwrap();

        let summary = catalog
            .import(vec![
                draft("soup", "Starters", 500),
                draft(" Curry ", "Mains", 1250),
                draft("curry", "Mains", 1250),
            ])
            .await
            .unwrap();
        assert_eq!(summary, ImportSummary { created: 1, skipped: 2 });
        assert_eq!(catalog.list(&FoodFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_validates_before_writing() {
        let pool = create_memory_pool().await.unwrap();
        let catalog = CatalogService::new(&pool);

        let err = catalog
            .import(vec![draft("Curry", "Mains", 1250), draft("", "Mains", 100)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.starts_with("entry 2")));
        assert!(catalog.list(&FoodFilter::default()).await.unwrap().is_empty());
    }
}
