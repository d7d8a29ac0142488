use crate::listing::{Listing, ListingFilter, ListingRepository, ListingUpdate, NewListing};
use chalet_core::{Actor, CoreError, CoreResult};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Owner/admin management of listings plus public browsing.
pub struct ListingService {
    repo: Arc<dyn ListingRepository>,
}

impl ListingService {
    pub fn new(repo: Arc<dyn ListingRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> Arc<dyn ListingRepository> {
        self.repo.clone()
    }

    pub async fn create_listing(&self, actor: &Actor, new: NewListing) -> CoreResult<Listing> {
        if !actor.can_create_listings() {
            return Err(CoreError::NotAuthorized("only owners and admins can create listings".to_string()));
        }

        let listing = Listing::new(actor.user_id, new)?;
        self.repo.insert(&listing).await?;
        info!(listing_id = %listing.id, owner_id = %listing.owner_id, "listing created");
        Ok(listing)
    }

    pub async fn update_listing(&self, actor: &Actor, id: Uuid, update: ListingUpdate) -> CoreResult<Listing> {
        let mut listing = self.get_listing(id).await?;
        if !actor.can_manage_listing(listing.owner_id) {
            return Err(CoreError::NotAuthorized(format!("listing {} belongs to another owner", id)));
        }

        listing.apply_update(update)?;
        self.repo.update(&listing).await?;
        info!(listing_id = %id, active = listing.is_active, "listing updated");
        Ok(listing)
    }

    pub async fn set_active(&self, actor: &Actor, id: Uuid, active: bool) -> CoreResult<Listing> {
        self.update_listing(
            actor,
            id,
            ListingUpdate {
                is_active: Some(active),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_listing(&self, id: Uuid) -> CoreResult<Listing> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("listing {}", id)))
    }

    pub async fn list_listings(&self, filter: &ListingFilter) -> CoreResult<Vec<Listing>> {
        Ok(self.repo.list(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingCategory;
    use crate::memory::InMemoryListingRepository;
    use rust_decimal::Decimal;

    fn service() -> ListingService {
        ListingService::new(Arc::new(InMemoryListingRepository::new()))
    }

    fn new_listing(category: ListingCategory) -> NewListing {
        NewListing {
            name: "Pine Chalet".to_string(),
            description: Some("Mountain view".to_string()),
            category,
            price_per_day: Decimal::from(90),
            max_capacity: 4,
            features: vec!["fireplace".to_string()],
        }
    }

    #[tokio::test]
    async fn test_customer_cannot_create() {
        let svc = service();
        let result = svc.create_listing(&Actor::customer(Uuid::new_v4()), new_listing(ListingCategory::Youth)).await;
        assert!(matches!(result, Err(CoreError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_updates() {
        let svc = service();
        let owner = Actor::owner(Uuid::new_v4());
        let listing = svc.create_listing(&owner, new_listing(ListingCategory::Family)).await.unwrap();

        let intruder = Actor::owner(Uuid::new_v4());
        let denied = svc.set_active(&intruder, listing.id, false).await;
        assert!(matches!(denied, Err(CoreError::NotAuthorized(_))));

        let admin = Actor::admin(Uuid::new_v4());
        let updated = svc.set_active(&admin, listing.id, false).await.unwrap();
        assert!(!updated.is_active);
        assert!(!svc.get_listing(listing.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let svc = service();
        let owner = Actor::owner(Uuid::new_v4());
        svc.create_listing(&owner, new_listing(ListingCategory::Family)).await.unwrap();
        let youth = svc.create_listing(&owner, new_listing(ListingCategory::Youth)).await.unwrap();
        svc.set_active(&owner, youth.id, false).await.unwrap();

        let active = svc
            .list_listings(&ListingFilter { active: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].category, ListingCategory::Family);

        let all = svc.list_listings(&ListingFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_listing() {
        let svc = service();
        assert!(matches!(svc.get_listing(Uuid::new_v4()).await, Err(CoreError::NotFound(_))));
    }
}
