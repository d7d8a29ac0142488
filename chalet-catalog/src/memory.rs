use crate::listing::{Listing, ListingFilter, ListingRepository};
use async_trait::async_trait;
use chalet_core::{RepoError, RepoResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local listing store for tests and single-node development.
#[derive(Default)]
pub struct InMemoryListingRepository {
    listings: RwLock<HashMap<Uuid, Listing>>,
}

impl InMemoryListingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn insert(&self, listing: &Listing) -> RepoResult<()> {
        let mut listings = self.listings.write().await;
        if listings.contains_key(&listing.id) {
            return Err(RepoError::Constraint(format!("listing {} already exists", listing.id)));
        }
        listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Listing>> {
        Ok(self.listings.read().await.get(&id).cloned())
    }

    async fn update(&self, listing: &Listing) -> RepoResult<()> {
        let mut listings = self.listings.write().await;
        match listings.get_mut(&listing.id) {
            Some(existing) => {
                *existing = listing.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound(format!("listing {}", listing.id))),
        }
    }

    async fn list(&self, filter: &ListingFilter) -> RepoResult<Vec<Listing>> {
        let mut listings: Vec<Listing> = self
            .listings
            .read()
            .await
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(listings)
    }
}
