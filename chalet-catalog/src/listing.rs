use async_trait::async_trait;
use chalet_core::RepoResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Listing categories offered on the site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ListingCategory {
    Youth,
    Family,
}

impl ListingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingCategory::Youth => "youth",
            ListingCategory::Family => "family",
        }
    }
}

impl fmt::Display for ListingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingCategory {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youth" => Ok(ListingCategory::Youth),
            "family" => Ok(ListingCategory::Family),
            other => Err(ListingError::UnknownCategory(other.to_string())),
        }
    }
}

/// A rentable chalet or farm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: ListingCategory,
    pub price_per_day: Decimal,
    pub max_capacity: u32,
    pub features: BTreeSet<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub name: String,
    pub description: Option<String>,
    pub category: ListingCategory,
    pub price_per_day: Decimal,
    pub max_capacity: u32,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ListingCategory>,
    pub price_per_day: Option<Decimal>,
    pub max_capacity: Option<u32>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl Listing {
    pub fn new(owner_id: Uuid, new: NewListing) -> Result<Self, ListingError> {
        let now = Utc::now();
        let listing = Self {
            id: Uuid::new_v4(),
            owner_id,
            name: new.name.trim().to_string(),
            description: new.description,
            category: new.category,
            price_per_day: new.price_per_day,
            max_capacity: new.max_capacity,
            features: normalize_features(new.features),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        listing.validate()?;
        Ok(listing)
    }

    /// Applies an update, leaving `self` untouched if the result would be invalid.
    pub fn apply_update(&mut self, update: ListingUpdate) -> Result<(), ListingError> {
        let mut next = self.clone();
        if let Some(name) = update.name {
            next.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            next.description = Some(description);
        }
        if let Some(category) = update.category {
            next.category = category;
        }
        if let Some(price) = update.price_per_day {
            next.price_per_day = price;
        }
        if let Some(capacity) = update.max_capacity {
            next.max_capacity = capacity;
        }
        if let Some(features) = update.features {
            next.features = normalize_features(features);
        }
        if let Some(active) = update.is_active {
            next.is_active = active;
        }
        next.validate()?;
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(&feature.to_ascii_lowercase())
    }

    fn validate(&self) -> Result<(), ListingError> {
        if self.name.is_empty() {
            return Err(ListingError::EmptyName);
        }
        let price = self.price_per_day;
        if price <= Decimal::ZERO || price > max_price_per_day() || price.normalize().scale() > 2 {
            return Err(ListingError::InvalidPrice(price));
        }
        if self.max_capacity == 0 {
            return Err(ListingError::InvalidCapacity);
        }
        Ok(())
    }
}

/// Largest nightly price the `NUMERIC(12,2)` column holds.
pub fn max_price_per_day() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

fn normalize_features(features: Vec<String>) -> BTreeSet<String> {
    features
        .into_iter()
        .map(|f| f.trim().to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingFilter {
    pub category: Option<ListingCategory>,
    pub active: Option<bool>,
    pub owner_id: Option<Uuid>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        self.category.map_or(true, |c| listing.category == c)
            && self.active.map_or(true, |a| listing.is_active == a)
            && self.owner_id.map_or(true, |o| listing.owner_id == o)
    }
}

/// Access to the `listings` collection.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn insert(&self, listing: &Listing) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Listing>>;

    async fn update(&self, listing: &Listing) -> RepoResult<()>;

    async fn list(&self, filter: &ListingFilter) -> RepoResult<Vec<Listing>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("Listing name must not be empty")]
    EmptyName,

    #[error("Price per day must be a positive amount in cents below 10^10, got {0}")]
    InvalidPrice(Decimal),

    #[error("Max capacity must be at least 1")]
    InvalidCapacity,

    #[error("Unknown listing category: {0}")]
    UnknownCategory(String),
}

impl From<ListingError> for chalet_core::CoreError {
    fn from(err: ListingError) -> Self {
        chalet_core::CoreError::Validation(err.to_string())
    }
}
