use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of roles handed out by the authentication service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Chalet or farm owner.
    Owner,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "owner" | "chalet_owner" | "farm_owner" => Ok(Role::Owner),
            "customer" => Ok(Role::Customer),
            other => Err(crate::CoreError::NotAuthorized(format!("unknown role '{}'", other))),
        }
    }
}

/// The authenticated `(user id, role)` pair every operation runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn owner(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Owner)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Support staff answer customer conversations.
    pub fn is_support_team(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_create_listings(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Owner)
    }

    /// Listings are mutable only by their owner or an admin.
    pub fn can_manage_listing(&self, listing_owner: Uuid) -> bool {
        self.is_admin() || (self.role == Role::Owner && self.user_id == listing_owner)
    }

    pub fn can_view_booking(&self, booking_user: Uuid, listing_owner: Uuid) -> bool {
        self.user_id == booking_user || self.can_manage_listing(listing_owner)
    }

    /// The booking's user, the listing's owner, or an admin.
    pub fn can_cancel_booking(&self, booking_user: Uuid, listing_owner: Uuid) -> bool {
        self.user_id == booking_user || self.can_manage_listing(listing_owner)
    }

    /// Status workflow inputs (confirm, complete, payment) come from the owner side.
    pub fn can_advance_booking(&self, listing_owner: Uuid) -> bool {
        self.can_manage_listing(listing_owner)
    }
}

/// Turns a bearer credential into an [`Actor`].
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Actor, crate::CoreError>;
}

/// Fixed-token resolver for local development and tests.
pub struct StaticIdentityResolver {
    tokens: std::collections::HashMap<String, Actor>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self {
            tokens: std::collections::HashMap::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, actor: Actor) -> Self {
        self.tokens.insert(token.into(), actor);
        self
    }
}

impl Default for StaticIdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Actor, crate::CoreError> {
        let actor = self
            .tokens
            .get(token)
            .copied()
            .ok_or_else(|| crate::CoreError::NotAuthorized("unknown token".to_string()))?;
        tracing::debug!(user_id = %actor.user_id, role = %actor.role, "resolved static identity");
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_accepts_owner_aliases() {
        assert_eq!("chalet_owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!("farm_owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("guest".parse::<Role>().is_err());
    }

    #[test]
    fn test_listing_capabilities() {
        let owner_id = Uuid::new_v4();
        let owner = Actor::owner(owner_id);
        let other_owner = Actor::owner(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());
        let customer = Actor::customer(owner_id);

        assert!(owner.can_manage_listing(owner_id));
        assert!(!other_owner.can_manage_listing(owner_id));
        assert!(admin.can_manage_listing(owner_id));
        // Same id but the wrong role.
        assert!(!customer.can_manage_listing(owner_id));
    }

    #[test]
    fn test_booking_capabilities() {
        let guest = Uuid::new_v4();
        let listing_owner = Uuid::new_v4();

        assert!(Actor::customer(guest).can_cancel_booking(guest, listing_owner));
        assert!(Actor::owner(listing_owner).can_cancel_booking(guest, listing_owner));
        assert!(!Actor::customer(Uuid::new_v4()).can_cancel_booking(guest, listing_owner));
        assert!(!Actor::customer(guest).can_advance_booking(listing_owner));
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let actor = Actor::customer(Uuid::new_v4());
        let resolver = StaticIdentityResolver::new().with_token("t-1", actor);

        assert_eq!(resolver.resolve("t-1").await.unwrap(), actor);
        assert!(resolver.resolve("t-2").await.is_err());
    }
}
