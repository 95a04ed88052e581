use crate::domain::{Config, DomainResult, SchemaEntry, Thing};
use async_trait::async_trait;

/// Client of the thing registry service.
///
/// Every call forwards the caller's authorization token; the registry decides
/// whether the caller may see or change the thing.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ThingProxy: Send + Sync {
    /// Register a thing and return its generated token
    async fn create(&self, authorization: &str, id: &str, name: &str) -> DomainResult<String>;

    /// Fetch one thing by its id
    async fn get(&self, authorization: &str, id: &str) -> DomainResult<Thing>;

    /// List every thing the token owner can access
    async fn list(&self, authorization: &str) -> DomainResult<Vec<Thing>>;

    /// Replace the thing's schema
    async fn update_schema(
        &self,
        authorization: &str,
        id: &str,
        schema: &[SchemaEntry],
    ) -> DomainResult<()>;

    /// Replace the thing's event configuration
    async fn update_config(&self, authorization: &str, id: &str, config: &[Config])
        -> DomainResult<()>;

    /// Remove a thing
    async fn remove(&self, authorization: &str, id: &str) -> DomainResult<()>;
}

/// Key-value store mapping a user's e-mail to their live session id.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `None` when the user has no open session
    async fn get(&self, key: &str) -> DomainResult<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> DomainResult<()>;
}

/// Extracts identity claims from an authorization token.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenClaims: Send + Sync {
    fn get_email(&self, token: &str) -> DomainResult<String>;
}
