use async_trait::async_trait;
use common::domain::{
    Config, DomainError, DomainResult, SchemaEntry, SessionStore, Thing, ThingProxy,
};

fn unavailable(collaborator: &str) -> DomainError {
    DomainError::CollaboratorError(anyhow::anyhow!("{collaborator} is not configured"))
}

/// Stands in for the thing registry client until one is wired in
pub struct UnconfiguredThingProxy;

#[async_trait]
impl ThingProxy for UnconfiguredThingProxy {
    async fn create(&self, _authorization: &str, _id: &str, _name: &str) -> DomainResult<String> {
        Err(unavailable("thing registry"))
    }

    async fn get(&self, _authorization: &str, _id: &str) -> DomainResult<Thing> {
        Err(unavailable("thing registry"))
    }

    async fn list(&self, _authorization: &str) -> DomainResult<Vec<Thing>> {
        Err(unavailable("thing registry"))
    }

    async fn update_schema(
        &self,
        _authorization: &str,
        _id: &str,
        _schema: &[SchemaEntry],
    ) -> DomainResult<()> {
        Err(unavailable("thing registry"))
    }

    async fn update_config(
        &self,
        _authorization: &str,
        _id: &str,
        _config: &[Config],
    ) -> DomainResult<()> {
        Err(unavailable("thing registry"))
    }

    async fn remove(&self, _authorization: &str, _id: &str) -> DomainResult<()> {
        Err(unavailable("thing registry"))
    }
}

/// Stands in for the session store until one is wired in
pub struct UnconfiguredSessionStore;

#[async_trait]
impl SessionStore for UnconfiguredSessionStore {
    async fn get(&self, _key: &str) -> DomainResult<Option<String>> {
        Err(unavailable("session store"))
    }

    async fn save(&self, _key: &str, _value: &str) -> DomainResult<()> {
        Err(unavailable("session store"))
    }
}
