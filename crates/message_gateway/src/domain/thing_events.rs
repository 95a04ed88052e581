use async_trait::async_trait;
use common::domain::{DataValue, DomainResult, SchemaEntry, Thing};

/// Destination of an RPC reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub reply_to: String,
    pub correlation_id: Option<String>,
}

impl ReplyTarget {
    pub fn new(reply_to: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            reply_to: reply_to.into(),
            correlation_id: correlation_id.filter(|id| !id.is_empty()),
        }
    }
}

/// Outbound events and replies produced by the thing service.
///
/// `error` is `None` on success and carries the failure text otherwise; it
/// always reaches the wire as a nullable `error` field.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThingEventPublisher: Send + Sync {
    async fn send_registered(
        &self,
        id: &str,
        name: &str,
        token: &str,
        error: Option<String>,
    ) -> DomainResult<()>;

    async fn send_unregistered(&self, id: &str, error: Option<String>) -> DomainResult<()>;

    async fn send_schema_updated(
        &self,
        id: &str,
        schema: &[SchemaEntry],
        error: Option<String>,
    ) -> DomainResult<()>;

    async fn send_auth_status(
        &self,
        reply: &ReplyTarget,
        id: &str,
        authenticated: bool,
        error: Option<String>,
    ) -> DomainResult<()>;

    async fn send_device_list(
        &self,
        reply: &ReplyTarget,
        devices: &[Thing],
        error: Option<String>,
    ) -> DomainResult<()>;

    async fn send_request_data(&self, id: &str, sensor_ids: &[i32]) -> DomainResult<()>;

    async fn send_update_data(&self, id: &str, data: &[DataValue]) -> DomainResult<()>;

    /// Fan the values out to every listener of the platform
    async fn send_broadcast_data(
        &self,
        authorization: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()>;

    /// Deliver the values to one live user session
    async fn send_session_data(
        &self,
        authorization: &str,
        session_id: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()>;
}
