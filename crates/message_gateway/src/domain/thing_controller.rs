use crate::domain::{
    parse_request, AuthDeviceRequest, DataRequest, RegisterRequest, ReplyTarget,
    RequestDataRequest, ThingEventPublisher, ThingService, UnregisterRequest, UpdateSchemaRequest,
};
use async_trait::async_trait;
use common::domain::DomainResult;
use std::sync::Arc;
use tracing::{error, warn};

/// Operations the dispatcher can route a message to.
///
/// Bodies are the raw message payloads; decoding belongs to the controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThingController: Send + Sync {
    async fn register(&self, body: &[u8], authorization: &str) -> DomainResult<()>;

    async fn unregister(&self, body: &[u8], authorization: &str) -> DomainResult<()>;

    async fn update_schema(&self, body: &[u8], authorization: &str) -> DomainResult<()>;

    async fn auth_device(
        &self,
        body: &[u8],
        authorization: &str,
        reply_to: &str,
        correlation_id: Option<String>,
    ) -> DomainResult<()>;

    async fn list_devices(
        &self,
        authorization: &str,
        reply_to: &str,
        correlation_id: Option<String>,
    ) -> DomainResult<()>;

    async fn request_data(&self, body: &[u8], authorization: &str) -> DomainResult<()>;

    async fn update_data(&self, body: &[u8], authorization: &str) -> DomainResult<()>;

    async fn publish_data(&self, body: &[u8], authorization: &str) -> DomainResult<()>;
}

/// Decodes message bodies and hands them to the [`ThingService`]
pub struct ThingControllerImpl {
    service: Arc<ThingService>,
    publisher: Arc<dyn ThingEventPublisher>,
}

impl ThingControllerImpl {
    pub fn new(service: Arc<ThingService>, publisher: Arc<dyn ThingEventPublisher>) -> Self {
        Self { service, publisher }
    }
}

#[async_trait]
impl ThingController for ThingControllerImpl {
    async fn register(&self, body: &[u8], authorization: &str) -> DomainResult<()> {
        let request: RegisterRequest = parse_request(body)?;
        self.service
            .register(authorization, &request.id, &request.name)
            .await
    }

    async fn unregister(&self, body: &[u8], authorization: &str) -> DomainResult<()> {
        let request: UnregisterRequest = parse_request(body)?;
        self.service.unregister(authorization, &request.id).await
    }

    async fn update_schema(&self, body: &[u8], authorization: &str) -> DomainResult<()> {
        let request: UpdateSchemaRequest = parse_request(body)?;
        self.service
            .update_schema(authorization, &request.id, &request.schema)
            .await
    }

    async fn auth_device(
        &self,
        body: &[u8],
        authorization: &str,
        reply_to: &str,
        correlation_id: Option<String>,
    ) -> DomainResult<()> {
        let reply = ReplyTarget::new(reply_to, correlation_id);
        if reply.correlation_id.is_none() {
            warn!(reply_to = %reply_to, "auth request without correlation id");
        }

        // the caller is waiting on reply-to, so answer even an undecodable request
        let request: AuthDeviceRequest = match parse_request(body) {
            Ok(request) => request,
            Err(e) => {
                if let Err(send_err) = self
                    .publisher
                    .send_auth_status(&reply, "", false, Some(e.to_string()))
                    .await
                {
                    error!(error = %send_err, "failed to send auth response");
                }
                return Err(e);
            }
        };

        self.service
            .auth_device(authorization, &request.id, &request.token, &reply)
            .await
    }

    async fn list_devices(
        &self,
        authorization: &str,
        reply_to: &str,
        correlation_id: Option<String>,
    ) -> DomainResult<()> {
        let reply = ReplyTarget::new(reply_to, correlation_id);
        if reply.correlation_id.is_none() {
            warn!(reply_to = %reply_to, "list request without correlation id");
        }

        self.service.list_devices(authorization, &reply).await
    }

    async fn request_data(&self, body: &[u8], authorization: &str) -> DomainResult<()> {
        let request: RequestDataRequest = parse_request(body)?;
        self.service
            .request_data(authorization, &request.id, &request.sensor_ids)
            .await
    }

    async fn update_data(&self, body: &[u8], authorization: &str) -> DomainResult<()> {
        let request: DataRequest = parse_request(body)?;
        self.service
            .update_data(authorization, &request.id, &request.data)
            .await
    }

    async fn publish_data(&self, body: &[u8], authorization: &str) -> DomainResult<()> {
        let request: DataRequest = parse_request(body)?;
        self.service
            .publish_data(authorization, &request.id, &request.data)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockThingEventPublisher;
    use common::domain::{
        DomainError, MockSessionStore, MockThingProxy, MockTokenClaims, SchemaEntry, Thing,
    };
    use common::rules::{RuleEngine, RuleTable};

    fn controller(proxy: MockThingProxy, publisher: MockThingEventPublisher) -> ThingControllerImpl {
        let publisher: Arc<dyn ThingEventPublisher> = Arc::new(publisher);
        let service = ThingService::new(
            Arc::new(proxy),
            Arc::new(MockSessionStore::new()),
            Arc::new(MockTokenClaims::new()),
            publisher.clone(),
            RuleEngine::new(Arc::new(RuleTable::standard())),
        );
        ThingControllerImpl::new(Arc::new(service), publisher)
    }

    #[tokio::test]
    async fn test_register_decodes_body() {
        let mut proxy = MockThingProxy::new();
        proxy
            .expect_create()
            .withf(|auth, id, name| auth == "tok" && id == "fbe64efa6c7f717e" && name == "lamp")
            .times(1)
            .returning(|_, _, _| Ok("generated".to_string()));
        let mut publisher = MockThingEventPublisher::new();
        publisher
            .expect_send_registered()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = controller(proxy, publisher)
            .register(br#"{"id":"fbe64efa6c7f717e","name":"lamp"}"#, "tok")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_undecodable_body_dropped() {
        let controller = controller(MockThingProxy::new(), MockThingEventPublisher::new());

        let result = controller.update_data(b"[1,2,3]", "tok").await;
        assert!(matches!(result, Err(DomainError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_auth_device_bad_body_still_replies() {
        let mut publisher = MockThingEventPublisher::new();
        publisher
            .expect_send_auth_status()
            .withf(|reply, id, authenticated, error| {
                reply.reply_to == "reply-queue"
                    && reply.correlation_id.as_deref() == Some("cid")
                    && id.is_empty()
                    && !authenticated
                    && error.is_some()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = controller(MockThingProxy::new(), publisher)
            .auth_device(b"{}", "tok", "reply-queue", Some("cid".to_string()))
            .await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_list_devices_replies() {
        let mut proxy = MockThingProxy::new();
        proxy.expect_list().returning(|_| {
            Ok(vec![Thing {
                id: "fbe64efa6c7f717e".to_string(),
                token: String::new(),
                name: "lamp".to_string(),
                schema: Some(vec![SchemaEntry {
                    sensor_id: 0,
                    value_type: 3,
                    unit: 0,
                    type_id: 0xFFF1,
                    name: "switch".to_string(),
                }]),
            }])
        });
        let mut publisher = MockThingEventPublisher::new();
        publisher
            .expect_send_device_list()
            .withf(|reply, devices, error| {
                reply.correlation_id.is_none() && devices.len() == 1 && error.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = controller(proxy, publisher)
            .list_devices("tok", "reply-queue", None)
            .await;
        assert!(result.is_ok());
    }
}
