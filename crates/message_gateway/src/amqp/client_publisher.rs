use crate::amqp::DEVICES_EXCHANGE;
use crate::domain::{ReplyTarget, ThingEventPublisher};
use async_trait::async_trait;
use common::amqp::MessagePublisher;
use common::domain::{
    DataValue, DomainError, DomainResult, ExchangeKind, OutboundMessage, PublishOptions,
    SchemaEntry, Thing,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub const DATA_PUBLISHED_EXCHANGE: &str = "data.published";
pub const DATA_SESSIONS_EXCHANGE: &str = "data.sessions";

pub const REGISTERED_KEY: &str = "device.registered";
pub const UNREGISTERED_KEY: &str = "device.unregistered";
pub const SCHEMA_UPDATED_KEY: &str = "schema.updated";

fn request_data_key(id: &str) -> String {
    format!("device.{id}.data.request")
}

fn update_data_key(id: &str) -> String {
    format!("device.{id}.data.update")
}

#[derive(Serialize)]
struct RegisteredEvent<'a> {
    id: &'a str,
    name: &'a str,
    token: &'a str,
    error: Option<String>,
}

#[derive(Serialize)]
struct UnregisteredEvent<'a> {
    id: &'a str,
    error: Option<String>,
}

#[derive(Serialize)]
struct SchemaUpdatedEvent<'a> {
    id: &'a str,
    schema: &'a [SchemaEntry],
    error: Option<String>,
}

#[derive(Serialize)]
struct AuthReply<'a> {
    id: &'a str,
    authenticated: bool,
    error: Option<String>,
}

#[derive(Serialize)]
struct DeviceListReply<'a> {
    devices: &'a [Thing],
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestDataCommand<'a> {
    id: &'a str,
    sensor_ids: &'a [i32],
}

#[derive(Serialize)]
struct DataPayload<'a> {
    id: &'a str,
    data: &'a [DataValue],
}

/// Publishes thing events and RPC replies over the broker
pub struct AmqpThingEventPublisher {
    publisher: Arc<dyn MessagePublisher>,
}

impl AmqpThingEventPublisher {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }

    async fn send(&self, message: serde_json::Result<OutboundMessage>) -> DomainResult<()> {
        let message = message.map_err(|e| DomainError::PublishError(e.to_string()))?;
        debug!(
            exchange = %message.exchange,
            routing_key = %message.routing_key,
            "publishing thing event"
        );
        self.publisher.publish(&message).await
    }

    async fn send_device_event<T: Serialize + Sync>(
        &self,
        routing_key: &str,
        payload: &T,
    ) -> DomainResult<()> {
        self.send(OutboundMessage::new(
            DEVICES_EXCHANGE,
            ExchangeKind::Direct,
            routing_key,
            payload,
        ))
        .await
    }

    async fn send_reply<T: Serialize + Sync>(
        &self,
        reply: &ReplyTarget,
        payload: &T,
    ) -> DomainResult<()> {
        let correlation_id = reply.correlation_id.clone().unwrap_or_default();
        self.send(OutboundMessage::reply(&reply.reply_to, correlation_id, payload))
            .await
    }
}

#[async_trait]
impl ThingEventPublisher for AmqpThingEventPublisher {
    async fn send_registered(
        &self,
        id: &str,
        name: &str,
        token: &str,
        error: Option<String>,
    ) -> DomainResult<()> {
        let event = RegisteredEvent {
            id,
            name,
            token,
            error,
        };
        self.send_device_event(REGISTERED_KEY, &event).await
    }

    async fn send_unregistered(&self, id: &str, error: Option<String>) -> DomainResult<()> {
        self.send_device_event(UNREGISTERED_KEY, &UnregisteredEvent { id, error })
            .await
    }

    async fn send_schema_updated(
        &self,
        id: &str,
        schema: &[SchemaEntry],
        error: Option<String>,
    ) -> DomainResult<()> {
        let event = SchemaUpdatedEvent { id, schema, error };
        self.send_device_event(SCHEMA_UPDATED_KEY, &event).await
    }

    async fn send_auth_status(
        &self,
        reply: &ReplyTarget,
        id: &str,
        authenticated: bool,
        error: Option<String>,
    ) -> DomainResult<()> {
        let payload = AuthReply {
            id,
            authenticated,
            error,
        };
        self.send_reply(reply, &payload).await
    }

    async fn send_device_list(
        &self,
        reply: &ReplyTarget,
        devices: &[Thing],
        error: Option<String>,
    ) -> DomainResult<()> {
        self.send_reply(reply, &DeviceListReply { devices, error })
            .await
    }

    async fn send_request_data(&self, id: &str, sensor_ids: &[i32]) -> DomainResult<()> {
        let command = RequestDataCommand { id, sensor_ids };
        self.send_device_event(&request_data_key(id), &command)
            .await
    }

    async fn send_update_data(&self, id: &str, data: &[DataValue]) -> DomainResult<()> {
        self.send_device_event(&update_data_key(id), &DataPayload { id, data })
            .await
    }

    async fn send_broadcast_data(
        &self,
        authorization: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()> {
        let message = OutboundMessage::new(
            DATA_PUBLISHED_EXCHANGE,
            ExchangeKind::Fanout,
            "",
            &DataPayload { id, data },
        )
        .map(|m| m.with_options(PublishOptions::default().with_authorization(authorization)));
        self.send(message).await
    }

    async fn send_session_data(
        &self,
        authorization: &str,
        session_id: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()> {
        let message = OutboundMessage::new(
            DATA_SESSIONS_EXCHANGE,
            ExchangeKind::Direct,
            session_id,
            &DataPayload { id, data },
        )
        .map(|m| m.with_options(PublishOptions::default().with_authorization(authorization)));
        self.send(message).await
    }
}
