use crate::amqp::{BrokerConnector, BrokerSession, CloseReason, DeliveryStream, Subscription};
use crate::domain::{
    DomainError, DomainResult, ExchangeKind, InboundMessage, PublishOptions, AUTHORIZATION_HEADER,
};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

const PERSISTENT: u8 = 2;
const JSON_CONTENT_TYPE: &str = "application/json";

/// Opens AMQP 0-9-1 sessions with lapin
pub struct LapinConnector {
    url: String,
}

impl LapinConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BrokerConnector for LapinConnector {
    async fn connect(&self) -> DomainResult<Arc<dyn BrokerSession>> {
        debug!("connecting to amqp broker");

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| DomainError::ConnectionError(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| DomainError::ConnectionError(e.to_string()))?;

        let (closed_tx, closed_rx) = watch::channel(None);
        let on_error_tx = closed_tx.clone();
        connection.on_error(move |err| {
            mark_closed(&on_error_tx, CloseReason::Abnormal(err.to_string()));
        });

        info!("connected to amqp broker");
        Ok(Arc::new(LapinSession {
            connection,
            channel,
            closed_tx,
            closed_rx,
        }))
    }
}

/// First close reason wins; a normal close is not overwritten by the error
/// lapin reports while tearing the socket down.
fn mark_closed(tx: &watch::Sender<Option<CloseReason>>, reason: CloseReason) {
    tx.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(reason);
            true
        } else {
            false
        }
    });
}

pub struct LapinSession {
    connection: Connection,
    channel: Channel,
    closed_tx: watch::Sender<Option<CloseReason>>,
    closed_rx: watch::Receiver<Option<CloseReason>>,
}

#[async_trait]
impl BrokerSession for LapinSession {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> DomainResult<()> {
        let kind = match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        };

        self.channel
            .exchange_declare(
                name,
                kind,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| DomainError::TransientBrokerError(e.to_string()))
    }

    #[instrument(skip(self), fields(queue = %subscription.queue, exchange = %subscription.exchange))]
    async fn bind(&self, subscription: &Subscription) -> DomainResult<()> {
        let subscribe_err = |e: lapin::Error| DomainError::SubscribeError(e.to_string());

        self.declare_exchange(&subscription.exchange, subscription.kind)
            .await?;

        self.channel
            .queue_declare(
                &subscription.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_err)?;

        self.channel
            .queue_bind(
                &subscription.queue,
                &subscription.exchange,
                &subscription.binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(subscribe_err)?;

        debug!(binding_key = %subscription.binding_key, "queue bound");
        Ok(())
    }

    async fn consume(&self, queue: &str) -> DomainResult<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| DomainError::SubscribeError(e.to_string()))?;

        let queue = queue.to_string();
        let stream = consumer.filter_map(move |delivery| {
            let queue = queue.clone();
            async move {
                match delivery {
                    Ok(delivery) => Some(inbound_from_delivery(delivery)),
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "failed to receive delivery");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        options: &PublishOptions,
    ) -> DomainResult<()> {
        let publish_err = |e: lapin::Error| DomainError::PublishError(e.to_string());

        let mut properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type(ShortString::from(JSON_CONTENT_TYPE));

        if let Some(correlation_id) = &options.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id.as_str()));
        }

        if let Some(authorization) = &options.authorization {
            let mut headers = FieldTable::default();
            headers.insert(
                ShortString::from(AUTHORIZATION_HEADER),
                AMQPValue::LongString(LongString::from(authorization.as_str())),
            );
            properties = properties.with_headers(headers);
        }

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(publish_err)?
            .await
            .map_err(publish_err)?;

        Ok(())
    }

    async fn closed(&self) -> CloseReason {
        let mut rx = self.closed_rx.clone();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(CloseReason::Normal),
            Err(_) => CloseReason::Normal,
        };
        reason
    }

    async fn close(&self) -> DomainResult<()> {
        mark_closed(&self.closed_tx, CloseReason::Normal);

        if self.channel.status().connected() {
            self.channel
                .close(200, "closing")
                .await
                .map_err(|e| DomainError::ConnectionError(e.to_string()))?;
        }

        if self.connection.status().connected() {
            self.connection
                .close(200, "closing")
                .await
                .map_err(|e| DomainError::ConnectionError(e.to_string()))?;
        }

        Ok(())
    }
}

fn inbound_from_delivery(delivery: Delivery) -> InboundMessage {
    let properties = &delivery.properties;

    InboundMessage {
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        body: (!delivery.data.is_empty()).then(|| delivery.data.clone().into()),
        headers: properties.headers().as_ref().map(headers_to_json),
        correlation_id: properties
            .correlation_id()
            .as_ref()
            .map(|id| id.to_string()),
        reply_to: properties.reply_to().as_ref().map(|to| to.to_string()),
    }
}

fn headers_to_json(table: &FieldTable) -> HashMap<String, serde_json::Value> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.to_string(), amqp_to_json(value)))
        .collect()
}

fn amqp_to_json(value: &AMQPValue) -> serde_json::Value {
    use serde_json::Value;

    match value {
        AMQPValue::Boolean(v) => Value::Bool(*v),
        AMQPValue::ShortShortInt(v) => Value::from(*v),
        AMQPValue::ShortShortUInt(v) => Value::from(*v),
        AMQPValue::ShortInt(v) => Value::from(*v),
        AMQPValue::ShortUInt(v) => Value::from(*v),
        AMQPValue::LongInt(v) => Value::from(*v),
        AMQPValue::LongUInt(v) => Value::from(*v),
        AMQPValue::LongLongInt(v) => Value::from(*v),
        AMQPValue::Float(v) => Value::from(*v),
        AMQPValue::Double(v) => Value::from(*v),
        AMQPValue::Timestamp(v) => Value::from(*v),
        AMQPValue::ShortString(v) => Value::String(v.to_string()),
        AMQPValue::LongString(v) => Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()),
        AMQPValue::FieldArray(values) => {
            Value::Array(values.as_slice().iter().map(amqp_to_json).collect())
        }
        AMQPValue::FieldTable(table) => Value::Object(headers_to_json(table).into_iter().collect()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_to_json() {
        let mut nested = FieldTable::default();
        nested.insert(ShortString::from("retries"), AMQPValue::LongInt(3));

        let mut table = FieldTable::default();
        table.insert(
            ShortString::from(AUTHORIZATION_HEADER),
            AMQPValue::LongString(LongString::from("tok")),
        );
        table.insert(ShortString::from("flag"), AMQPValue::Boolean(true));
        table.insert(ShortString::from("meta"), AMQPValue::FieldTable(nested));

        let headers = headers_to_json(&table);
        assert_eq!(headers[AUTHORIZATION_HEADER], json!("tok"));
        assert_eq!(headers["flag"], json!(true));
        assert_eq!(headers["meta"], json!({"retries": 3}));
    }

    #[test]
    fn test_mark_closed_keeps_first_reason() {
        let (tx, rx) = watch::channel(None);

        mark_closed(&tx, CloseReason::Normal);
        mark_closed(&tx, CloseReason::Abnormal("socket reset".to_string()));

        assert_eq!(*rx.borrow(), Some(CloseReason::Normal));
    }
}
