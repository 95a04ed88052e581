use crate::domain::{DomainResult, ExchangeKind, InboundMessage, OutboundMessage, PublishOptions};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Deliveries of one consumed queue, already converted to domain messages
pub type DeliveryStream = BoxStream<'static, InboundMessage>;

/// One (queue, exchange, kind, binding key) tuple the gateway listens on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub queue: String,
    pub exchange: String,
    pub kind: ExchangeKind,
    pub binding_key: String,
}

impl Subscription {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        kind: ExchangeKind,
        binding_key: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            kind,
            binding_key: binding_key.into(),
        }
    }
}

/// Why a broker session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed on request; no reconnect
    Normal,
    /// Dropped by the broker or the network
    Abnormal(String),
}

/// Opens broker sessions
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> DomainResult<Arc<dyn BrokerSession>>;
}

/// An open connection plus channel to the broker
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Declare a durable exchange; a no-op when it already exists
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> DomainResult<()>;

    /// Declare the exchange and durable queue of a subscription and bind them
    async fn bind(&self, subscription: &Subscription) -> DomainResult<()>;

    /// Start consuming a queue
    async fn consume(&self, queue: &str) -> DomainResult<DeliveryStream>;

    /// Publish a persistent message; one attempt, no retry
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        options: &PublishOptions,
    ) -> DomainResult<()>;

    /// Resolves once the session is closed, with the reason
    async fn closed(&self) -> CloseReason;

    async fn close(&self) -> DomainResult<()>;
}

/// Publish primitive handed to business code
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> DomainResult<()>;
}

/// Subscribe primitive handed to the dispatcher.
///
/// Several subscriptions may feed the same destination; deliveries of distinct
/// queues then interleave with no ordering between them.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageSubscriber: Send + Sync {
    async fn on_message(
        &self,
        subscription: &Subscription,
        destination: mpsc::Sender<InboundMessage>,
    ) -> DomainResult<()>;
}
