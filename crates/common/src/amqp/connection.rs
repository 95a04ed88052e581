use crate::amqp::{
    BackoffPolicy, BrokerConnector, BrokerSession, CloseReason, ConnectionEvent, ConnectionState,
    DeliveryStream, MessagePublisher, MessageSubscriber, Subscription,
};
use crate::domain::{
    DomainError, DomainResult, ExchangeKind, InboundMessage, OutboundMessage, PublishOptions,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Owns the broker connection and keeps it alive.
///
/// Connection status is reported twice: as `true`/`false` on the signal
/// channel passed to [`ConnectionManager::start`], and as a
/// [`ConnectionState`] through [`ConnectionManager::state`]. Subscriptions
/// are recorded and re-established after every successful reconnect.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn BrokerConnector>,
    backoff: Mutex<Box<dyn BackoffPolicy>>,
    session: RwLock<Option<Arc<dyn BrokerSession>>>,
    subscriptions: Mutex<Subscriptions>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct Subscriptions {
    bindings: Vec<Subscription>,
    // one consumer task per queue, whatever the number of bindings
    destinations: HashMap<String, mpsc::Sender<InboundMessage>>,
    // cancelled when a consumer of the current session ends on its own;
    // replaced on every reconnect
    consumer_lost: CancellationToken,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, backoff: Box<dyn BackoffPolicy>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                connector,
                backoff: Mutex::new(backoff),
                session: RwLock::new(None),
                subscriptions: Mutex::new(Subscriptions::default()),
                state_tx,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Connect with backoff and report the outcome on `signal`.
    ///
    /// On success a watcher task keeps the connection alive: it emits `false`
    /// whenever the connection closes and, after an abnormal close, `true`
    /// again once reconnected.
    pub async fn start(&self, signal: mpsc::Sender<bool>) -> DomainResult<()> {
        self.inner.transition(ConnectionEvent::ConnectRequested);

        match self.inner.connect_with_backoff().await {
            Ok(session) => {
                if !self.inner.install(session.clone()).await {
                    return Err(stopped());
                }
                let _ = signal.send(true).await;

                tokio::spawn(self.inner.clone().watch(session, signal));
                Ok(())
            }
            Err(e) if self.inner.shutdown.is_cancelled() => Err(e),
            Err(e) => {
                self.inner.transition(ConnectionEvent::BudgetExhausted);
                error!(error = %e, "giving up connecting to amqp broker");
                let _ = signal.send(false).await;
                Err(e)
            }
        }
    }

    /// Close channel and connection. Idempotent, callable in any state.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();
        self.inner.transition(ConnectionEvent::StopRequested);

        let session = self.inner.session.write().await.take();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!(error = %e, "failed to close amqp connection");
            }
            info!("amqp connection closed");
        }
    }

    /// Publish a persistent message in a single attempt.
    ///
    /// The exchange is declared first unless it is the default exchange.
    #[instrument(skip(self, payload, options), fields(exchange = %exchange, routing_key = %routing_key))]
    pub async fn publish_persistent_message(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        routing_key: &str,
        payload: &serde_json::Value,
        options: &PublishOptions,
    ) -> DomainResult<()> {
        let session = self
            .inner
            .current_session()
            .await
            .ok_or_else(|| DomainError::PublishError("not connected to broker".to_string()))?;

        if !exchange.is_empty() {
            session
                .declare_exchange(exchange, kind)
                .await
                .map_err(|e| DomainError::PublishError(e.to_string()))?;
        }

        let body =
            serde_json::to_vec(payload).map_err(|e| DomainError::PublishError(e.to_string()))?;

        session
            .publish(exchange, routing_key, body, options)
            .await
            .map_err(|e| match e {
                DomainError::PublishError(_) => e,
                other => DomainError::PublishError(other.to_string()),
            })?;

        debug!("message published");
        Ok(())
    }

    /// Bind `subscription` and feed its queue's deliveries into `destination`.
    ///
    /// Later subscriptions on an already-consumed queue only add a binding.
    #[instrument(skip(self, destination), fields(queue = %subscription.queue, exchange = %subscription.exchange, binding_key = %subscription.binding_key))]
    pub async fn on_message(
        &self,
        subscription: &Subscription,
        destination: mpsc::Sender<InboundMessage>,
    ) -> DomainResult<()> {
        let session = self
            .inner
            .current_session()
            .await
            .ok_or_else(|| DomainError::SubscribeError("not connected to broker".to_string()))?;

        let mut subscriptions = self.inner.subscriptions.lock().await;

        session.bind(subscription).await.map_err(as_subscribe_error)?;

        if !subscriptions.destinations.contains_key(&subscription.queue) {
            let deliveries = session
                .consume(&subscription.queue)
                .await
                .map_err(as_subscribe_error)?;
            self.inner.spawn_forwarder(
                subscription.queue.clone(),
                deliveries,
                destination.clone(),
                subscriptions.consumer_lost.clone(),
            );
            subscriptions
                .destinations
                .insert(subscription.queue.clone(), destination);
        }

        if !subscriptions.bindings.contains(subscription) {
            subscriptions.bindings.push(subscription.clone());
        }

        debug!("subscribed");
        Ok(())
    }
}

fn stopped() -> DomainError {
    DomainError::ConnectionError("connection manager stopped".to_string())
}

fn as_subscribe_error(e: DomainError) -> DomainError {
    match e {
        DomainError::SubscribeError(_) => e,
        other => DomainError::SubscribeError(other.to_string()),
    }
}

impl Inner {
    fn transition(&self, event: ConnectionEvent) {
        self.state_tx.send_modify(|state| {
            let next = state.on(event);
            if next != *state {
                debug!(from = %state, to = %next, "connection state changed");
            }
            *state = next;
        });
    }

    async fn current_session(&self) -> Option<Arc<dyn BrokerSession>> {
        self.session.read().await.clone()
    }

    /// Make `session` the live one. Returns false, closing it instead, once
    /// `stop` has run.
    async fn install(&self, session: Arc<dyn BrokerSession>) -> bool {
        let mut current = self.session.write().await;
        if self.shutdown.is_cancelled() {
            drop(current);
            if let Err(e) = session.close().await {
                warn!(error = %e, "failed to close amqp connection opened during stop");
            }
            return false;
        }

        *current = Some(session);
        self.transition(ConnectionEvent::Established);
        true
    }

    async fn connect_with_backoff(&self) -> DomainResult<Arc<dyn BrokerSession>> {
        let mut backoff = self.backoff.lock().await;
        backoff.reset();

        loop {
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(stopped()),
                attempt = self.connector.connect() => attempt,
            };
            let err = match attempt {
                Ok(session) => return Ok(session),
                Err(e) => e,
            };

            let Some(delay) = backoff.next_backoff() else {
                return Err(DomainError::ConnectionError(format!(
                    "retry budget exhausted: {err}"
                )));
            };

            warn!(
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "failed to connect to amqp broker"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(stopped()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn watch(self: Arc<Self>, mut session: Arc<dyn BrokerSession>, signal: mpsc::Sender<bool>) {
        loop {
            let consumer_lost = self.subscriptions.lock().await.consumer_lost.clone();

            let reason = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                reason = session.closed() => reason,
                _ = consumer_lost.cancelled() => {
                    // the channel went away under a live connection
                    if let Err(e) = session.close().await {
                        debug!(error = %e, "failed to close amqp session after consumer loss");
                    }
                    CloseReason::Abnormal("consumer stream ended".to_string())
                }
            };

            if self.shutdown.is_cancelled() {
                return;
            }

            let _ = signal.send(false).await;

            let cause = match reason {
                CloseReason::Normal => {
                    self.transition(ConnectionEvent::ClosedNormally);
                    info!("amqp connection closed normally");
                    return;
                }
                CloseReason::Abnormal(cause) => cause,
            };

            warn!(cause = %cause, "amqp connection lost, reconnecting");
            self.transition(ConnectionEvent::Lost);
            *self.session.write().await = None;

            match self.connect_with_backoff().await {
                Ok(new_session) => {
                    self.restore_subscriptions(new_session.as_ref()).await;
                    if !self.install(new_session.clone()).await {
                        return;
                    }
                    info!("amqp connection re-established");
                    let _ = signal.send(true).await;
                    session = new_session;
                }
                Err(_) if self.shutdown.is_cancelled() => return,
                Err(e) => {
                    self.transition(ConnectionEvent::BudgetExhausted);
                    error!(error = %e, "failed to re-establish amqp connection");
                    let _ = signal.send(false).await;
                    return;
                }
            }
        }
    }

    async fn restore_subscriptions(&self, session: &dyn BrokerSession) {
        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions.consumer_lost = CancellationToken::new();

        for binding in &subscriptions.bindings {
            if let Err(e) = session.bind(binding).await {
                error!(queue = %binding.queue, exchange = %binding.exchange, error = %e, "failed to restore binding");
            }
        }

        for (queue, destination) in &subscriptions.destinations {
            match session.consume(queue).await {
                Ok(deliveries) => self.spawn_forwarder(
                    queue.clone(),
                    deliveries,
                    destination.clone(),
                    subscriptions.consumer_lost.clone(),
                ),
                Err(e) => error!(queue = %queue, error = %e, "failed to restore consumer"),
            }
        }

        debug!(bindings = subscriptions.bindings.len(), "subscriptions restored");
    }

    fn spawn_forwarder(
        &self,
        queue: String,
        mut deliveries: DeliveryStream,
        destination: mpsc::Sender<InboundMessage>,
        consumer_lost: CancellationToken,
    ) {
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = deliveries.next() => match next {
                        Some(message) => {
                            if destination.send(message).await.is_err() {
                                debug!(queue = %queue, "destination closed, stopping consumer");
                                break;
                            }
                        }
                        None => {
                            if !shutdown.is_cancelled() {
                                warn!(queue = %queue, "consumer stream ended unexpectedly");
                                consumer_lost.cancel();
                            }
                            break;
                        }
                    },
                }
            }
            debug!(queue = %queue, "consumer stopped");
        });
    }
}

#[async_trait]
impl MessagePublisher for ConnectionManager {
    async fn publish(&self, message: &OutboundMessage) -> DomainResult<()> {
        self.publish_persistent_message(
            &message.exchange,
            message.kind,
            &message.routing_key,
            &message.payload,
            &message.options,
        )
        .await
    }
}

#[async_trait]
impl MessageSubscriber for ConnectionManager {
    async fn on_message(
        &self,
        subscription: &Subscription,
        destination: mpsc::Sender<InboundMessage>,
    ) -> DomainResult<()> {
        ConnectionManager::on_message(self, subscription, destination).await
    }
}
