use crate::amqp::{
    standard_routes, AmqpThingEventPublisher, DispatchConsumer, DispatchLoggingLayer,
    DispatchLoggingService, Dispatcher, RoutingTable,
};
use crate::domain::{ThingControllerImpl, ThingEventPublisher, ThingService};
use anyhow::{Context, Result};
use common::amqp::{MessagePublisher, MessageSubscriber};
use common::domain::{SessionStore, ThingProxy, TokenClaims};
use common::rules::{RuleEngine, RuleTable};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::Layer;
use tracing::info;

pub struct MessageGatewayConfig {
    pub devices_queue: String,
    pub data_sent_queue: String,
    /// Capacity of the unified delivery channel
    pub queue_capacity: usize,
}

/// External services the thing business logic talks to
pub struct ThingCollaborators {
    pub thing_proxy: Arc<dyn ThingProxy>,
    pub session_store: Arc<dyn SessionStore>,
    pub token_claims: Arc<dyn TokenClaims>,
}

pub struct MessageGateway {
    consumer: DispatchConsumer<DispatchLoggingService<Dispatcher>>,
}

impl MessageGateway {
    /// Build the dispatch stack and subscribe every route.
    ///
    /// All subscriptions feed one bounded channel read by a single consumer.
    pub async fn new(
        subscriber: Arc<dyn MessageSubscriber>,
        publisher: Arc<dyn MessagePublisher>,
        collaborators: ThingCollaborators,
        rule_table: Arc<RuleTable>,
        config: MessageGatewayConfig,
    ) -> Result<Self> {
        info!("initializing message gateway");

        let events: Arc<dyn ThingEventPublisher> =
            Arc::new(AmqpThingEventPublisher::new(publisher));
        let service = Arc::new(ThingService::new(
            collaborators.thing_proxy,
            collaborators.session_store,
            collaborators.token_claims,
            events.clone(),
            RuleEngine::new(rule_table),
        ));
        let controller = Arc::new(ThingControllerImpl::new(service, events));

        let routes = standard_routes(&config.devices_queue, &config.data_sent_queue);
        let table = Arc::new(RoutingTable::from_routes(&routes)?);

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        for route in &routes {
            subscriber
                .on_message(&route.subscription, tx.clone())
                .await
                .with_context(|| {
                    format!(
                        "failed to subscribe to {}/{}",
                        route.subscription.exchange, route.subscription.binding_key
                    )
                })?;
        }

        let dispatcher = Dispatcher::new(table, controller);
        let service = DispatchLoggingLayer::new().layer(dispatcher);

        info!(routes = routes.len(), "message gateway initialized");

        Ok(Self {
            consumer: DispatchConsumer::new(rx, service),
        })
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        self.consumer.run(ctx).await
    }
}
