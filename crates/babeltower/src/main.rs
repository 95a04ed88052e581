mod collaborators;
mod config;

use babeltower_runner::Runner;
use collaborators::{UnconfiguredSessionStore, UnconfiguredThingProxy};
use common::amqp::{ConnectionManager, ExponentialBackoff, LapinConnector};
use common::auth::JwtTokenClaims;
use common::rules::RuleTable;
use common::telemetry::{init_telemetry, TelemetryConfig};
use config::ServiceConfig;
use message_gateway::{BrokerMonitor, MessageGateway, MessageGatewayConfig, ThingCollaborators};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig::new(
        config.service_name.clone(),
        config.log_level.clone(),
    )) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(service = %config.service_name, "starting babeltower");
    debug!("configuration: {:?}", config);

    let rule_table = Arc::new(RuleTable::standard());
    info!(rules = rule_table.len(), "rule table loaded");

    let connection = ConnectionManager::new(
        Arc::new(LapinConnector::new(config.amqp_url.clone())),
        Box::new(ExponentialBackoff::new(
            config.backoff_initial(),
            config.amqp_backoff_multiplier,
            config.backoff_max_interval(),
            config.backoff_max_elapsed(),
        )),
    );

    let (signal_tx, signal_rx) = mpsc::channel(16);
    if let Err(e) = connection.start(signal_tx).await {
        error!(error = %e, "failed to connect to amqp broker");
        std::process::exit(1);
    }

    let gateway = match MessageGateway::new(
        Arc::new(connection.clone()),
        Arc::new(connection.clone()),
        ThingCollaborators {
            thing_proxy: Arc::new(UnconfiguredThingProxy),
            session_store: Arc::new(UnconfiguredSessionStore),
            token_claims: Arc::new(JwtTokenClaims::new()),
        },
        rule_table,
        MessageGatewayConfig {
            devices_queue: config.devices_queue.clone(),
            data_sent_queue: config.data_sent_queue.clone(),
            queue_capacity: config.dispatch_queue_capacity,
        },
    )
    .await
    {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("failed to initialize message gateway: {:#}", e);
            connection.stop().await;
            std::process::exit(1);
        }
    };

    let monitor = BrokerMonitor::new(
        signal_rx,
        connection.state(),
        config.amqp_exit_on_reconnect_failure,
    );

    let result = Runner::new()
        .with_named_process("message_gateway", move |ctx| gateway.run(ctx))
        .with_named_process("broker_monitor", move |ctx| monitor.run(ctx))
        .with_closer(move || async move {
            info!("closing amqp connection");
            connection.stop().await;
            Ok(())
        })
        .with_closer_timeout(config.shutdown_timeout())
        .run()
        .await;

    if result.is_err() {
        std::process::exit(1);
    }
}
