use anyhow::{bail, Result};
use common::amqp::ConnectionState;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Follows the connection signal emitted by the connection manager.
///
/// Once reconnecting has given up the gateway keeps running without a broker
/// unless `exit_on_failure` is set, in which case the process fails.
pub struct BrokerMonitor {
    signal: mpsc::Receiver<bool>,
    state: watch::Receiver<ConnectionState>,
    exit_on_failure: bool,
}

impl BrokerMonitor {
    pub fn new(
        signal: mpsc::Receiver<bool>,
        state: watch::Receiver<ConnectionState>,
        exit_on_failure: bool,
    ) -> Self {
        Self {
            signal,
            state,
            exit_on_failure,
        }
    }

    #[instrument(skip_all, name = "broker_monitor")]
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        loop {
            let connected = tokio::select! {
                _ = ctx.cancelled() => break,
                connected = self.signal.recv() => connected,
            };

            match connected {
                Some(true) => info!("amqp broker connected"),
                Some(false) => {
                    let state = *self.state.borrow();
                    if state != ConnectionState::Failed {
                        warn!(state = %state, "amqp broker unavailable");
                        continue;
                    }

                    error!("amqp reconnect budget exhausted, gateway is running degraded");
                    if self.exit_on_failure {
                        bail!("amqp broker connection could not be re-established");
                    }
                }
                None => {
                    info!("connection signal closed");
                    // keep the process alive until shutdown so the runner decides
                    ctx.cancelled().await;
                    break;
                }
            }
        }

        Ok(())
    }
}
