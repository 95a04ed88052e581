use crate::amqp::Operation;
use anyhow::Result;
use common::domain::InboundMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, info, instrument};

/// Single consume loop over the unified delivery channel.
///
/// Messages are handled one at a time in delivery order. A failing message is
/// dropped and the loop moves on; cancellation stops intake but never
/// interrupts the message being processed.
pub struct DispatchConsumer<S> {
    receiver: mpsc::Receiver<InboundMessage>,
    service: S,
}

impl<S> DispatchConsumer<S>
where
    S: Service<InboundMessage, Response = Operation> + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    pub fn new(receiver: mpsc::Receiver<InboundMessage>, service: S) -> Self {
        Self { receiver, service }
    }

    #[instrument(skip_all, name = "dispatch_consumer")]
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        debug!("starting dispatch consumer");

        loop {
            let msg = tokio::select! {
                _ = ctx.cancelled() => {
                    info!("received shutdown signal, stopping dispatch consumer");
                    break;
                }
                msg = self.receiver.recv() => msg,
            };

            let Some(msg) = msg else {
                info!("delivery channel closed, stopping dispatch consumer");
                break;
            };

            self.process(msg).await;
        }

        debug!("dispatch consumer stopped gracefully");
        Ok(())
    }

    async fn process(&mut self, msg: InboundMessage) {
        let service = match self.service.ready().await {
            Ok(service) => service,
            Err(e) => {
                debug!(error = %e, "dispatch service not ready, dropping message");
                return;
            }
        };

        if let Err(e) = service.call(msg).await {
            debug!(error = %e, "message processing failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    /// Records routing keys and fails every key starting with "bad"
    #[derive(Clone, Default)]
    struct RecordingService {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Service<InboundMessage> for RecordingService {
        type Response = Operation;
        type Error = String;
        type Future = BoxFuture<'static, Result<Operation, String>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, msg: InboundMessage) -> Self::Future {
            self.seen.lock().unwrap().push(msg.routing_key.clone());
            Box::pin(async move {
                if msg.routing_key.starts_with("bad") {
                    Err("rejected".to_string())
                } else {
                    Ok(Operation::UpdateData)
                }
            })
        }
    }

    #[tokio::test]
    async fn test_bad_message_does_not_halt_loop() {
        let (tx, rx) = mpsc::channel(8);
        let service = RecordingService::default();
        let seen = service.seen.clone();

        for key in ["first", "bad.one", "second"] {
            tx.send(InboundMessage::new("devices", key)).await.unwrap();
        }
        drop(tx);

        DispatchConsumer::new(rx, service)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["first", "bad.one", "second"]);
    }

    #[tokio::test]
    async fn test_stops_on_cancellation() {
        let (_tx, rx) = mpsc::channel(8);
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = DispatchConsumer::new(rx, RecordingService::default())
            .run(ctx)
            .await;
        assert!(result.is_ok());
    }
}
