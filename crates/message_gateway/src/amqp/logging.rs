use crate::amqp::Operation;
use common::domain::InboundMessage;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, warn, Instrument, Span};

/// Tower layer logging each dispatched message
#[derive(Clone, Default)]
pub struct DispatchLoggingLayer;

impl DispatchLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for DispatchLoggingLayer {
    type Service = DispatchLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        DispatchLoggingService { inner: service }
    }
}

#[derive(Clone)]
pub struct DispatchLoggingService<S> {
    inner: S,
}

impl<S> Service<InboundMessage> for DispatchLoggingService<S>
where
    S: Service<InboundMessage, Response = Operation> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, msg: InboundMessage) -> Self::Future {
        let exchange = msg.exchange.clone();
        let routing_key = msg.routing_key.clone();
        let payload_bytes = msg.body_len();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(msg).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(operation) => info!(
                        exchange = %exchange,
                        routing_key = %routing_key,
                        payload_bytes = payload_bytes,
                        operation = %operation,
                        duration_ms = %duration_ms,
                        "dispatched {routing_key} to {operation} in {duration_ms}ms"
                    ),
                    // a rejected message is dropped; the loop keeps going
                    Err(e) => warn!(
                        exchange = %exchange,
                        routing_key = %routing_key,
                        payload_bytes = payload_bytes,
                        duration_ms = %duration_ms,
                        error = %e,
                        "dropped message from {exchange}/{routing_key} after {duration_ms}ms: {e}"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct FixedService(Result<Operation, String>);

    impl Service<InboundMessage> for FixedService {
        type Response = Operation;
        type Error = String;
        type Future = BoxFuture<'static, Result<Operation, String>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _msg: InboundMessage) -> Self::Future {
            let result = self.0.clone();
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_passes_result_through() {
        let service = DispatchLoggingLayer::new().layer(FixedService(Ok(Operation::Register)));
        let msg = InboundMessage::new("devices", "device.register");
        assert_eq!(service.oneshot(msg).await, Ok(Operation::Register));

        let service = DispatchLoggingLayer::new().layer(FixedService(Err("boom".to_string())));
        let msg = InboundMessage::new("devices", "device.register");
        assert_eq!(service.oneshot(msg).await, Err("boom".to_string()));
    }
}
