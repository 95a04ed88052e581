use crate::amqp::{Operation, RoutingTable};
use crate::domain::ThingController;
use bytes::Bytes;
use common::domain::{DispatchError, DomainError, DomainResult, InboundMessage};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A message that passed the envelope checks, ready for the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerCall {
    pub operation: Operation,
    pub authorization: String,
    pub body: Bytes,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

impl ControllerCall {
    pub async fn invoke(self, controller: &dyn ThingController) -> DomainResult<()> {
        let auth = self.authorization.as_str();
        let body = self.body.as_ref();
        let reply_to = self.reply_to.as_deref().unwrap_or_default();

        match self.operation {
            Operation::Register => controller.register(body, auth).await,
            Operation::Unregister => controller.unregister(body, auth).await,
            Operation::UpdateSchema => controller.update_schema(body, auth).await,
            Operation::RequestData => controller.request_data(body, auth).await,
            Operation::UpdateData => controller.update_data(body, auth).await,
            Operation::PublishData => controller.publish_data(body, auth).await,
            Operation::AuthDevice => {
                controller
                    .auth_device(body, auth, reply_to, self.correlation_id)
                    .await
            }
            Operation::ListDevices => {
                controller
                    .list_devices(auth, reply_to, self.correlation_id)
                    .await
            }
        }
    }
}

/// Envelope checks for one delivery, in order: authorization, route, body, reply-to.
pub fn resolve(routes: &RoutingTable, msg: &InboundMessage) -> Result<ControllerCall, DispatchError> {
    if msg.headers.is_none() {
        return Err(DispatchError::MissingHeaders);
    }
    let authorization = msg
        .authorization()
        .ok_or(DispatchError::MissingAuthorization)?;

    let entry = routes.lookup(&msg.exchange, &msg.routing_key)?;
    let operation = entry.operation;

    let body = msg.body.clone().filter(|b| !b.is_empty());
    if operation.requires_body() && body.is_none() {
        return Err(DispatchError::MissingBody(operation.name().to_string()));
    }

    let reply_to = msg.reply_to.clone().filter(|r| !r.is_empty());
    if entry.is_rpc && reply_to.is_none() {
        return Err(DispatchError::MissingReplyTo(operation.name().to_string()));
    }

    Ok(ControllerCall {
        operation,
        authorization: authorization.to_string(),
        body: body.unwrap_or_default(),
        reply_to,
        correlation_id: msg.correlation_id.clone().filter(|c| !c.is_empty()),
    })
}

/// Routes inbound messages to the thing controller.
///
/// Resolves to the operation that handled the message.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RoutingTable>,
    controller: Arc<dyn ThingController>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RoutingTable>, controller: Arc<dyn ThingController>) -> Self {
        Self { routes, controller }
    }
}

impl Service<InboundMessage> for Dispatcher {
    type Response = Operation;
    type Error = DomainError;
    type Future = BoxFuture<'static, Result<Operation, DomainError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, msg: InboundMessage) -> Self::Future {
        let routes = self.routes.clone();
        let controller = self.controller.clone();

        Box::pin(async move {
            let call = resolve(&routes, &msg)?;
            let operation = call.operation;
            call.invoke(controller.as_ref()).await?;
            Ok(operation)
        })
    }
}
