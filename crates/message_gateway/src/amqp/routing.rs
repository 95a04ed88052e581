use common::amqp::Subscription;
use common::domain::{DispatchError, DomainError, DomainResult, ExchangeKind};
use std::collections::HashMap;
use std::fmt;

pub const DEVICES_EXCHANGE: &str = "devices";
pub const DATA_SENT_EXCHANGE: &str = "data.sent";

pub const REGISTER_KEY: &str = "device.register";
pub const UNREGISTER_KEY: &str = "device.unregister";
pub const UPDATE_SCHEMA_KEY: &str = "schema.update";
pub const REQUEST_DATA_KEY: &str = "data.request";
pub const UPDATE_DATA_KEY: &str = "data.update";
pub const AUTH_DEVICE_KEY: &str = "device.cmd.auth";
pub const LIST_DEVICES_KEY: &str = "device.cmd.list";

/// Controller operation a message is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Unregister,
    UpdateSchema,
    RequestData,
    UpdateData,
    AuthDevice,
    ListDevices,
    PublishData,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Unregister => "unregister",
            Self::UpdateSchema => "update_schema",
            Self::RequestData => "request_data",
            Self::UpdateData => "update_data",
            Self::AuthDevice => "auth_device",
            Self::ListDevices => "list_devices",
            Self::PublishData => "publish_data",
        }
    }

    /// Request/reply operations answer on the message's reply-to queue
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::AuthDevice | Self::ListDevices)
    }

    pub fn requires_body(&self) -> bool {
        !matches!(self, Self::ListDevices)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    pub operation: Operation,
    pub is_rpc: bool,
}

impl RoutingEntry {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            is_rpc: operation.is_rpc(),
        }
    }
}

/// A subscription together with the operation its messages go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub subscription: Subscription,
    pub operation: Operation,
}

impl Route {
    pub fn new(subscription: Subscription, operation: Operation) -> Self {
        Self {
            subscription,
            operation,
        }
    }
}

/// Routes the gateway subscribes to at startup.
///
/// Every `devices` key lands on one queue; `data.sent` is a fanout exchange, so
/// its binding key is irrelevant.
pub fn standard_routes(devices_queue: &str, data_sent_queue: &str) -> Vec<Route> {
    let device = |key: &str, operation| {
        Route::new(
            Subscription::new(devices_queue, DEVICES_EXCHANGE, ExchangeKind::Direct, key),
            operation,
        )
    };

    vec![
        device(REGISTER_KEY, Operation::Register),
        device(UNREGISTER_KEY, Operation::Unregister),
        device(UPDATE_SCHEMA_KEY, Operation::UpdateSchema),
        device(REQUEST_DATA_KEY, Operation::RequestData),
        device(UPDATE_DATA_KEY, Operation::UpdateData),
        device(AUTH_DEVICE_KEY, Operation::AuthDevice),
        device(LIST_DEVICES_KEY, Operation::ListDevices),
        Route::new(
            Subscription::new(data_sent_queue, DATA_SENT_EXCHANGE, ExchangeKind::Fanout, ""),
            Operation::PublishData,
        ),
    ]
}

#[derive(Debug, Default)]
struct ExchangeRoutes {
    keys: HashMap<String, RoutingEntry>,
    // fanout exchanges match any routing key
    any: Option<RoutingEntry>,
}

/// Immutable (exchange, routing key) → operation lookup
#[derive(Debug, Default)]
pub struct RoutingTable {
    exchanges: HashMap<String, ExchangeRoutes>,
}

impl RoutingTable {
    /// Build from routes; two routes for the same pair are rejected.
    pub fn from_routes<'a>(routes: impl IntoIterator<Item = &'a Route>) -> DomainResult<Self> {
        let mut exchanges: HashMap<String, ExchangeRoutes> = HashMap::new();

        for route in routes {
            let sub = &route.subscription;
            let entry = RoutingEntry::new(route.operation);
            let exchange = exchanges.entry(sub.exchange.clone()).or_default();

            let duplicate = match sub.kind {
                ExchangeKind::Fanout => exchange.any.replace(entry).is_some(),
                ExchangeKind::Direct => exchange
                    .keys
                    .insert(sub.binding_key.clone(), entry)
                    .is_some(),
            };

            if duplicate {
                return Err(DomainError::ValidationError(format!(
                    "duplicate route for exchange '{}' key '{}'",
                    sub.exchange, sub.binding_key
                )));
            }
        }

        Ok(Self { exchanges })
    }

    pub fn lookup(&self, exchange: &str, routing_key: &str) -> Result<RoutingEntry, DispatchError> {
        self.exchanges
            .get(exchange)
            .and_then(|routes| routes.keys.get(routing_key).or(routes.any.as_ref()))
            .copied()
            .ok_or_else(|| DispatchError::UnsupportedOperation {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
            })
    }
}
