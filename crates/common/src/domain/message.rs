use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Header carrying the caller's token on every inbound message.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Routing behaviour of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Exact routing-key match
    Direct,
    /// Every bound queue receives the message regardless of key
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame delivered by the broker, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Option<Bytes>,
    pub headers: Option<HashMap<String, serde_json::Value>>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl InboundMessage {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body: None,
            headers: None,
            correlation_id: None,
            reply_to: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn with_authorization(self, token: impl Into<String>) -> Self {
        self.with_header(AUTHORIZATION_HEADER, serde_json::Value::String(token.into()))
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// The authorization header when present and textual
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .as_ref()?
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| value.as_str())
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, |b| b.len())
    }
}

/// Per-publish metadata attached as message properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub correlation_id: Option<String>,
    pub authorization: Option<String>,
}

impl PublishOptions {
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        if !correlation_id.is_empty() {
            self.correlation_id = Some(correlation_id);
        }
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }
}

/// A reply or event ready to hand to the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub kind: ExchangeKind,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub options: PublishOptions,
}

impl OutboundMessage {
    pub fn new<T: Serialize>(
        exchange: impl Into<String>,
        kind: ExchangeKind,
        routing_key: impl Into<String>,
        payload: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            exchange: exchange.into(),
            kind,
            routing_key: routing_key.into(),
            payload: serde_json::to_value(payload)?,
            options: PublishOptions::default(),
        })
    }

    /// Reply routed through the default exchange straight to a `reply-to` queue
    pub fn reply<T: Serialize>(
        reply_to: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: &T,
    ) -> serde_json::Result<Self> {
        let mut msg = Self::new("", ExchangeKind::Direct, reply_to, payload)?;
        msg.options = msg.options.with_correlation_id(correlation_id);
        Ok(msg)
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_authorization_requires_string_header() {
        let msg = InboundMessage::new("devices", "device.register").with_authorization("tok");
        assert_eq!(msg.authorization(), Some("tok"));

        let msg = InboundMessage::new("devices", "device.register")
            .with_header(AUTHORIZATION_HEADER, json!(42));
        assert_eq!(msg.authorization(), None);

        let msg = InboundMessage::new("devices", "device.register");
        assert_eq!(msg.authorization(), None);
    }

    #[test]
    fn test_reply_uses_default_exchange() {
        let msg = OutboundMessage::reply("reply-queue", "cid", &json!({"error": null})).unwrap();
        assert_eq!(msg.exchange, "");
        assert_eq!(msg.routing_key, "reply-queue");
        assert_eq!(msg.options.correlation_id.as_deref(), Some("cid"));
    }

    #[test]
    fn test_empty_correlation_id_is_dropped() {
        let options = PublishOptions::default().with_correlation_id("");
        assert!(options.correlation_id.is_none());
    }
}
