use crate::domain::{ReplyTarget, ThingEventPublisher};
use common::domain::{
    DataValidationError, DataValue, DomainError, DomainResult, SchemaEntry, SessionStore,
    ThingProxy, TokenClaims,
};
use common::rules::RuleEngine;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const MAX_THING_ID_LEN: usize = 16;

/// Business operations on things.
///
/// Calls the registry through [`ThingProxy`], validates schemas and values
/// with the [`RuleEngine`] and reports results through the
/// [`ThingEventPublisher`]. Operations with a client-visible outcome publish
/// it whether they succeed or fail.
pub struct ThingService {
    thing_proxy: Arc<dyn ThingProxy>,
    session_store: Arc<dyn SessionStore>,
    token_claims: Arc<dyn TokenClaims>,
    publisher: Arc<dyn ThingEventPublisher>,
    rule_engine: RuleEngine,
}

impl ThingService {
    pub fn new(
        thing_proxy: Arc<dyn ThingProxy>,
        session_store: Arc<dyn SessionStore>,
        token_claims: Arc<dyn TokenClaims>,
        publisher: Arc<dyn ThingEventPublisher>,
        rule_engine: RuleEngine,
    ) -> Self {
        Self {
            thing_proxy,
            session_store,
            token_claims,
            publisher,
            rule_engine,
        }
    }

    #[instrument(skip(self, authorization), fields(thing_id = %id))]
    pub async fn register(&self, authorization: &str, id: &str, name: &str) -> DomainResult<()> {
        let outcome = self.create_thing(authorization, id, name).await;

        let (token, error) = match &outcome {
            Ok(token) => (token.as_str(), None),
            Err(e) => ("", Some(e.to_string())),
        };
        let sent = self.publisher.send_registered(id, name, token, error).await;

        merge(outcome.map(|_| ()), sent)?;
        info!("thing registered");
        Ok(())
    }

    async fn create_thing(&self, authorization: &str, id: &str, name: &str) -> DomainResult<String> {
        require_authorization(authorization)?;
        verify_thing_id(id)?;
        self.thing_proxy.create(authorization, id, name).await
    }

    #[instrument(skip(self, authorization), fields(thing_id = %id))]
    pub async fn unregister(&self, authorization: &str, id: &str) -> DomainResult<()> {
        let outcome = async {
            require_authorization(authorization)?;
            require_id(id)?;
            self.thing_proxy.remove(authorization, id).await
        }
        .await;

        let sent = self
            .publisher
            .send_unregistered(id, error_text(&outcome))
            .await;

        merge(outcome, sent)?;
        info!("thing unregistered");
        Ok(())
    }

    #[instrument(skip(self, authorization, schema), fields(thing_id = %id, entries = schema.len()))]
    pub async fn update_schema(
        &self,
        authorization: &str,
        id: &str,
        schema: &[SchemaEntry],
    ) -> DomainResult<()> {
        let outcome = async {
            require_authorization(authorization)?;
            require_id(id)?;
            if schema.is_empty() {
                return Err(DomainError::SchemaNotProvided);
            }
            self.rule_engine.validate_schema(schema)?;
            self.thing_proxy.update_schema(authorization, id, schema).await
        }
        .await;

        if let Err(e) = &outcome {
            warn!(error = %e, "schema update rejected");
        }

        let sent = self
            .publisher
            .send_schema_updated(id, schema, error_text(&outcome))
            .await;

        merge(outcome, sent)?;
        info!("thing schema updated");
        Ok(())
    }

    /// Check the thing exists for the caller and that `token` is its token;
    /// the verdict goes back to `reply`.
    #[instrument(skip(self, authorization, token, reply), fields(thing_id = %id))]
    pub async fn auth_device(
        &self,
        authorization: &str,
        id: &str,
        token: &str,
        reply: &ReplyTarget,
    ) -> DomainResult<()> {
        let outcome = async {
            require_authorization(authorization)?;
            require_id(id)?;
            let thing = self.thing_proxy.get(authorization, id).await?;
            if !thing.token.is_empty() && thing.token != token {
                return Err(DomainError::ThingForbidden);
            }
            Ok(())
        }
        .await;

        let sent = self
            .publisher
            .send_auth_status(reply, id, outcome.is_ok(), error_text(&outcome))
            .await;

        merge(outcome, sent)?;
        debug!("authentication status sent");
        Ok(())
    }

    #[instrument(skip(self, authorization, reply))]
    pub async fn list_devices(&self, authorization: &str, reply: &ReplyTarget) -> DomainResult<()> {
        let outcome = async {
            require_authorization(authorization)?;
            self.thing_proxy.list(authorization).await
        }
        .await;

        let sent = match &outcome {
            Ok(things) => self.publisher.send_device_list(reply, things, None).await,
            Err(e) => {
                self.publisher
                    .send_device_list(reply, &[], Some(e.to_string()))
                    .await
            }
        };

        let things = merge(outcome, sent)?;
        debug!(count = things.len(), "device list sent");
        Ok(())
    }

    #[instrument(skip(self, authorization, sensor_ids), fields(thing_id = %id))]
    pub async fn request_data(
        &self,
        authorization: &str,
        id: &str,
        sensor_ids: &[i32],
    ) -> DomainResult<()> {
        require_authorization(authorization)?;
        require_id(id)?;
        if sensor_ids.is_empty() {
            return Err(DomainError::SensorsNotProvided);
        }

        let thing = self.thing_proxy.get(authorization, id).await?;
        let schema = thing.schema().ok_or(DataValidationError::NoSchema)?;

        if let Some(missing) = sensor_ids
            .iter()
            .find(|sensor_id| !schema.iter().any(|entry| entry.sensor_id == **sensor_id))
        {
            return Err(DataValidationError::SensorNotFound(*missing).into());
        }

        self.publisher.send_request_data(id, sensor_ids).await?;
        info!("data request command sent");
        Ok(())
    }

    #[instrument(skip(self, authorization, data), fields(thing_id = %id, values = data.len()))]
    pub async fn update_data(
        &self,
        authorization: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()> {
        self.verify_thing_data(authorization, id, data).await?;

        self.publisher.send_update_data(id, data).await?;
        info!("data update command sent");
        Ok(())
    }

    /// Broadcast validated values, then forward them to the token owner's
    /// live session if there is one.
    #[instrument(skip(self, authorization, data), fields(thing_id = %id, values = data.len()))]
    pub async fn publish_data(
        &self,
        authorization: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()> {
        self.verify_thing_data(authorization, id, data).await?;

        self.publisher
            .send_broadcast_data(authorization, id, data)
            .await?;

        let email = self.token_claims.get_email(authorization)?;
        match self.session_store.get(&email).await? {
            Some(session_id) if !session_id.is_empty() => {
                self.publisher
                    .send_session_data(authorization, &session_id, id, data)
                    .await?;
                debug!("data forwarded to user session");
            }
            _ => debug!("no open session for token owner"),
        }

        Ok(())
    }

    async fn verify_thing_data(
        &self,
        authorization: &str,
        id: &str,
        data: &[DataValue],
    ) -> DomainResult<()> {
        require_authorization(authorization)?;
        require_id(id)?;
        if data.is_empty() {
            return Err(DomainError::DataNotProvided);
        }

        let thing = self.thing_proxy.get(authorization, id).await?;
        self.rule_engine.validate_data_batch(data, thing.schema())?;
        Ok(())
    }
}

fn require_authorization(authorization: &str) -> DomainResult<()> {
    if authorization.is_empty() {
        return Err(DomainError::AuthorizationNotProvided);
    }
    Ok(())
}

fn require_id(id: &str) -> DomainResult<()> {
    if id.is_empty() {
        return Err(DomainError::IdNotProvided);
    }
    Ok(())
}

/// Thing ids are 1 to 16 hexadecimal digits
fn verify_thing_id(id: &str) -> DomainResult<()> {
    require_id(id)?;
    if id.len() > MAX_THING_ID_LEN {
        return Err(DomainError::InvalidThingId(
            "id length exceeds 16 characters".to_string(),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DomainError::InvalidThingId(
            "id is not in hexadecimal format".to_string(),
        ));
    }
    Ok(())
}

fn error_text<T>(outcome: &DomainResult<T>) -> Option<String> {
    outcome.as_ref().err().map(ToString::to_string)
}

/// Operation error wins over a failure to report it
fn merge<T>(outcome: DomainResult<T>, sent: DomainResult<()>) -> DomainResult<T> {
    match (outcome, sent) {
        (Err(e), Err(send_err)) => {
            error!(error = %send_err, "failed to send response");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(send_err)) => Err(send_err),
        (Ok(value), Ok(())) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockThingEventPublisher;
    use common::domain::{
        MockSessionStore, MockThingProxy, MockTokenClaims, SensorValue, Thing,
    };
    use common::rules::RuleTable;

    const THING_ID: &str = "fbe64efa6c7f717e";

    struct Mocks {
        proxy: MockThingProxy,
        sessions: MockSessionStore,
        claims: MockTokenClaims,
        publisher: MockThingEventPublisher,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                proxy: MockThingProxy::new(),
                sessions: MockSessionStore::new(),
                claims: MockTokenClaims::new(),
                publisher: MockThingEventPublisher::new(),
            }
        }

        fn service(self) -> ThingService {
            ThingService::new(
                Arc::new(self.proxy),
                Arc::new(self.sessions),
                Arc::new(self.claims),
                Arc::new(self.publisher),
                RuleEngine::new(Arc::new(RuleTable::standard())),
            )
        }
    }

    fn motion_thing() -> Thing {
        Thing {
            id: THING_ID.to_string(),
            token: "thing-token".to_string(),
            name: "presence".to_string(),
            schema: Some(vec![SchemaEntry {
                sensor_id: 0,
                value_type: 3,
                unit: 0,
                type_id: 0xFFF0,
                name: "motion".to_string(),
            }]),
        }
    }

    fn bool_data(sensor_id: i32) -> Vec<DataValue> {
        vec![DataValue {
            sensor_id,
            value: SensorValue::Bool(true),
        }]
    }

    #[tokio::test]
    async fn test_register_success() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_create()
            .withf(|auth, id, name| auth == "tok" && id == THING_ID && name == "lamp")
            .times(1)
            .returning(|_, _, _| Ok("thing-token".to_string()));
        mocks
            .publisher
            .expect_send_registered()
            .withf(|id, name, token, error| {
                id == THING_ID && name == "lamp" && token == "thing-token" && error.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = mocks.service().register("tok", THING_ID, "lamp").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_register_invalid_id_reports_error() {
        let mut mocks = Mocks::new();
        mocks.proxy.expect_create().never();
        mocks
            .publisher
            .expect_send_registered()
            .withf(|_, _, token, error| {
                token.is_empty()
                    && error
                        .as_deref()
                        .is_some_and(|e| e.contains("hexadecimal"))
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = mocks.service().register("tok", "not-hex!", "lamp").await;
        assert!(matches!(result, Err(DomainError::InvalidThingId(_))));
    }

    #[tokio::test]
    async fn test_register_id_too_long() {
        let mut mocks = Mocks::new();
        mocks
            .publisher
            .expect_send_registered()
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = mocks
            .service()
            .register("tok", "0123456789abcdef0", "lamp")
            .await;
        assert!(matches!(result, Err(DomainError::InvalidThingId(_))));
    }

    #[tokio::test]
    async fn test_register_publish_failure_surfaces() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_create()
            .returning(|_, _, _| Ok("thing-token".to_string()));
        mocks
            .publisher
            .expect_send_registered()
            .returning(|_, _, _, _| Err(DomainError::PublishError("channel closed".to_string())));

        let result = mocks.service().register("tok", THING_ID, "lamp").await;
        assert!(matches!(result, Err(DomainError::PublishError(_))));
    }

    #[tokio::test]
    async fn test_update_schema_rejected_by_rules() {
        let mut mocks = Mocks::new();
        mocks.proxy.expect_update_schema().never();
        mocks
            .publisher
            .expect_send_schema_updated()
            .withf(|id, schema, error| id == THING_ID && schema.len() == 1 && error.is_some())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let schema = vec![SchemaEntry {
            sensor_id: 0,
            value_type: 1,
            unit: 0,
            type_id: 0xFFF0,
            name: "motion".to_string(),
        }];

        let result = mocks.service().update_schema("tok", THING_ID, &schema).await;
        assert!(matches!(result, Err(DomainError::SchemaValidation(_))));
    }

    #[tokio::test]
    async fn test_update_schema_empty_list() {
        let mut mocks = Mocks::new();
        mocks
            .publisher
            .expect_send_schema_updated()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = mocks.service().update_schema("tok", THING_ID, &[]).await;
        assert!(matches!(result, Err(DomainError::SchemaNotProvided)));
    }

    #[tokio::test]
    async fn test_update_schema_success() {
        let mut mocks = Mocks::new();
        let schema = motion_thing().schema.unwrap();
        mocks
            .proxy
            .expect_update_schema()
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .publisher
            .expect_send_schema_updated()
            .withf(|_, _, error| error.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let result = mocks.service().update_schema("tok", THING_ID, &schema).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_auth_device_wrong_token() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks
            .publisher
            .expect_send_auth_status()
            .withf(|reply, id, authenticated, error| {
                reply.reply_to == "reply-queue" && id == THING_ID && !authenticated && error.is_some()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let reply = ReplyTarget::new("reply-queue", Some("cid".to_string()));
        let result = mocks
            .service()
            .auth_device("tok", THING_ID, "stolen-token", &reply)
            .await;
        assert!(matches!(result, Err(DomainError::ThingForbidden)));
    }

    #[tokio::test]
    async fn test_auth_device_success() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks
            .publisher
            .expect_send_auth_status()
            .withf(|reply, _, authenticated, error| {
                reply.correlation_id.is_none() && *authenticated && error.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let reply = ReplyTarget::new("reply-queue", Some(String::new()));
        let result = mocks
            .service()
            .auth_device("tok", THING_ID, "thing-token", &reply)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_list_devices_error_is_replied() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_list()
            .returning(|_| Err(DomainError::CollaboratorError(anyhow::anyhow!("registry down"))));
        mocks
            .publisher
            .expect_send_device_list()
            .withf(|_, devices, error| {
                devices.is_empty() && error.as_deref().is_some_and(|e| e.contains("registry down"))
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let reply = ReplyTarget::new("reply-queue", None);
        let result = mocks.service().list_devices("tok", &reply).await;
        assert!(matches!(result, Err(DomainError::CollaboratorError(_))));
    }

    #[tokio::test]
    async fn test_request_data_unknown_sensor() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks.publisher.expect_send_request_data().never();

        let result = mocks.service().request_data("tok", THING_ID, &[0, 3]).await;
        assert!(matches!(
            result,
            Err(DomainError::DataValidation(DataValidationError::SensorNotFound(3)))
        ));
    }

    #[tokio::test]
    async fn test_request_data_sent() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks
            .publisher
            .expect_send_request_data()
            .withf(|id, sensor_ids| id == THING_ID && sensor_ids == [0])
            .times(1)
            .returning(|_, _| Ok(()));

        let result = mocks.service().request_data("tok", THING_ID, &[0]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_update_data_type_mismatch() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks.publisher.expect_send_update_data().never();

        let data = vec![DataValue {
            sensor_id: 0,
            value: SensorValue::Int(5),
        }];
        let result = mocks.service().update_data("tok", THING_ID, &data).await;
        assert!(matches!(
            result,
            Err(DomainError::DataValidation(DataValidationError::TypeMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_data_without_schema() {
        let mut mocks = Mocks::new();
        mocks.proxy.expect_get().returning(|_, _| {
            Ok(Thing {
                schema: None,
                ..motion_thing()
            })
        });

        let result = mocks
            .service()
            .update_data("tok", THING_ID, &bool_data(0))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::DataValidation(DataValidationError::NoSchema))
        ));
    }

    #[tokio::test]
    async fn test_publish_data_forwards_to_session() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks
            .publisher
            .expect_send_broadcast_data()
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .claims
            .expect_get_email()
            .withf(|token| token == "tok")
            .returning(|_| Ok("user@example.com".to_string()));
        mocks
            .sessions
            .expect_get()
            .withf(|key| key == "user@example.com")
            .returning(|_| Ok(Some("session-42".to_string())));
        mocks
            .publisher
            .expect_send_session_data()
            .withf(|auth, session_id, id, data| {
                auth == "tok" && session_id == "session-42" && id == THING_ID && data.len() == 1
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = mocks
            .service()
            .publish_data("tok", THING_ID, &bool_data(0))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_publish_data_without_session() {
        let mut mocks = Mocks::new();
        mocks
            .proxy
            .expect_get()
            .returning(|_, _| Ok(motion_thing()));
        mocks
            .publisher
            .expect_send_broadcast_data()
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .claims
            .expect_get_email()
            .returning(|_| Ok("user@example.com".to_string()));
        mocks.sessions.expect_get().returning(|_| Ok(None));
        mocks.publisher.expect_send_session_data().never();

        let result = mocks
            .service()
            .publish_data("tok", THING_ID, &bool_data(0))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_authorization() {
        let mocks = Mocks::new();
        let result = mocks
            .service()
            .update_data("", THING_ID, &bool_data(0))
            .await;
        assert!(matches!(result, Err(DomainError::AuthorizationNotProvided)));
    }
}
