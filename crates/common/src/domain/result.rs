use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Envelope-level rejection raised by the dispatcher before any controller runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unsupported operation: exchange '{exchange}' routing key '{routing_key}'")]
    UnsupportedOperation {
        exchange: String,
        routing_key: String,
    },

    #[error("message headers not provided")]
    MissingHeaders,

    #[error("authorization header not provided")]
    MissingAuthorization,

    #[error("message body not provided for operation {0}")]
    MissingBody(String),

    #[error("reply-to not provided for operation {0}")]
    MissingReplyTo(String),
}

/// Reason a candidate schema entry was refused by the rule engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaValidationError {
    #[error("sensor {sensor_id}: unknown type id {type_id:#06x}")]
    UnknownTypeId { sensor_id: i32, type_id: i32 },

    #[error("sensor {sensor_id}: value type {value_type} not allowed for type id {type_id:#06x}")]
    InvalidValueType {
        sensor_id: i32,
        type_id: i32,
        value_type: i32,
    },

    #[error("sensor {sensor_id}: unit {unit} not allowed for type id {type_id:#06x}")]
    InvalidUnit {
        sensor_id: i32,
        type_id: i32,
        unit: i32,
    },

    #[error("sensor {sensor_id}: name must have between 1 and 30 characters")]
    InvalidName { sensor_id: i32 },
}

/// Reason a telemetry value was refused against a thing's schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataValidationError {
    #[error("thing has no schema")]
    NoSchema,

    #[error("sensor {0} not registered in thing's schema")]
    SensorNotFound(i32),

    #[error("sensor {sensor_id}: {found} value does not match value type {expected}")]
    TypeMismatch {
        sensor_id: i32,
        expected: i32,
        found: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("broker connection error: {0}")]
    ConnectionError(String),

    #[error("broker connection closed unexpectedly: {0}")]
    TransientBrokerError(String),

    #[error("publish error: {0}")]
    PublishError(String),

    #[error("subscribe error: {0}")]
    SubscribeError(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid schema: {0}")]
    SchemaValidation(#[from] SchemaValidationError),

    #[error("invalid data: {0}")]
    DataValidation(#[from] DataValidationError),

    #[error("invalid message body: {0}")]
    InvalidBody(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("authorization token not provided")]
    AuthorizationNotProvided,

    #[error("thing's id not provided")]
    IdNotProvided,

    #[error("invalid thing id: {0}")]
    InvalidThingId(String),

    #[error("thing's schema not provided")]
    SchemaNotProvided,

    #[error("thing's data not provided")]
    DataNotProvided,

    #[error("thing's sensor ids not provided")]
    SensorsNotProvided,

    #[error("thing not found: {0}")]
    ThingNotFound(String),

    #[error("forbidden to authenticate thing")]
    ThingForbidden,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("collaborator error: {0}")]
    CollaboratorError(#[from] anyhow::Error),
}
