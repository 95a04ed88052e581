use common::domain::{DataValue, DomainError, DomainResult, SchemaEntry};
use common::garde::validate_request;
use garde::Validate;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Decode a JSON body and run its garde rules
pub fn parse_request<T>(body: &[u8]) -> DomainResult<T>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    let request: T =
        serde_json::from_slice(body).map_err(|e| DomainError::InvalidBody(e.to_string()))?;
    validate_request(&request)?;
    Ok(request)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub id: String,
    #[serde(default)]
    #[garde(skip)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct UnregisterRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub id: String,
}

/// Schema list emptiness is checked by the service so the rejection is
/// reported back on `schema.updated`.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct UpdateSchemaRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub id: String,
    #[serde(default)]
    #[garde(skip)]
    pub schema: Vec<SchemaEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct AuthDeviceRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub id: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestDataRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub id: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub sensor_ids: Vec<i32>,
}

/// Body of both `data.update` and `data.sent` messages
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct DataRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub id: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub data: Vec<DataValue>,
}
