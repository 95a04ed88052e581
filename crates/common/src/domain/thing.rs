use serde::{Deserialize, Serialize};

/// Serialization kind codes used by `SchemaEntry::value_type`
pub mod value_type {
    pub const INT: i32 = 1;
    pub const FLOAT: i32 = 2;
    pub const BOOL: i32 = 3;
    pub const RAW: i32 = 4;
}

/// A registered device as known by the thing registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<SchemaEntry>>,
}

impl Thing {
    /// Schema entries, treating an empty list the same as no schema
    pub fn schema(&self) -> Option<&[SchemaEntry]> {
        self.schema.as_deref().filter(|s| !s.is_empty())
    }
}

/// Declares one sensor or actuator of a thing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEntry {
    pub sensor_id: i32,
    pub value_type: i32,
    pub unit: i32,
    pub type_id: i32,
    pub name: String,
}

/// Event configuration of a sensor, stored alongside its schema entry in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub sensor_id: i32,
    #[serde(default)]
    pub change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sec: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_threshold: Option<SensorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<SensorValue>,
}

/// Runtime telemetry value; the variant is fixed when the JSON is decoded.
///
/// Integral JSON numbers decode as `Int`, any other number as `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Raw(String),
}

impl SensorValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Raw(_) => "raw",
        }
    }
}

/// A value reported for (or commanded to) one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    pub sensor_id: i32,
    pub value: SensorValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensor_value_variant_assigned_on_decode() {
        let decode = |v: serde_json::Value| serde_json::from_value::<SensorValue>(v).unwrap();

        assert_eq!(decode(json!(true)), SensorValue::Bool(true));
        assert_eq!(decode(json!(5)), SensorValue::Int(5));
        assert_eq!(decode(json!(-3)), SensorValue::Int(-3));
        assert_eq!(decode(json!(2.5)), SensorValue::Float(2.5));
        assert_eq!(decode(json!("AQID")), SensorValue::Raw("AQID".to_string()));
    }

    #[test]
    fn test_data_value_wire_format() {
        let data: DataValue =
            serde_json::from_value(json!({"sensorId": 0, "value": true})).unwrap();
        assert_eq!(data.sensor_id, 0);
        assert_eq!(data.value, SensorValue::Bool(true));

        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(encoded, json!({"sensorId": 0, "value": true}));
    }

    #[test]
    fn test_thing_with_empty_schema_has_no_schema() {
        let thing = Thing {
            id: "0123456789abcdef".to_string(),
            token: String::new(),
            name: "thing".to_string(),
            schema: Some(vec![]),
        };
        assert!(thing.schema().is_none());
    }
}
