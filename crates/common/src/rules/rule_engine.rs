use crate::domain::{
    value_type, DataValidationError, DataValue, SchemaEntry, SchemaValidationError, SensorValue,
};
use crate::rules::RuleTable;
use std::sync::Arc;

const MAX_NAME_CHARS: usize = 30;

/// Stateless validator of thing schemas and telemetry values.
///
/// Holds only a shared reference to the immutable rule table, so clones are
/// cheap and calls are safe from any number of tasks.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    table: Arc<RuleTable>,
}

impl RuleEngine {
    pub fn new(table: Arc<RuleTable>) -> Self {
        Self { table }
    }

    /// Validate a whole schema; the first invalid entry rejects the batch.
    pub fn validate_schema(&self, schema: &[SchemaEntry]) -> Result<(), SchemaValidationError> {
        schema
            .iter()
            .try_for_each(|entry| self.validate_schema_entry(entry))
    }

    pub fn validate_schema_entry(&self, entry: &SchemaEntry) -> Result<(), SchemaValidationError> {
        let rule = self
            .table
            .get(entry.type_id)
            .ok_or(SchemaValidationError::UnknownTypeId {
                sensor_id: entry.sensor_id,
                type_id: entry.type_id,
            })?;

        if !rule.value_type.permits(entry.value_type) {
            return Err(SchemaValidationError::InvalidValueType {
                sensor_id: entry.sensor_id,
                type_id: entry.type_id,
                value_type: entry.value_type,
            });
        }

        if !rule.unit.permits(entry.unit) {
            return Err(SchemaValidationError::InvalidUnit {
                sensor_id: entry.sensor_id,
                type_id: entry.type_id,
                unit: entry.unit,
            });
        }

        let name_len = entry.name.chars().count();
        if name_len == 0 || name_len > MAX_NAME_CHARS {
            return Err(SchemaValidationError::InvalidName {
                sensor_id: entry.sensor_id,
            });
        }

        Ok(())
    }

    /// Validate one value against the thing's current schema.
    ///
    /// `None` and an empty list both mean the thing has no schema.
    pub fn validate_data(
        &self,
        data: &DataValue,
        schema: Option<&[SchemaEntry]>,
    ) -> Result<(), DataValidationError> {
        let schema = schema
            .filter(|s| !s.is_empty())
            .ok_or(DataValidationError::NoSchema)?;

        let entry = schema
            .iter()
            .find(|entry| entry.sensor_id == data.sensor_id)
            .ok_or(DataValidationError::SensorNotFound(data.sensor_id))?;

        if value_matches(&data.value, entry.value_type) {
            Ok(())
        } else {
            Err(DataValidationError::TypeMismatch {
                sensor_id: data.sensor_id,
                expected: entry.value_type,
                found: data.value.kind(),
            })
        }
    }

    /// Validate a batch of values; stops at the first rejection.
    pub fn validate_data_batch(
        &self,
        data: &[DataValue],
        schema: Option<&[SchemaEntry]>,
    ) -> Result<(), DataValidationError> {
        data.iter()
            .try_for_each(|value| self.validate_data(value, schema))
    }
}

/// An integral JSON number is also a legal float reading, and a float with
/// no fractional part (`5.0`) is a legal int reading within the i32 range.
fn value_matches(value: &SensorValue, expected: i32) -> bool {
    match value {
        SensorValue::Int(v) => match expected {
            value_type::INT => i32::try_from(*v).is_ok(),
            value_type::FLOAT => true,
            _ => false,
        },
        SensorValue::Float(v) => match expected {
            value_type::FLOAT => true,
            value_type::INT => {
                v.fract() == 0.0 && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(v)
            }
            _ => false,
        },
        SensorValue::Bool(_) => expected == value_type::BOOL,
        SensorValue::Raw(_) => expected == value_type::RAW,
    }
}
