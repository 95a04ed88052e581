use crate::domain::value_type;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Values a rule accepts for one schema field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowed {
    Exact(i32),
    Range(RangeInclusive<i32>),
}

impl Allowed {
    pub fn permits(&self, value: i32) -> bool {
        match self {
            Self::Exact(expected) => *expected == value,
            Self::Range(range) => range.contains(&value),
        }
    }
}

/// Accepted value type and unit for one type id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub value_type: Allowed,
    pub unit: Allowed,
}

impl Rule {
    fn new(value_type: Allowed, unit: Allowed) -> Self {
        Self { value_type, unit }
    }
}

/// Immutable mapping from type id to its rule.
///
/// Type ids absent from the table are always invalid.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<i32, Rule>,
}

impl RuleTable {
    pub fn new(rules: impl IntoIterator<Item = (i32, Rule)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// The KNoT unit/type/value table
    pub fn standard() -> Self {
        use value_type::{BOOL, FLOAT, INT, RAW};
        use Allowed::{Exact, Range};

        Self::new([
            (0x0000, Rule::new(Exact(RAW), Exact(0))),      // NONE
            (0x0001, Rule::new(Exact(INT), Range(1..=3))),  // VOLTAGE
            (0x0002, Rule::new(Exact(INT), Range(1..=2))),  // CURRENT
            (0x0003, Rule::new(Exact(INT), Exact(1))),      // RESISTANCE
            (0x0004, Rule::new(Exact(INT), Range(1..=3))),  // POWER
            (0x0005, Rule::new(Exact(INT), Range(1..=3))),  // TEMPERATURE
            (0x0006, Rule::new(Exact(INT), Exact(1))),      // RELATIVE_HUMIDITY
            (0x0007, Rule::new(Exact(INT), Range(1..=3))),  // LUMINOSITY
            (0x0008, Rule::new(Exact(INT), Range(1..=3))),  // TIME
            (0x0009, Rule::new(Exact(INT), Range(1..=4))),  // MASS
            (0x000A, Rule::new(Exact(INT), Range(1..=3))),  // PRESSURE
            (0x000B, Rule::new(Exact(INT), Range(1..=4))),  // DISTANCE
            (0x000C, Rule::new(Exact(FLOAT), Range(1..=2))), // ANGLE
            (0x000D, Rule::new(Exact(FLOAT), Range(1..=4))), // VOLUME
            (0x000E, Rule::new(Exact(FLOAT), Range(1..=3))), // AREA
            (0x000F, Rule::new(Exact(FLOAT), Exact(1))),    // RAIN
            (0x0010, Rule::new(Exact(FLOAT), Exact(1))),    // DENSITY
            (0x0011, Rule::new(Exact(FLOAT), Exact(1))),    // LATITUDE
            (0x0012, Rule::new(Exact(FLOAT), Exact(1))),    // LONGITUDE
            (0x0013, Rule::new(Exact(INT), Range(1..=4))),  // SPEED
            (0x0014, Rule::new(Exact(FLOAT), Range(1..=6))), // VOLUME_FLOW
            (0x0015, Rule::new(Exact(INT), Range(1..=6))),  // ENERGY
            (0xFF10, Rule::new(Exact(INT), Exact(0))),      // ANALOG
            (0xFFF0, Rule::new(Exact(BOOL), Exact(0))),     // PRESENCE
            (0xFFF1, Rule::new(Exact(BOOL), Exact(0))),     // SWITCH
            (0xFFF2, Rule::new(Exact(RAW), Exact(0))),      // COMMAND
        ])
    }

    pub fn get(&self, type_id: i32) -> Option<&Rule> {
        self.rules.get(&type_id)
    }

    pub fn contains(&self, type_id: i32) -> bool {
        self.rules.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_exact() {
        assert!(Allowed::Exact(3).permits(3));
        assert!(!Allowed::Exact(3).permits(1));
    }

    #[test]
    fn test_allowed_range_is_inclusive() {
        let allowed = Allowed::Range(1..=3);
        assert!(allowed.permits(1));
        assert!(allowed.permits(3));
        assert!(!allowed.permits(0));
        assert!(!allowed.permits(4));
    }

    #[test]
    fn test_standard_table_contents() {
        let table = RuleTable::standard();
        assert_eq!(table.len(), 26);

        let presence = table.get(0xFFF0).unwrap();
        assert_eq!(presence.value_type, Allowed::Exact(value_type::BOOL));
        assert_eq!(presence.unit, Allowed::Exact(0));

        // 0xFFFF marks an invalid sensor type and is never accepted
        assert!(!table.contains(0xFFFF));
        assert!(!table.contains(0x0016));
    }

    #[test]
    fn test_high_numbered_generic_types_present() {
        let table = RuleTable::standard();

        for type_id in 0x0010..=0x0015 {
            assert!(table.contains(type_id), "type id {type_id:#06x} missing");
        }
        let energy = table.get(0x0015).unwrap();
        assert_eq!(energy.value_type, Allowed::Exact(value_type::INT));
        assert_eq!(energy.unit, Allowed::Range(1..=6));
    }
}
