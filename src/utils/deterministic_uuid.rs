//! Deterministic UUID generation
//!
//! Override identifiers are derived from their scope and target week so that
//! recreating the same override yields the same id. A duplicate create is
//! then detected as a conflict instead of producing a second record.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use uuid::Uuid;

/// Generate a deterministic UUID based on displayable inputs
///
/// The same inputs in the same order always produce the same UUID, which is
/// what keeps override identity stable across replicas and restarts.
pub fn generate_deterministic_uuid(inputs: &[&dyn std::fmt::Display]) -> Uuid {
    let mut hasher = DefaultHasher::new();

    for input in inputs {
        input.to_string().hash(&mut hasher);
    }

    let hash = hasher.finish();

    // DefaultHasher produces u64; mirror it into both halves of the u128
    let uuid_bits = ((hash as u128) << 64) | (hash as u128);
    Uuid::from_u128(uuid_bits)
}

/// Deterministic id for a weekly override, derived from its scope key and
/// the Monday of its target week
pub fn override_uuid(scope_key: &str, week_start: NaiveDate) -> Uuid {
    generate_deterministic_uuid(&[&scope_key, &week_start.format("%Y-%m-%d")])
}

/// Deterministic id for a virtual schedule entry synthesized from a
/// create-type override
pub fn virtual_entry_uuid(override_id: &Uuid) -> Uuid {
    generate_deterministic_uuid(&[&"virtual-entry", &override_id.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_uuid_consistency() {
        let week = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();

        let uuid1 = override_uuid("program:6ba7b810-9dad-11d1-80b4-00c04fd430c8", week);
        let uuid2 = override_uuid("program:6ba7b810-9dad-11d1-80b4-00c04fd430c8", week);

        assert_eq!(uuid1, uuid2);
    }

    #[test]
    fn test_different_weeks_different_uuids() {
        let week1 = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let week2 = NaiveDate::from_ymd_opt(2026, 8, 31).unwrap();

        let uuid1 = override_uuid("schedule:abc", week1);
        let uuid2 = override_uuid("schedule:abc", week2);

        assert_ne!(uuid1, uuid2);
    }

    #[test]
    fn test_order_matters() {
        let inputs1: &[&dyn std::fmt::Display] = &[&"a", &"b"];
        let inputs2: &[&dyn std::fmt::Display] = &[&"b", &"a"];

        assert_ne!(
            generate_deterministic_uuid(inputs1),
            generate_deterministic_uuid(inputs2)
        );
    }
}
