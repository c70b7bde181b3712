//! Redacted record views handed to the dialogue loop.

use serde_json::{Map, Value, json};

use crate::core::types::AccessLevel;
use crate::record::Record;
use crate::scenario::Scenario;

/// Record facts visible at `access`.
///
/// The secret field is never included. Sensitive fields appear only once the
/// session is verified.
pub fn record_view(scenario: &Scenario, record: &Record, access: AccessLevel) -> Value {
    let fields: Map<String, Value> = record
        .fields
        .iter()
        .filter(|(name, _)| !scenario.is_secret(name))
        .filter(|(name, _)| access >= AccessLevel::Verified || !scenario.is_sensitive(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    json!({
        "key": record.key,
        "status": record.status,
        "outcome": record.outcome,
        "fields": fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{case_record, fraud_scenario};

    #[test]
    fn unverified_view_hides_secret_and_sensitive_fields() {
        let scenario = fraud_scenario();
        let view = record_view(
            &scenario,
            &case_record("C-100", "blue"),
            AccessLevel::Unverified,
        );
        let fields = view["fields"].as_object().expect("fields");
        assert!(fields.contains_key("customer_name"));
        assert!(fields.contains_key("security_question"));
        assert!(!fields.contains_key("security_answer"));
        for sensitive in &scenario.sensitive_fields {
            assert!(!fields.contains_key(sensitive), "{sensitive} leaked");
        }
    }

    #[test]
    fn verified_view_discloses_sensitive_but_not_secret() {
        let scenario = fraud_scenario();
        let view = record_view(
            &scenario,
            &case_record("C-100", "blue"),
            AccessLevel::Verified,
        );
        let fields = view["fields"].as_object().expect("fields");
        assert_eq!(fields["merchant"], "ABC Electronics");
        assert_eq!(fields["card_ending"], "4821");
        assert!(!fields.contains_key("security_answer"));
        assert_eq!(view["key"], "C-100");
    }
}
