/// Required-field validation
/// Decides which of a capability's required fields a candidate map actually
/// carries. Pure: no I/O, no logging.

use serde_json::{Map, Value};

/// Which required fields are present in a candidate, and which are missing.
/// Both lists follow the order the fields were required in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractionResult {
    pub present: Vec<(String, Value)>,
    pub missing: Vec<String>,
}

impl ExtractionResult {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.present
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Present fields as a JSON object, ready to hand to a handler
    pub fn into_fields(self) -> Map<String, Value> {
        self.present.into_iter().collect()
    }
}

/// A value counts as present iff it is non-null and non-empty
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Split `required` into present and missing against `candidate`.
/// `missing` is exactly `required - present`, duplicates collapsed.
pub fn validate<S: AsRef<str>>(required: &[S], candidate: &Map<String, Value>) -> ExtractionResult {
    let mut result = ExtractionResult::default();

    for name in required {
        let name = name.as_ref();
        let seen = result.missing.iter().any(|m| m == name)
            || result.present.iter().any(|(p, _)| p == name);
        if seen {
            continue;
        }

        match candidate.get(name) {
            Some(value) if is_present(value) => result.present.push((name.to_string(), value.clone())),
            _ => result.missing.push(name.to_string()),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOTEL_FIELDS: [&str; 4] = ["query", "check_in_date", "check_out_date", "adults"];

    fn candidate(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_all_fields_present() {
        let input = candidate(json!({
            "query": "Berlin",
            "check_in_date": "2025-08-01",
            "check_out_date": "2025-08-03",
            "adults": "2"
        }));

        let result = validate(&HOTEL_FIELDS, &input);
        assert!(result.is_complete());
        assert_eq!(result.present.len(), 4);
        assert_eq!(result.value("adults"), Some(&json!("2")));
    }

    #[test]
    fn test_missing_fields_keep_declared_order() {
        let input = candidate(json!({"query": "Berlin", "check_in_date": "2025-08-01"}));

        let result = validate(&HOTEL_FIELDS, &input);
        assert_eq!(result.missing, vec!["check_out_date", "adults"]);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let input = candidate(json!({
            "query": "   ",
            "check_in_date": null,
            "check_out_date": [],
            "adults": {}
        }));

        let result = validate(&HOTEL_FIELDS, &input);
        assert_eq!(result.missing, HOTEL_FIELDS.to_vec());
        assert!(result.present.is_empty());
    }

    #[test]
    fn test_numbers_and_booleans_are_present() {
        let input = candidate(json!({"adults": 2, "vip": false}));
        let result = validate(&["adults", "vip"], &input);
        assert!(result.is_complete());
    }

    #[test]
    fn test_duplicate_required_names_collapse() {
        let input = candidate(json!({"query": "Berlin"}));
        let result = validate(&["adults", "query", "adults", "query"], &input);
        assert_eq!(result.missing, vec!["adults"]);
        assert_eq!(result.present.len(), 1);
    }

    #[test]
    fn test_extra_candidate_fields_are_ignored() {
        let input = candidate(json!({"query": "Berlin", "currency": "EUR"}));
        let result = validate(&["query"], &input);
        assert!(result.is_complete());
        assert!(!result.into_fields().contains_key("currency"));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let input = candidate(json!({"query": "Berlin", "adults": ""}));
        let first = validate(&HOTEL_FIELDS, &input);
        let second = validate(&HOTEL_FIELDS, &input);
        assert_eq!(first, second);
    }
}
