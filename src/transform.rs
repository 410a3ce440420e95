use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// One upstream record. The schema is open, so rows stay dynamic.
pub type ClientRow = Map<String, Value>;

/// Pulls the row list out of whichever envelope the API used.
///
/// Arrays are taken as-is, objects are searched for a `results` then a `data`
/// list, and any other object is treated as a single row. Non-object elements
/// are dropped. Anything else yields no rows.
pub fn normalize_rows(payload: Value) -> Vec<ClientRow> {
    match payload {
        Value::Array(items) => only_objects(items),
        Value::Object(mut envelope) => {
            for key in ["results", "data"] {
                if matches!(envelope.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = envelope.remove(key) {
                        return only_objects(items);
                    }
                }
            }
            vec![envelope]
        }
        other => {
            debug!("Unrecognized payload shape, treating as empty: {}", kind(&other));
            Vec::new()
        }
    }
}

fn only_objects(items: Vec<Value>) -> Vec<ClientRow> {
    let total = items.len();
    let rows: Vec<ClientRow> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect();

    if rows.len() != total {
        debug!("Dropped {} non-object elements", total - rows.len());
    }
    rows
}

/// Collects the distinct, trimmed identifiers found under `field`.
pub fn extract_accounts(rows: &[ClientRow], field: &str) -> BTreeSet<String> {
    rows.iter().filter_map(|row| account_id(row, field)).collect()
}

/// The identifier of one row, or `None` when the field is absent or null.
pub fn account_id(row: &ClientRow, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::Null => None,
        value => Some(scalar_text(value).trim().to_string()),
    }
}

/// Plain text form of a JSON value: strings unquoted, null empty, compound
/// values as compact JSON.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(rows: &[ClientRow]) -> Vec<String> {
        rows.iter().map(|r| r["client_account"].to_string()).collect()
    }

    #[test]
    fn test_normalize_array() {
        let rows = normalize_rows(json!([{"client_account": 1}, "junk", 7, {"client_account": 2}]));
        assert_eq!(ids(&rows), vec!["1", "2"]);
    }

    #[test]
    fn test_normalize_results_envelope() {
        let rows = normalize_rows(json!({
            "count": 2,
            "next": null,
            "results": [{"client_account": 1}, null, {"client_account": 2}]
        }));
        assert_eq!(ids(&rows), vec!["1", "2"]);
    }

    #[test]
    fn test_normalize_data_envelope() {
        let rows = normalize_rows(json!({"data": [{"client_account": 3}]}));
        assert_eq!(ids(&rows), vec!["3"]);
    }

    #[test]
    fn test_results_checked_before_data() {
        let rows = normalize_rows(json!({
            "results": [{"client_account": 1}],
            "data": [{"client_account": 2}]
        }));
        assert_eq!(ids(&rows), vec!["1"]);
    }

    #[test]
    fn test_non_list_results_falls_back_to_single_row() {
        let payload = json!({"results": "none", "client_account": 9});
        let rows = normalize_rows(payload.clone());
        assert_eq!(rows.len(), 1);
        assert_eq!(Value::Object(rows[0].clone()), payload);
    }

    #[test]
    fn test_bare_object_is_one_row() {
        let rows = normalize_rows(json!({"client_account": "42", "country": "TH"}));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["country"], json!("TH"));
    }

    #[test]
    fn test_unrecognized_shapes_are_empty() {
        for payload in [json!(null), json!("text"), json!(12), json!(true)] {
            assert!(normalize_rows(payload).is_empty());
        }
    }

    #[test]
    fn test_extract_accounts_trims_and_dedupes() {
        let rows = normalize_rows(json!([
            {"client_account": " 100 "},
            {"client_account": "100"},
            {"client_account": 200},
            {"client_account": null},
            {"other": "x"}
        ]));

        let accounts = extract_accounts(&rows, "client_account");
        let expected: BTreeSet<String> = ["100", "200"].iter().map(|s| s.to_string()).collect();
        assert_eq!(accounts, expected);
    }

    #[test]
    fn test_extract_accounts_custom_field() {
        let rows = normalize_rows(json!([{"uid": "a"}, {"client_account": "b"}]));
        let accounts = extract_accounts(&rows, "uid");
        assert_eq!(accounts.into_iter().collect::<Vec<_>>(), vec!["a".to_string()]);
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!(null)), "");
        assert_eq!(scalar_text(&json!("a b")), "a b");
        assert_eq!(scalar_text(&json!(1.5)), "1.5");
        assert_eq!(scalar_text(&json!(false)), "false");
        assert_eq!(scalar_text(&json!([1, 2])), "[1,2]");
    }
}
