use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;

/// Body of a push response. Records named here were rejected by server
/// validation; everything else in the batch was accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPushResponse {
    #[serde(default)]
    pub errors: Vec<ValidationErrors>,
}

impl DataPushResponse {
    pub fn invalid_ids(&self) -> HashSet<Uuid> {
        self.errors.iter().map(|e| e.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub id: Uuid,
    #[serde(default)]
    pub schema: Vec<String>,
    /// Per-field messages, keyed by field name.
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataPullResponse<P> {
    pub payloads: Vec<P>,
    pub process_token: Option<String>,
}

impl<P: DeserializeOwned> DataPullResponse<P> {
    /// Pull responses wrap the list under the entity's resource key, next to
    /// the token to send on the following request. Older endpoints name the
    /// token `processed_since`.
    pub fn from_value(resource: &str, value: Value) -> Result<Self, AppError> {
        let Value::Object(mut object) = value else {
            return Err(AppError::Unexpected(format!(
                "{} pull response is not a JSON object",
                resource
            )));
        };

        let payloads = match object.remove(resource) {
            Some(list) => serde_json::from_value::<Vec<P>>(list)?,
            None => Vec::new(),
        };

        let process_token = object
            .remove("process_token")
            .or_else(|| object.remove("processed_since"))
            .and_then(token_to_string);

        Ok(Self {
            payloads,
            process_token,
        })
    }
}

fn token_to_string(token: Value) -> Option<String> {
    match token {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_invalid_ids_from_push_errors() {
        let id = Uuid::new_v4();
        let response: DataPushResponse = serde_json::from_value(json!({
            "errors": [{ "id": id, "schema": ["age is missing"], "date_of_birth": ["is invalid"] }]
        }))
        .unwrap();

        assert!(response.invalid_ids().contains(&id));
        assert_eq!(response.errors[0].fields["date_of_birth"], json!(["is invalid"]));

        let empty: DataPushResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.errors.is_empty());
    }

    #[test]
    fn reads_payloads_and_either_token_name() {
        let response = DataPullResponse::<Value>::from_value(
            "facilities",
            json!({ "facilities": [{ "id": 1 }], "process_token": "abc" }),
        )
        .unwrap();
        assert_eq!(response.payloads.len(), 1);
        assert_eq!(response.process_token.as_deref(), Some("abc"));

        let legacy = DataPullResponse::<Value>::from_value(
            "facilities",
            json!({ "facilities": [], "processed_since": "2024-01-01T00:00:00Z" }),
        )
        .unwrap();
        assert_eq!(legacy.process_token.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn rejects_non_object_bodies() {
        let result = DataPullResponse::<Value>::from_value("patients", json!([]));
        assert!(matches!(result, Err(AppError::Unexpected(_))));
    }
}
