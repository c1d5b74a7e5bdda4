// src/realtime/event.rs
//
// Wire event normalization.
//
// The backend emits two frame shapes: `{resource, action, payload}` and
// `{type: "resource.action", payload}`. Both are normalized into one tagged
// RemoteEvent here, at the ingestion boundary; nothing downstream knows two
// shapes ever existed.

use serde_json::Value;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl EventAction {
    fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            other => Err(AppError::InvalidEvent(format!("unknown action '{other}'"))),
        }
    }
}

/// One normalized realtime event. Events are not ordered, not exactly-once,
/// and may reference ids that were never fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub resource: String,
    pub action: EventAction,
    pub payload: Value,
}

impl RemoteEvent {
    pub fn parse(frame: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(frame)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> AppResult<Self> {
        let Value::Object(fields) = value else {
            return Err(AppError::InvalidEvent("frame is not a JSON object".to_string()));
        };

        let payload = fields.get("payload").cloned().unwrap_or(Value::Null);

        let resource_field = fields.get("resource").and_then(Value::as_str);
        let action_field = fields.get("action").and_then(Value::as_str);
        if let (Some(resource), Some(action)) = (resource_field, action_field) {
            return Ok(Self {
                resource: resource.to_string(),
                action: EventAction::parse(action)?,
                payload,
            });
        }

        if let Some(tag) = fields.get("type").and_then(Value::as_str) {
            // "resource.action", split on the first dot.
            let Some((resource, action)) = tag.split_once('.') else {
                return Err(AppError::InvalidEvent(format!("untagged type '{tag}'")));
            };
            return Ok(Self {
                resource: resource.to_string(),
                action: EventAction::parse(action)?,
                payload,
            });
        }

        Err(AppError::InvalidEvent(
            "frame has neither resource/action nor type".to_string(),
        ))
    }

    /// The id carried in the payload, when present.
    pub fn payload_id(&self) -> Option<i64> {
        self.payload.get("id").and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_shape_parses() {
        let event =
            RemoteEvent::parse(r#"{"resource":"customer","action":"deleted","payload":{"id":7}}"#)
                .unwrap();
        assert_eq!(event.resource, "customer");
        assert_eq!(event.action, EventAction::Deleted);
        assert_eq!(event.payload_id(), Some(7));
    }

    #[test]
    fn test_typed_shape_parses() {
        let event =
            RemoteEvent::parse(r#"{"type":"sale.created","payload":{"id":12,"total":99.5}}"#)
                .unwrap();
        assert_eq!(event.resource, "sale");
        assert_eq!(event.action, EventAction::Created);
        assert_eq!(event.payload_id(), Some(12));
    }

    #[test]
    fn test_type_splits_on_first_dot_only() {
        let event = RemoteEvent::parse(r#"{"type":"sale.updated","payload":{"id":1}}"#).unwrap();
        assert_eq!(event.action, EventAction::Updated);

        // Extra dots belong to the action and fail the action parse.
        assert!(RemoteEvent::parse(r#"{"type":"sale.updated.v2","payload":{}}"#).is_err());
    }

    #[test]
    fn test_both_shapes_normalize_identically() {
        let flat =
            RemoteEvent::parse(r#"{"resource":"product","action":"updated","payload":{"id":3}}"#)
                .unwrap();
        let typed =
            RemoteEvent::parse(r#"{"type":"product.updated","payload":{"id":3}}"#).unwrap();
        assert_eq!(flat, typed);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(RemoteEvent::parse("not json at all").is_err());
        assert!(RemoteEvent::parse("[1,2,3]").is_err());
        assert!(RemoteEvent::parse(r#"{"payload":{"id":1}}"#).is_err());
        assert!(RemoteEvent::parse(r#"{"resource":"x","action":"renamed","payload":{}}"#).is_err());
    }

    #[test]
    fn test_missing_payload_id_is_none() {
        let event = RemoteEvent::from_value(json!({
            "resource": "customer",
            "action": "created",
            "payload": {"name": "no id here"}
        }))
        .unwrap();
        assert_eq!(event.payload_id(), None);
    }
}
