use chrono::{DateTime, Utc};
use ckstate_core::api::{StateValidator, ValidationError, ValidationRule};
use serde_json::{Map, Value};

pub(crate) fn as_object<'a>(
    state: &'a Value,
    what: &str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    match state {
        Value::Null => Err(
            ValidationError::new("required", "", format!("{what} state is null"))
                .with_suggestion(format!("Provide a {what} state object")),
        ),
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::new(
            "invalid_type",
            "",
            format!("{what} state must be an object"),
        )),
    }
}

pub(crate) fn non_empty_str<'a>(
    map: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a str, ValidationError> {
    match map.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ValidationError::new("required", field, format!("{field} must not be empty"))
            .with_suggestion(format!("Set {field} to a non-empty string"))),
    }
}

/// Session state: non-empty id, a real creation timestamp, sane disk figures.
pub struct SessionStateValidator;

impl SessionStateValidator {
    fn created_at(map: &Map<String, Value>) -> Result<(), ValidationError> {
        let raw = map.get("created_at").and_then(Value::as_str).ok_or_else(|| {
            ValidationError::new("required", "created_at", "created_at is missing")
                .with_suggestion("Set created_at when the session is created")
        })?;
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
            ValidationError::new("invalid_format", "created_at", format!("not RFC 3339: {e}"))
        })?;
        if parsed.with_timezone(&Utc).timestamp() <= 0 {
            return Err(ValidationError::new(
                "invalid_value",
                "created_at",
                "created_at is the zero timestamp",
            ));
        }
        Ok(())
    }

    fn disk_usage(map: &Map<String, Value>) -> Result<(), ValidationError> {
        let read = |field: &str| -> Result<i64, ValidationError> {
            match map.get(field) {
                None | Some(Value::Null) => Ok(0),
                Some(v) => v.as_i64().ok_or_else(|| {
                    ValidationError::new("invalid_type", field, format!("{field} must be an integer"))
                }),
            }
        };
        let used = read("disk_usage")?;
        let max = read("max_disk_usage")?;
        if used < 0 {
            return Err(ValidationError::new("out_of_range", "disk_usage", "disk_usage is negative"));
        }
        if max < 0 {
            return Err(ValidationError::new(
                "out_of_range",
                "max_disk_usage",
                "max_disk_usage is negative",
            ));
        }
        if max > 0 && used > max {
            return Err(ValidationError::new(
                "quota_exceeded",
                "disk_usage",
                format!("disk_usage {used} exceeds max_disk_usage {max}"),
            )
            .with_suggestion("Clean the workspace or raise the quota"));
        }
        Ok(())
    }
}

impl StateValidator for SessionStateValidator {
    fn validate(&self, state: &Value) -> Result<(), ValidationError> {
        let map = as_object(state, "session")?;
        non_empty_str(map, "session_id")?;
        Self::created_at(map)?;
        Self::disk_usage(map)
    }

    fn rules(&self) -> Vec<ValidationRule> {
        vec![
            ValidationRule::required("session_id", "session_id", "Session ID must be non-empty"),
            ValidationRule::required("created_at", "created_at", "Creation time must be set"),
            ValidationRule::optional("disk_quota", "disk_usage", "Disk usage within quota"),
        ]
    }
}
