use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::controllers::paste::NewPaste;
use crate::error::AppError;
use crate::models::PasteView;

/// Body of `POST /api/pastes`. Fields are kept loose so that shape errors can
/// be reported per field.
/// An explicit `null` is kept as `Some(Value::Null)`, apart from a missing
/// field.
#[derive(Debug, Deserialize)]
pub struct CreatePaste {
    #[serde(default, deserialize_with = "present")]
    pub content: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub ttl_seconds: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub max_views: Option<Value>,
}

fn present<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl TryFrom<CreatePaste> for NewPaste {
    type Error = AppError;

    fn try_from(body: CreatePaste) -> Result<Self, Self::Error> {
        let content = match body.content {
            Some(Value::String(content)) => content,
            _ => return Err(AppError::validation("content", "must be a non-empty string")),
        };

        Ok(NewPaste {
            content,
            ttl_seconds: integer_field("ttl_seconds", body.ttl_seconds)?,
            max_views: integer_field("max_views", body.max_views)?,
        })
    }
}

/// A missing field is absent; anything present must be an integral number.
/// Integral floats such as `10.0` or `1e3` count as integers.
fn integer_field(field: &'static str, value: Option<Value>) -> Result<Option<i64>, AppError> {
    let invalid = || AppError::validation(field, "must be an integer >= 1");
    match value {
        None => Ok(None),
        Some(Value::Number(number)) => {
            if let Some(n) = number.as_i64() {
                return Ok(Some(n));
            }
            match number.as_f64() {
                Some(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 => {
                    Ok(Some(n as i64))
                }
                _ => Err(invalid()),
            }
        }
        Some(_) => Err(invalid()),
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedPaste {
    pub id: String,
    pub url: String,
    #[serde(serialize_with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PasteBody {
    pub content: String,
    pub remaining_views: Option<i64>,
    #[serde(serialize_with = "iso8601_opt")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<PasteView> for PasteBody {
    fn from(view: PasteView) -> Self {
        PasteBody {
            content: view.content,
            remaining_views: view.remaining_views,
            expires_at: view.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub ok: bool,
}

/// Format an instant as ISO-8601 UTC with millisecond precision.
pub fn to_iso8601(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn iso8601<S: serde::Serializer>(instant: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_iso8601(instant))
}

fn iso8601_opt<S: serde::Serializer>(
    instant: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match instant {
        Some(instant) => iso8601(instant, s),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn parse(body: Value) -> Result<NewPaste, AppError> {
        NewPaste::try_from(serde_json::from_value::<CreatePaste>(body).unwrap())
    }

    #[test]
    fn accepts_well_formed_body() {
        let paste = parse(json!({"content": "hi", "ttl_seconds": 60, "max_views": 3})).unwrap();
        assert_eq!(paste.content, "hi");
        assert_eq!(paste.ttl_seconds, Some(60));
        assert_eq!(paste.max_views, Some(3));

        let paste = parse(json!({"content": "hi"})).unwrap();
        assert_eq!(paste.ttl_seconds, None);
        assert_eq!(paste.max_views, None);

        let paste = parse(json!({"content": "hi", "ttl_seconds": 10.0, "max_views": 1e3})).unwrap();
        assert_eq!(paste.ttl_seconds, Some(10));
        assert_eq!(paste.max_views, Some(1000));
    }

    #[test]
    fn rejects_wrong_shapes() {
        for (body, field) in [
            (json!({}), "content"),
            (json!({"content": 12}), "content"),
            (json!({"content": "hi", "ttl_seconds": 1.5}), "ttl_seconds"),
            (json!({"content": "hi", "ttl_seconds": "10"}), "ttl_seconds"),
            (json!({"content": "hi", "max_views": [1]}), "max_views"),
            (json!({"content": null}), "content"),
            (json!({"content": "hi", "ttl_seconds": null}), "ttl_seconds"),
            (json!({"content": "hi", "max_views": null}), "max_views"),
            (json!({"content": "hi", "ttl_seconds": 1e300}), "ttl_seconds"),
        ] {
            match parse(body) {
                Err(AppError::Validation { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected error on {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn serializes_instants_like_iso_strings() {
        let body = PasteBody {
            content: "hi".into(),
            remaining_views: None,
            expires_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({
                "content": "hi",
                "remaining_views": null,
                "expires_at": "2024-01-02T03:04:05.000Z",
            })
        );
    }
}
