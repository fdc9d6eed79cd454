//! The `/io` endpoint: wrap the request into an envelope, run one backend
//! exchange and shape the autorouter's reply for the browser-side client.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::backend::BackendError;
use crate::AppState;

/// Header carrying the client's relay session identifier.
pub const SESSION_HEADER: &str = "x-autoroute-session";

/// Reply fields passed through when the autorouter sends no `cmds`.
const PASSTHROUGH_FIELDS: [&str; 3] = ["version", "provider", "error"];

#[derive(Debug, Default, Deserialize)]
pub struct IoQuery {
    /// Present at all means set, whatever the value.
    noreply: Option<String>,
}

/// `{session, noreply?, cmds?}`. `cmds` is only included when the body is a
/// JSON object or array.
pub fn build_envelope(session: &str, noreply: bool, body: &[u8]) -> Value {
    let mut envelope = Map::new();
    envelope.insert("session".into(), Value::String(session.to_string()));
    if noreply {
        envelope.insert("noreply".into(), Value::Bool(true));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(cmds @ (Value::Object(_) | Value::Array(_))) => {
            envelope.insert("cmds".into(), cmds);
        }
        Ok(_) | Err(_) => {
            if !body.is_empty() {
                debug!(bytes = body.len(), "request body is not a command list; sent without cmds");
            }
        }
    }
    Value::Object(envelope)
}

/// Forward `cmds` verbatim when it is an object or array; otherwise keep
/// only the passthrough fields of the reply object.
pub fn shape_reply(raw: &[u8]) -> Value {
    let reply = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(reply)) => reply,
        Ok(Value::Array(_)) => return Value::Object(Map::new()),
        Ok(_) | Err(_) => return error_value("cannot parse JSON"),
    };
    match reply.get("cmds") {
        Some(cmds @ (Value::Object(_) | Value::Array(_))) => cmds.clone(),
        _ => {
            let kept = PASSTHROUGH_FIELDS
                .iter()
                .filter_map(|key| {
                    reply
                        .get(*key)
                        .filter(|value| !value.is_null())
                        .map(|value| (key.to_string(), value.clone()))
                })
                .collect();
            Value::Object(kept)
        }
    }
}

/// A receive timeout means "nothing yet" and becomes `null`.
pub fn shape_error(err: &BackendError) -> Value {
    match err {
        BackendError::Timeout => Value::Null,
        BackendError::Io { .. } => error_value(&err.to_string()),
    }
}

fn error_value(message: &str) -> Value {
    let mut object = Map::new();
    object.insert("error".into(), Value::String(message.to_string()));
    Value::Object(object)
}

fn json_response(value: &Value) -> Response {
    (
        [(header::CONTENT_TYPE, "text/json")],
        format!("{value}\n"),
    )
        .into_response()
}

pub async fn io_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IoQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(session) = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
    else {
        counter!("autoroute_relay_requests_total", 1, "outcome" => "unauthorized");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let noreply = query.noreply.is_some();
    let envelope = build_envelope(&session, noreply, &body);
    let request = envelope.to_string().into_bytes();

    let backend = state.backend.clone();
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || backend.exchange(&request)).await;
    histogram!(
        "autoroute_relay_exchange_seconds",
        started.elapsed().as_secs_f64()
    );

    let reply = match result {
        Ok(Ok(raw)) => {
            counter!("autoroute_relay_requests_total", 1, "outcome" => "reply");
            shape_reply(&raw)
        }
        Ok(Err(err)) => {
            let outcome = match err {
                BackendError::Timeout => "timeout",
                BackendError::Io { .. } => "error",
            };
            counter!("autoroute_relay_requests_total", 1, "outcome" => outcome);
            if outcome == "error" {
                warn!(session = %session, error = %err, "autorouter exchange failed");
            }
            shape_error(&err)
        }
        Err(err) => {
            warn!(error = %err, "backend exchange task failed");
            counter!("autoroute_relay_requests_total", 1, "outcome" => "panic");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    json_response(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;
    use serde_json::json;

    #[test]
    fn envelope_includes_structured_bodies_only() {
        assert_eq!(
            build_envelope("abc", true, br#"[{"cmdname":"stop"}]"#),
            json!({"session": "abc", "noreply": true, "cmds": [{"cmdname": "stop"}]})
        );
        assert_eq!(build_envelope("abc", false, b""), json!({"session": "abc"}));
        assert_eq!(
            build_envelope("abc", false, b"\"just a string\""),
            json!({"session": "abc"})
        );
        assert_eq!(build_envelope("abc", false, b"{oops"), json!({"session": "abc"}));
    }

    #[test]
    fn reply_cmds_are_forwarded_verbatim() {
        let raw = br#"{"cmds":[{"cmdname":"levels","base":50}],"version":"1"}"#;
        assert_eq!(
            shape_reply(raw),
            json!([{"cmdname": "levels", "base": 50}])
        );
    }

    #[test]
    fn reply_without_cmds_keeps_allow_list() {
        let raw = br#"{"version":"2.0","provider":"cfmu","secret":"x","cmds":"nope"}"#;
        assert_eq!(
            shape_reply(raw),
            json!({"version": "2.0", "provider": "cfmu"})
        );
        assert_eq!(shape_reply(br#"{"error":"busy"}"#), json!({"error": "busy"}));
        assert_eq!(shape_reply(b"{}"), json!({}));
    }

    #[test]
    fn unparseable_reply_is_an_error() {
        assert_eq!(
            shape_reply(b"garbage"),
            json!({"error": "cannot parse JSON"})
        );
        assert_eq!(shape_reply(b"42"), json!({"error": "cannot parse JSON"}));
    }

    #[test]
    fn timeout_becomes_null() {
        assert_eq!(shape_error(&BackendError::Timeout), Value::Null);
        let err = BackendError::Io {
            stage: "send",
            source: std::io::Error::from_raw_os_error(Errno::EPIPE as i32),
        };
        let shaped = shape_error(&err);
        let message = shaped["error"].as_str().unwrap();
        assert!(message.starts_with("socket send "));
        assert!(message.ends_with(&format!("({})", Errno::EPIPE as i32)));
    }
}
