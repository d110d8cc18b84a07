use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Safezone frame, serialized/deserialized as a JSON text message
/// (spec.md §4.9). `type` discriminates the variant; every variant except
/// the connection-wide `error` carries an `id` the server echoes back.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Request {
        id: String,
        url: String,
        method: Option<String>,
        headers: Option<std::collections::HashMap<String, String>>,
        #[serde(rename = "renderHint")]
        render_hint: Option<String>,
        body: Option<String>,
        #[serde(rename = "bodyEncoding")]
        body_encoding: Option<String>,
    },
    Cancel {
        id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Response {
        id: String,
        status: u16,
        headers: Vec<(String, String)>,
        #[serde(rename = "fromCache")]
        from_cache: bool,
        renderer: &'static str,
    },
    Body {
        id: String,
        data: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ServerFrame {
    pub fn connection_error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            id: None,
            status: None,
            message: message.into(),
            details: None,
        }
    }

    pub fn channel_error(id: String, status: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            id: Some(id),
            status: Some(status),
            message: message.into(),
            details: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame always serializes")
    }
}

/// Parse a raw text message into a `ClientFrame`, surfacing malformed JSON or
/// missing required fields distinctly from a well-formed-but-unknown type.
pub fn parse_client_frame(raw: &str) -> Result<ClientFrame, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| format!("invalid json: {e}"))?;

    match value.get("id").and_then(Value::as_str) {
        Some(id) if id.is_empty() => return Err("id must be a non-empty string".to_string()),
        Some(_) => {}
        None => return Err("frame is missing a non-empty string id".to_string()),
    }

    match value.get("type").and_then(Value::as_str) {
        Some("request") => {
            let url = value.get("url").and_then(Value::as_str).unwrap_or("");
            if url.is_empty() {
                return Err("request frame requires a non-empty url".to_string());
            }
        }
        Some("cancel") => {}
        Some(other) => return Err(format!("unknown frame type: {other}")),
        None => return Err("frame is missing a type".to_string()),
    }

    serde_json::from_value(value).map_err(|e| format!("malformed frame: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_request_frame() {
        let raw = r#"{"type":"request","id":"r1","url":"https://example.com/p"}"#;
        let frame = parse_client_frame(raw).unwrap();
        assert!(matches!(frame, ClientFrame::Request { id, .. } if id == "r1"));
    }

    #[test]
    fn rejects_missing_url() {
        let raw = r#"{"type":"request","id":"r1"}"#;
        assert!(parse_client_frame(raw).is_err());
    }

    #[test]
    fn rejects_missing_id() {
        let raw = r#"{"type":"request","url":"https://example.com/"}"#;
        assert!(parse_client_frame(raw).is_err());
    }

    #[test]
    fn parses_cancel_frame() {
        let raw = r#"{"type":"cancel","id":"r1"}"#;
        let frame = parse_client_frame(raw).unwrap();
        assert!(matches!(frame, ClientFrame::Cancel { id } if id == "r1"));
    }

    #[test]
    fn response_frame_serializes_with_tag() {
        let frame = ServerFrame::Response {
            id: "r1".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            from_cache: false,
            renderer: "direct",
        };
        let json = frame.to_json();
        assert!(json.contains(r#""type":"response""#));
        assert!(json.contains(r#""fromCache":false"#));
    }

    #[test]
    fn connection_error_omits_id_and_status() {
        let frame = ServerFrame::connection_error("malformed json");
        let json = frame.to_json();
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("\"status\""));
    }
}
