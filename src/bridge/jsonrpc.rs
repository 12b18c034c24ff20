//! JSON-RPC 2.0 message framing shared by both bridge surfaces (§4.4,
//! §6). This is the single canonical definition — an earlier draft of
//! this runtime defined the same type twice (once inline in the stdio
//! bridge, once in a standalone module); this is the one the rest of the
//! crate imports.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Represents any of the three JSON-RPC 2.0 message shapes: request,
/// response, or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    pub fn new_request(method: &str, params: Option<serde_json::Value>, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn new_response(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn new_error(id: serde_json::Value, code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(JsonRpcError { code, message: message.to_string(), data }),
        }
    }

    pub fn new_notification(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn is_request(&self) -> bool {
        self.id.is_some() && self.method.is_some()
    }

    pub fn is_response(&self) -> bool {
        self.id.is_some() && (self.result.is_some() || self.error.is_some())
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// Parse a single line of stdout as a JSON-RPC message, with the
    /// dirty-output recovery pass §4.4 mandates: if the raw line doesn't
    /// parse, extract the substring from the first `{` to the last `}`,
    /// strip non-printable bytes (space and newline excepted), and retry.
    /// Returns `None` if recovery also fails — the caller logs and drops.
    pub fn parse_line(line: &str) -> Option<Self> {
        if let Ok(msg) = serde_json::from_str::<Self>(line) {
            return Some(msg);
        }

        let start = line.find('{')?;
        let end = line.rfind('}')?;
        if end < start {
            return None;
        }

        let candidate: String = line[start..=end]
            .chars()
            .filter(|c| !c.is_control() || *c == ' ' || *c == '\n')
            .collect();

        serde_json::from_str::<Self>(&candidate).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_predicates() {
        let msg = JsonRpcMessage::new_request("ping", None, json!(1));
        assert!(msg.is_request());
        assert!(!msg.is_response());
        assert!(!msg.is_notification());
    }

    #[test]
    fn response_predicates() {
        let msg = JsonRpcMessage::new_response(json!(1), json!("pong"));
        assert!(msg.is_response());
        assert!(!msg.is_request());
    }

    #[test]
    fn error_response_is_still_a_response() {
        let msg = JsonRpcMessage::new_error(json!(1), -32600, "Invalid Request", None);
        assert!(msg.is_response());
    }

    #[test]
    fn notification_predicates() {
        let msg = JsonRpcMessage::new_notification("notifications/initialized", None);
        assert!(msg.is_notification());
        assert!(!msg.is_request());
        assert!(!msg.is_response());
    }

    #[test]
    fn parse_line_accepts_clean_json() {
        let line = r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#;
        let msg = JsonRpcMessage::parse_line(line).unwrap();
        assert_eq!(msg.id, Some(json!(1)));
    }

    #[test]
    fn parse_line_recovers_from_surrounding_garbage() {
        let line = "\u{1}garbage{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"pong\"}trailing\u{2}";
        let msg = JsonRpcMessage::parse_line(line).unwrap();
        assert_eq!(msg.id, Some(json!(1)));
    }

    #[test]
    fn parse_line_gives_up_on_unrecoverable_garbage() {
        assert!(JsonRpcMessage::parse_line("not json at all").is_none());
    }

    #[test]
    fn parse_line_rejects_malformed_braces() {
        assert!(JsonRpcMessage::parse_line("}{").is_none());
    }
}
