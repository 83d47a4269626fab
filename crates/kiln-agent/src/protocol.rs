use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One agent request: a tool name plus its raw JSON arguments.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// What the agent sees for a call: text content and an error flag, never a raw failure.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResponse {
    pub fn success(payload: &Value) -> Self {
        let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: true,
        }
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|content| content.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parses the text back into JSON; `None` for failures or non-JSON text.
    pub fn payload(&self) -> Option<Value> {
        if self.is_error {
            return None;
        }
        serde_json::from_str(&self.text()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_serializes_with_wire_field_names() {
        let response = ToolResponse::failure("Unknown tool: nope");
        assert_eq!(
            serde_json::to_value(&response).expect("response should serialize"),
            json!({ "content": [{ "type": "text", "text": "Unknown tool: nope" }], "isError": true })
        );
        assert_eq!(response.payload(), None);
    }

    #[test]
    fn call_without_arguments_decodes_to_null() {
        let call: ToolCall =
            serde_json::from_value(json!({ "name": "editor_status" })).expect("call should decode");
        assert_eq!(call.arguments, Value::Null);
    }

    #[test]
    fn success_payload_is_recoverable() {
        let payload = json!({ "ok": true, "error_count": 0 });
        assert_eq!(ToolResponse::success(&payload).payload(), Some(payload));
    }
}
