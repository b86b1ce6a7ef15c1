//! Ping-pong tool — answers `"pong"` to `{"message": "ping"}`.
//!
//! Exercises the whole local tool path end to end without side effects.

use async_trait::async_trait;
use chatgate_core::message::{ChatMessage, ToolCall};
use chatgate_core::tool::{Tool, ToolOutcome, ToolProps};
use serde_json::Value;

pub struct PingPongTool;

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Tool for PingPongTool {
    fn name(&self) -> &str {
        "ping_pong"
    }

    fn description(&self) -> &str {
        "A simple ping-pong function that responds with 'pong' when called with 'ping'."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to send (should be 'ping')",
                    "enum": ["ping"]
                }
            },
            "required": ["message"]
        })
    }

    fn validate(&self, call: &ToolCall, args: &Value) -> ToolOutcome {
        let message = args.get("message").unwrap_or(&Value::Null);

        let Some(text) = message.as_str() else {
            return ToolOutcome::rejected(vec![ChatMessage::tool_result(
                call,
                format!("Error: Expected type message str, got '{}'", json_type(message)),
            )]);
        };

        if text != "ping" {
            return ToolOutcome::rejected(vec![ChatMessage::tool_result(
                call,
                format!("Error: Expected message 'ping', got '{text}'"),
            )]);
        }

        ToolOutcome::ok(vec![])
    }

    async fn execute(&self, call: &ToolCall, _args: &Value) -> ToolOutcome {
        ToolOutcome::ok(vec![ChatMessage::tool_result(call, "pong")])
    }

    fn props(&self) -> ToolProps {
        ToolProps {
            tool_name: self.name().to_string(),
            system_prompt: None,
            depends_on: Some(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::MessageContent;

    fn call() -> ToolCall {
        ToolCall::new("call_1", "ping_pong", r#"{"message": "ping"}"#)
    }

    fn text(msg: &ChatMessage) -> &str {
        msg.content().and_then(MessageContent::as_text).unwrap()
    }

    #[test]
    fn accepts_ping() {
        let outcome = PingPongTool.validate(&call(), &serde_json::json!({"message": "ping"}));
        assert!(outcome.ok);
        assert!(outcome.messages.is_empty());
    }

    #[test]
    fn rejects_other_messages() {
        let outcome = PingPongTool.validate(&call(), &serde_json::json!({"message": "pang"}));
        assert!(!outcome.ok);
        assert_eq!(text(&outcome.messages[0]), "Error: Expected message 'ping', got 'pang'");
        assert_eq!(outcome.messages[0].tool_call_id(), Some("call_1"));
    }

    #[test]
    fn rejects_non_string_message() {
        let outcome = PingPongTool.validate(&call(), &serde_json::json!({"message": 5}));
        assert!(!outcome.ok);
        assert_eq!(text(&outcome.messages[0]), "Error: Expected type message str, got 'number'");

        let outcome = PingPongTool.validate(&call(), &serde_json::json!({}));
        assert_eq!(text(&outcome.messages[0]), "Error: Expected type message str, got 'null'");
    }

    #[tokio::test]
    async fn execute_answers_pong() {
        let outcome = PingPongTool.execute(&call(), &serde_json::json!({"message": "ping"})).await;
        assert!(outcome.ok);
        assert_eq!(text(&outcome.messages[0]), "pong");
    }

    #[test]
    fn definition_shape() {
        let def = serde_json::to_value(PingPongTool.to_definition()).unwrap();
        assert_eq!(def["type"], "function");
        assert_eq!(def["function"]["name"], "ping_pong");
        assert_eq!(def["function"]["parameters"]["required"][0], "message");
    }
}
