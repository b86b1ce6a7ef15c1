//! Tool trait — functions the gateway executes locally on the model's behalf.
//!
//! When the model asks for a tool call and the client sends the conversation
//! back unanswered, the gateway looks the tool up in the [`ToolRegistry`],
//! validates the arguments, executes it, and appends the resulting messages
//! before forwarding to the upstream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::message::{ChatMessage, ToolCall, pending_tool_calls};

/// A tool definition as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default = "function_kind")]
    pub r#type: String,

    pub function: FunctionDefinition,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the parameters
    #[serde(default)]
    pub parameters: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Usage guidance for one tool, folded into the synthesized system message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProps {
    pub tool_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

impl ToolProps {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            system_prompt: None,
            depends_on: None,
        }
    }
}

/// The verdict and messages produced by validating or executing a call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub ok: bool,
    pub messages: Vec<ChatMessage>,
}

impl ToolOutcome {
    pub fn ok(messages: Vec<ChatMessage>) -> Self {
        Self { ok: true, messages }
    }

    pub fn rejected(messages: Vec<ChatMessage>) -> Self {
        Self {
            ok: false,
            messages,
        }
    }
}

/// What to do with a call that neither a local tool nor a capability
/// server answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownToolPolicy {
    /// Answer the call with an error message the model can read
    #[default]
    Report,
    /// Leave the call unanswered
    Skip,
}

/// The core Tool trait.
///
/// Validation runs before execution; a rejected validation stops the call
/// and its messages (typically an error tool message) go back to the model
/// so it can correct itself.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "ping_pong").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Check the parsed arguments of `call`.
    fn validate(&self, call: &ToolCall, args: &serde_json::Value) -> ToolOutcome;

    /// Run the tool. Only called after `validate` accepted the call.
    async fn execute(&self, call: &ToolCall, args: &serde_json::Value) -> ToolOutcome;

    /// Usage guidance for the system message.
    fn props(&self) -> ToolProps {
        ToolProps::new(self.name())
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: function_kind(),
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
                strict: None,
            },
        }
    }
}

/// An ordered set of tools with distinct names.
///
/// Built once at startup and shared immutably afterwards.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        if self.get(tool.name()).is_some() {
            return Err(ToolError::DuplicateName(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// All tool props, in registration order.
    pub fn props(&self) -> Vec<ToolProps> {
        self.tools.iter().map(|t| t.props()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Answer the current turn's unanswered tool calls with local tools.
    ///
    /// Each call is handled on its own: malformed arguments or a rejected
    /// validation produce messages for that call and resolution moves on to
    /// the next one. Calls naming a tool this registry doesn't hold are left
    /// unanswered. Returns the synthesized messages in call order; the caller
    /// appends them to the conversation.
    pub async fn resolve_pending(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut results = Vec::new();

        for call in pending_tool_calls(messages) {
            let name = call.function.name.as_str();

            let Some(tool) = self.get(name) else {
                debug!(tool = %name, call_id = %call.id, "Skipping call to non-local tool");
                continue;
            };

            let args: serde_json::Value = match serde_json::from_str(&call.function.arguments) {
                Ok(args) => args,
                Err(e) => {
                    let err = ToolError::MalformedArguments {
                        tool_name: name.to_string(),
                        arguments: call.function.arguments.clone(),
                    };
                    warn!(tool = %name, call_id = %call.id, error = %e, "Malformed tool arguments");
                    results.push(ChatMessage::tool_result(call, format!("Error: {err}")));
                    continue;
                }
            };

            let verdict = tool.validate(call, &args);
            results.extend(verdict.messages);
            if !verdict.ok {
                debug!(tool = %name, call_id = %call.id, "Tool call rejected by validation");
                continue;
            }

            let outcome = tool.execute(call, &args).await;
            if !outcome.ok {
                warn!(tool = %name, call_id = %call.id, "Tool execution reported failure");
            }
            results.extend(outcome.messages);
        }

        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
