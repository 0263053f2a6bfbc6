//! Conversation turns and the provider wire message.
//!
//! Two shapes live here:
//!
//! - [`ConversationTurn`] is what the client sends as history. Its tool
//!   output records keep machine-produced *system fields* apart from
//!   *user-originated fields*; the zone renderer relies on that split to
//!   decide what gets wrapped as untrusted.
//! - [`Message`] is what goes to the LLM provider.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Output of a tool that ran during an earlier turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputRecord {
    /// Name of the tool that produced the record.
    pub tool: String,

    /// Machine-produced values (ids, seeds, enumerated statuses).
    #[serde(default)]
    pub system_fields: BTreeMap<String, String>,

    /// Any value that flowed from end-user or LLM-authored text.
    #[serde(default)]
    pub user_fields: BTreeMap<String, String>,
}

/// One turn of client-supplied conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_outputs: Vec<ToolOutputRecord>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            tool_outputs: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            tool_outputs: Vec::new(),
        }
    }

    /// Attach a tool output record to this turn.
    pub fn with_tool_output(mut self, record: ToolOutputRecord) -> Self {
        self.tool_outputs.push(record);
        self
    }
}

/// The role of a message sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a provider request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as JSON string
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_deserializes_without_tool_outputs() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(turn.role, TurnRole::User);
        assert!(turn.tool_outputs.is_empty());
    }

    #[test]
    fn tool_output_fields_stay_separate() {
        let json = r#"{
            "role": "assistant",
            "content": "done",
            "tool_outputs": [{
                "tool": "edit_graph",
                "system_fields": {"patch_id": "p_12"},
                "user_fields": {"note": "rename the goal"}
            }]
        }"#;
        let turn: ConversationTurn = serde_json::from_str(json).unwrap();
        let record = &turn.tool_outputs[0];
        assert_eq!(record.system_fields["patch_id"], "p_12");
        assert_eq!(record.user_fields["note"], "rename the goal");
    }

    #[test]
    fn tool_result_message_links_call() {
        let msg = Message::tool_result("call_1", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }
}
