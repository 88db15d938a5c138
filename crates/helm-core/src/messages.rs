//! Conversation messages produced during a turn.
//!
//! Messages are kept in memory for the duration of one engine call and are
//! never persisted by the core.

use serde::{Deserialize, Serialize};

/// Role of a conversation entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Model output.
    Assistant,
    /// Output of a tool call fed back to the model.
    ToolResult,
    /// Extension-defined entry. Not sent to providers by default.
    Custom,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolResult => "tool_result",
            Self::Custom => "custom",
        }
    }

    /// Roles a provider understands: user, assistant and tool results.
    #[must_use]
    pub const fn is_conversational(self) -> bool {
        matches!(self, Self::User | Self::Assistant | Self::ToolResult)
    }
}

/// A logical conversation entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Entry role.
    pub role: Role,
    /// Entry text.
    pub text: String,
    /// Tool call this entry answers (tool results only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool that produced this entry (tool results only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    /// A user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    /// A custom, extension-defined message.
    #[must_use]
    pub fn custom(text: impl Into<String>) -> Self {
        Self::plain(Role::Custom, text)
    }

    /// A tool result message.
    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::ToolResult,
            text: text.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversational_roles() {
        assert!(Role::User.is_conversational());
        assert!(Role::Assistant.is_conversational());
        assert!(Role::ToolResult.is_conversational());
        assert!(!Role::Custom.is_conversational());
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::ToolResult.as_str(), "tool_result");
        assert_eq!(serde_json::to_string(&Role::ToolResult).unwrap(), "\"tool_result\"");
    }

    #[test]
    fn tool_result_carries_call_metadata() {
        let msg = Message::tool_result("tc-1", "read", "contents");
        assert_eq!(msg.role, Role::ToolResult);
        assert_eq!(msg.tool_call_id.as_deref(), Some("tc-1"));
        assert_eq!(msg.tool_name.as_deref(), Some("read"));
        assert_eq!(msg.text, "contents");
    }

    #[test]
    fn plain_messages_have_no_tool_metadata() {
        let msg = Message::user("hi");
        assert!(msg.tool_call_id.is_none());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("toolCallId").is_none());
    }
}
