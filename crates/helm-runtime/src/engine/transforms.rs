//! Pluggable message transforms applied before every provider round-trip.
//!
//! `transform_context` rewrites the accumulated conversation (pruning,
//! injection); `convert_to_provider` maps it to provider wire messages.

use std::sync::Arc;

use helm_core::Message;
use helm_llm::ProviderMessage;

/// Rewrites the accumulated conversation before conversion.
pub type TransformContext = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;

/// Converts conversation messages into provider wire messages.
pub type ConvertToProvider = Arc<dyn Fn(&[Message]) -> Vec<ProviderMessage> + Send + Sync>;

/// Keep user, assistant and tool-result entries; drop everything else.
pub fn default_convert(messages: &[Message]) -> Vec<ProviderMessage> {
    messages
        .iter()
        .filter(|m| m.role.is_conversational())
        .map(|m| ProviderMessage {
            role: m.role,
            content: m.text.clone(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use helm_core::Role;

    use super::*;

    #[test]
    fn custom_entries_are_dropped() {
        let messages = vec![
            Message::user("hi"),
            Message::custom("ui-only"),
            Message::assistant("hello"),
            Message::tool_result("tc-1", "read", "data"),
        ];
        let converted = default_convert(&messages);
        let roles: Vec<Role> = converted.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::ToolResult]);
        assert_eq!(converted[2].tool_call_id.as_deref(), Some("tc-1"));
        assert_eq!(converted[2].content, "data");
    }
}
