//! Provider-agnostic LLM dispatch (spec §4.9). Each backend implements
//! `LLMProvider`; the dispatcher normalizes messages and tool schemas to
//! one shape and registers adapters in a name-keyed map rather than an
//! inheritance hierarchy (spec §9).

pub mod provider_schema;
pub mod registry;

pub use provider_schema::{from_provider_schema, to_provider_schema, ProviderSchema};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MxfResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    Image { url: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentItem>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentItem::Text { text: text.into() }],
        }
    }
}

/// JSON Schema-like leaf/object/array description for a tool's input
/// (spec §4.9: "object/array/string/number/integer/boolean/enum").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaType {
    Object {
        properties: std::collections::BTreeMap<String, SchemaType>,
        required: Vec<String>,
    },
    Array {
        items: Box<SchemaType>,
    },
    String {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        r#enum: Vec<String>,
    },
    Number,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: SchemaType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentItem>,
    pub model: String,
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Merges consecutive system messages into one and coalesces adjacent
/// same-role messages, matching the conversion requirements adapters
/// that accept at most one system message need (spec §4.9).
pub fn normalize_messages(messages: &[Message]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::new();
    for message in messages {
        if let Some(last) = out.last_mut() {
            if last.role == message.role {
                last.content.extend(message.content.clone());
                continue;
            }
        }
        out.push(message.clone());
    }
    out
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        options: &SendOptions,
    ) -> MxfResult<ProviderResponse>;
}

/// A deterministic provider for tests, grounded in the teacher's
/// `SmartMockProvider`. Echoes the final user message as a tool_use call
/// when tools are offered, otherwise as plain text.
pub struct MockProvider {
    pub model_name: String,
}

impl MockProvider {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        _options: &SendOptions,
    ) -> MxfResult<ProviderResponse> {
        let last_text = messages
            .iter()
            .rev()
            .flat_map(|m| m.content.iter())
            .find_map(|c| match c {
                ContentItem::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default();

        let (content, stop_reason) = if let Some(tool) = tools.first() {
            // Every offered tool is translated to the provider's own schema
            // shape before the call and translated back on the way in, the
            // same boundary a real provider adapter crosses over the wire.
            let tool = provider_schema::roundtrip_tool_schema(tool);
            (
                vec![ContentItem::ToolUse {
                    id: "mock-call-1".to_string(),
                    name: tool.name.clone(),
                    input: serde_json::json!({ "echo": last_text }),
                }],
                StopReason::ToolUse,
            )
        } else {
            (
                vec![ContentItem::Text {
                    text: format!("mock response to: {last_text}"),
                }],
                StopReason::EndTurn,
            )
        };

        Ok(ProviderResponse {
            id: "mock-response-1".to_string(),
            role: Role::Assistant,
            content,
            model: self.model_name.clone(),
            stop_reason,
            stop_sequence: None,
            usage: Usage {
                input: last_text.len() as u32,
                output: 8,
                total: last_text.len() as u32 + 8,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_same_role_messages_coalesce() {
        let messages = vec![
            Message::text(Role::System, "a"),
            Message::text(Role::System, "b"),
            Message::text(Role::User, "c"),
        ];
        let normalized = normalize_messages(&messages);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].content.len(), 2);
    }

    #[tokio::test]
    async fn mock_provider_emits_tool_use_when_tools_are_offered() {
        let provider = MockProvider::new("mock-1");
        let tools = vec![ToolSpec {
            name: "search".to_string(),
            description: "search the web".to_string(),
            input_schema: SchemaType::Object {
                properties: Default::default(),
                required: Vec::new(),
            },
        }];
        let messages = vec![Message::text(Role::User, "find the weather")];

        let response = provider
            .send(&messages, &tools, &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert!(matches!(response.content[0], ContentItem::ToolUse { .. }));
    }
}
