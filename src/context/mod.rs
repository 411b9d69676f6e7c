//! The context assembler (spec §4.8): builds the ordered prompt message
//! sequence an agent's turn is run against, from its framework identity,
//! filtered conversation history, current task, and recent actions.

use crate::domain::{ContextLayer, ConversationMessage, MessageRole};
use crate::graph::GraphContext;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub purpose: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CurrentTask {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent_id: String,
    pub agent_config: AgentConfig,
    pub system_prompt: String,
    pub conversation_history: Vec<ConversationMessage>,
    pub current_task: Option<CurrentTask>,
    pub recent_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

fn survives_filter(message: &ConversationMessage) -> bool {
    match message.context_layer {
        Some(ContextLayer::Conversation | ContextLayer::ToolResult | ContextLayer::Task) => true,
        Some(ContextLayer::System | ContextLayer::Identity | ContextLayer::Action) => false,
        None => message.role != MessageRole::System,
    }
}

/// Assembles the prompt message sequence per the exact four-step policy
/// in §4.8. `graph_context` is not yet rendered into content here — a
/// provider-facing renderer may fold `GraphContext` into the system
/// message; this function only guarantees message order and filtering.
pub fn assemble(context: &AgentContext, _graph_context: Option<&GraphContext>) -> Vec<PromptMessage> {
    let mut messages = Vec::new();

    let identity = format!(
        "Agent Identity\npurpose: {}\nagentId: {}\ncapabilities: {}",
        context.agent_config.purpose,
        context.agent_id,
        context.agent_config.capabilities.join(", ")
    );
    messages.push(PromptMessage {
        role: MessageRole::System,
        content: format!("{}\n\n{}", context.system_prompt, identity),
    });

    let filtered: Vec<&ConversationMessage> = context
        .conversation_history
        .iter()
        .filter(|m| survives_filter(m))
        .collect();

    let has_task_message = filtered
        .iter()
        .any(|m| m.context_layer == Some(ContextLayer::Task));

    let task_message = (!has_task_message).then(|| {
        context.current_task.as_ref().map(|task| PromptMessage {
            role: MessageRole::User,
            content: format!("Current task ({}): {}", task.id, task.description),
        })
    }).flatten();

    // The task message must never land after a tool-result entry, so it
    // is spliced in right before the earliest one rather than appended
    // after the whole filtered history.
    let first_tool_result_idx = filtered
        .iter()
        .position(|m| m.context_layer == Some(ContextLayer::ToolResult));

    for (i, message) in filtered.iter().enumerate() {
        if first_tool_result_idx == Some(i) {
            if let Some(task_msg) = &task_message {
                messages.push(task_msg.clone());
            }
        }
        messages.push(PromptMessage {
            role: message.role,
            content: message.content.clone(),
        });
    }

    if first_tool_result_idx.is_none() {
        if let Some(task_msg) = task_message {
            messages.push(task_msg);
        }
    }

    if !context.recent_actions.is_empty() {
        messages.push(PromptMessage {
            role: MessageRole::User,
            content: format!("Recent actions:\n{}", context.recent_actions.join("\n")),
        });
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_context() -> AgentContext {
        AgentContext {
            agent_id: "a1".to_string(),
            agent_config: AgentConfig {
                purpose: "triage incoming tasks".to_string(),
                capabilities: vec!["plan".to_string(), "delegate".to_string()],
            },
            system_prompt: "You are an MXF coordination agent.".to_string(),
            conversation_history: Vec::new(),
            current_task: None,
            recent_actions: Vec::new(),
        }
    }

    #[test]
    fn exactly_one_system_message_and_it_is_first() {
        let context = base_context();
        let messages = assemble(&context, None);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages.iter().filter(|m| m.role == MessageRole::System).count(), 1);
    }

    #[test]
    fn excluded_layers_never_survive_filtering() {
        let mut context = base_context();
        context.conversation_history = vec![
            ConversationMessage::new(MessageRole::System, "hidden system").tagged(ContextLayer::System),
            ConversationMessage::new(MessageRole::Assistant, "hidden identity")
                .tagged(ContextLayer::Identity),
            ConversationMessage::new(MessageRole::Assistant, "hidden action").tagged(ContextLayer::Action),
            ConversationMessage::new(MessageRole::User, "visible").tagged(ContextLayer::Conversation),
        ];
        let messages = assemble(&context, None);
        assert!(!messages.iter().any(|m| m.content.contains("hidden")));
        assert!(messages.iter().any(|m| m.content == "visible"));
    }

    #[test]
    fn task_message_is_deduped_against_existing_tagged_history() {
        let mut context = base_context();
        context.current_task = Some(CurrentTask {
            id: "t1".to_string(),
            description: "Ship the release".to_string(),
        });
        context.conversation_history = vec![
            ConversationMessage::new(MessageRole::User, "Ship the release (already asked)")
                .tagged(ContextLayer::Task),
        ];

        let messages = assemble(&context, None);
        let task_mentions = messages
            .iter()
            .filter(|m| m.content.contains("Ship the release"))
            .count();
        assert_eq!(task_mentions, 1);
    }

    #[test]
    fn task_message_never_lands_after_a_tool_result_and_precedes_recent_actions() {
        let mut context = base_context();
        context.conversation_history = vec![ConversationMessage::new(
            MessageRole::Assistant,
            "tool ran successfully",
        )
        .tagged(ContextLayer::ToolResult)];
        context.current_task = Some(CurrentTask {
            id: "t1".to_string(),
            description: "Investigate the outage".to_string(),
        });
        context.recent_actions = vec!["checked logs".to_string()];

        let messages = assemble(&context, None);
        let tool_result_idx = messages
            .iter()
            .position(|m| m.content.contains("tool ran successfully"))
            .unwrap();
        let task_idx = messages
            .iter()
            .position(|m| m.content.contains("Investigate the outage"))
            .unwrap();
        let actions_idx = messages
            .iter()
            .position(|m| m.content.contains("Recent actions"))
            .unwrap();

        assert!(task_idx < tool_result_idx);
        assert!(task_idx < actions_idx);
    }

    #[test]
    fn task_message_precedes_every_tool_result_even_when_interleaved() {
        let mut context = base_context();
        context.conversation_history = vec![
            ConversationMessage::new(MessageRole::User, "first turn")
                .tagged(ContextLayer::Conversation),
            ConversationMessage::new(MessageRole::Assistant, "first tool result")
                .tagged(ContextLayer::ToolResult),
            ConversationMessage::new(MessageRole::Assistant, "second tool result")
                .tagged(ContextLayer::ToolResult),
        ];
        context.current_task = Some(CurrentTask {
            id: "t1".to_string(),
            description: "Investigate the outage".to_string(),
        });

        let messages = assemble(&context, None);
        let task_idx = messages
            .iter()
            .position(|m| m.content.contains("Investigate the outage"))
            .unwrap();
        for (i, message) in messages.iter().enumerate() {
            if message.content.contains("tool result") {
                assert!(task_idx < i);
            }
        }
    }
}
