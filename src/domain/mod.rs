//! Core data model (spec §3): channels, agents, tasks, entities,
//! relationships, memory records, and cognitive phase entries.

pub mod agent;
pub mod channel;
pub mod entity;
pub mod memory_record;
pub mod phase;
pub mod relationship;
pub mod task;

pub use agent::{Agent, AgentRole, AgentStatus};
pub use channel::Channel;
pub use entity::{Entity, EntityType, Utility};
pub use memory_record::{
    AgentMemory, ChannelMemory, ContextLayer, ConversationMessage, MessageRole, RelationshipMemory,
};
pub use phase::{CognitivePhase, PhaseEntry};
pub use relationship::Relationship;
pub use task::{CoordinationMode, Priority, Task, TaskAssignment, TaskStatus};
