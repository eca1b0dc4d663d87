//! Prompt construction and conversation state

pub mod conversation;
pub mod prompt;

pub use conversation::{ConversationManager, Message, Role};
pub use prompt::{PromptBuilder, QueryKind, SYSTEM_PROMPT};
