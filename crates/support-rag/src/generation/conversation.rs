//! Rolling conversation history

use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "Customer",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Keeps the newest `max_history` messages of a chat session
#[derive(Debug, Clone)]
pub struct ConversationManager {
    history: Vec<Message>,
    max_history: usize,
}

impl ConversationManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Vec::new(),
            max_history,
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        self.history.push(Message { role, content });
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }

    /// Transcript as `Customer: ...` / `Assistant: ...` paragraphs
    pub fn history_string(&self) -> String {
        self.history
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_rendering() {
        let mut conversation = ConversationManager::default();
        conversation.add_user_message("Where is my order?");
        conversation.add_assistant_message("It ships tomorrow.");
        assert_eq!(
            conversation.history_string(),
            "Customer: Where is my order?\n\nAssistant: It ships tomorrow."
        );
    }

    #[test]
    fn test_trims_to_newest_messages() {
        let mut conversation = ConversationManager::new(3);
        for i in 0..5 {
            conversation.add_user_message(format!("m{}", i));
        }
        let contents: Vec<&str> = conversation.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_clear() {
        let mut conversation = ConversationManager::new(4);
        conversation.add_user_message("hi");
        assert_eq!(conversation.len(), 1);
        conversation.clear();
        assert!(conversation.is_empty());
        assert_eq!(conversation.history_string(), "");
    }
}
