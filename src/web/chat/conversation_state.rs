#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Append-only transcript of one browser session.
#[derive(Debug)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn add_user_message(&mut self, message: &str) -> &Message {
        self.push(Role::User, message)
    }

    pub fn add_assistant_message(&mut self, message: &str) -> &Message {
        self.push(Role::Assistant, message)
    }

    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    fn push(&mut self, role: Role, content: &str) -> &Message {
        self.messages.push(Message {
            role,
            content: content.to_string(),
        });
        &self.messages[self.messages.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_keep_insertion_order() {
        let mut state = ConversationState::new();
        assert!(state.get_messages().is_empty());

        state.add_user_message("Hello");
        state.add_assistant_message("Hi there");

        let roles: Vec<Role> = state.get_messages().iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(state.get_messages()[0].content(), "Hello");
        assert_eq!(state.get_messages()[1].content(), "Hi there");
    }
}
