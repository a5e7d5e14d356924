pub mod conversation_state;
pub mod session_store;

use conversation_state::{ConversationState, Message};
use tracing::debug;

use crate::gemini_client::{RemoteChat, RemoteError};

/// Everything one browser session owns: its transcript and its remote chat.
pub struct ConversationSession {
    conversation_state: ConversationState,
    remote_chat: Box<dyn RemoteChat>,
    pending_error: Option<String>,
}

impl ConversationSession {
    pub fn new(remote_chat: Box<dyn RemoteChat>) -> Self {
        Self {
            conversation_state: ConversationState::new(),
            remote_chat,
            pending_error: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation_state.get_messages()
    }

    /// Runs one turn. A failed remote call leaves only the user message behind.
    pub async fn submit(&mut self, input: &str) -> Result<&Message, RemoteError> {
        self.pending_error = None;
        self.conversation_state.add_user_message(input);

        match self.remote_chat.send(input).await {
            Ok(response) => {
                debug!(chars = response.len(), "Received assistant reply");
                Ok(self.conversation_state.add_assistant_message(&response))
            }
            Err(e) => {
                self.pending_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Returns the error from the last failed turn, once.
    pub fn take_pending_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::gemini_client::{ChatBackend, RemoteChat, RemoteError};

    pub type Script = Arc<Mutex<VecDeque<Result<String, RemoteError>>>>;

    /// Replays scripted replies; records every prompt it was sent.
    pub struct ScriptedChat {
        pub script: Script,
        pub sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RemoteChat for ScriptedChat {
        async fn send(&mut self, text: &str) -> Result<String, RemoteError> {
            self.sent.lock().unwrap().push(text.to_string());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(format!("echo: {}", text)))
        }
    }

    #[derive(Default)]
    pub struct ScriptedBackend {
        pub script: Script,
        pub sent: Arc<Mutex<Vec<String>>>,
        pub started: Arc<Mutex<usize>>,
    }

    impl ScriptedBackend {
        pub fn push(&self, reply: Result<&str, RemoteError>) {
            self.script.lock().unwrap().push_back(reply.map(str::to_string));
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn start_chat(&self) -> Box<dyn RemoteChat> {
            *self.started.lock().unwrap() += 1;
            Box::new(ScriptedChat {
                script: Arc::clone(&self.script),
                sent: Arc::clone(&self.sent),
            })
        }
    }

    pub fn remote_failure() -> RemoteError {
        RemoteError::Api {
            status: 503,
            message: "model overloaded".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::conversation_state::Role;
    use super::test_support::{remote_failure, ScriptedBackend};
    use super::*;
    use crate::gemini_client::ChatBackend;

    fn session(backend: &ScriptedBackend) -> ConversationSession {
        ConversationSession::new(backend.start_chat())
    }

    fn assert_alternating(messages: &[Message]) {
        for (i, message) in messages.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(message.role(), expected, "message {} has the wrong role", i);
        }
    }

    #[tokio::test]
    async fn successful_turn_appends_both_messages() {
        let backend = ScriptedBackend::default();
        backend.push(Ok("Hi there"));
        let mut session = session(&backend);

        let reply = session.submit("Hello").await.unwrap();
        assert_eq!(reply.content(), "Hi there");

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!((messages[0].role(), messages[0].content()), (Role::User, "Hello"));
        assert_eq!((messages[1].role(), messages[1].content()), (Role::Assistant, "Hi there"));
        assert_eq!(session.take_pending_error(), None);
    }

    #[tokio::test]
    async fn failed_turn_keeps_only_the_user_message() {
        let backend = ScriptedBackend::default();
        backend.push(Err(remote_failure()));
        backend.push(Ok("Back again"));
        let mut session = session(&backend);

        assert!(session.submit("Hello").await.is_err());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role(), Role::User);

        let shown = session.take_pending_error().expect("error should be pending");
        assert!(shown.contains("model overloaded"));
        assert_eq!(session.take_pending_error(), None);

        let reply = session.submit("Hello?").await.unwrap();
        assert_eq!(reply.content(), "Back again");
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[2].role(), Role::Assistant);
    }

    #[tokio::test]
    async fn successful_turns_alternate_roles() {
        let backend = ScriptedBackend::default();
        let mut session = session(&backend);

        for n in 0..5 {
            session.submit(&format!("question {}", n)).await.unwrap();
        }

        assert_eq!(session.messages().len(), 10);
        assert_alternating(session.messages());
        assert_eq!(backend.sent.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn two_turns_produce_four_messages() {
        let backend = ScriptedBackend::default();
        backend.push(Ok("one"));
        backend.push(Ok("two"));
        let mut session = session(&backend);

        session.submit("first").await.unwrap();
        session.submit("second").await.unwrap();

        let contents: Vec<&str> = session.messages().iter().map(Message::content).collect();
        assert_eq!(contents, vec!["first", "one", "second", "two"]);
        assert_alternating(session.messages());
    }

    #[tokio::test]
    async fn new_turn_clears_a_stale_error() {
        let backend = ScriptedBackend::default();
        backend.push(Err(remote_failure()));
        let mut session = session(&backend);

        let _ = session.submit("Hello").await;
        session.submit("Again").await.unwrap();

        assert_eq!(session.take_pending_error(), None);
    }
}
