use crate::api::WireMessage;

/// Whether a message exists only locally or is the server's record.
///
/// Optimistic entries start out `Pending` and are replaced wholesale by
/// `Confirmed` records on the reconciling refetch after a send completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Confirmed(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A chat message as the UI sees it.
#[derive(Debug, Clone)]
pub struct Message {
    pub delivery: Delivery,
    pub role: Role,
    pub role_name: String,
    pub text: String,
}

impl Message {
    fn pending_user(text: &str) -> Self {
        Self {
            delivery: Delivery::Pending,
            role: Role::User,
            role_name: "You".to_string(),
            text: text.to_string(),
        }
    }

    fn pending_reply() -> Self {
        Self {
            delivery: Delivery::Pending,
            role: Role::Assistant,
            role_name: "Assistant".to_string(),
            text: String::new(),
        }
    }

    pub fn from_wire(wire: WireMessage) -> Self {
        let role = match wire.role.as_str() {
            "user" => Role::User,
            _ => Role::Assistant,
        };
        Self {
            delivery: Delivery::Confirmed(wire.id),
            role,
            role_name: wire.role_name,
            text: wire.text.unwrap_or_default(),
        }
    }

    pub fn is_pending_reply(&self) -> bool {
        self.delivery == Delivery::Pending && self.role == Role::Assistant
    }
}

/// Messages of the active chat, most recent first.
///
/// Owned by the chat screen; mutated only from the main event loop (by the
/// streaming reply assembler and by full refetches) and replaced wholesale
/// when the user switches chats. At most one pending assistant placeholder
/// exists at any time.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Optimistically record an outgoing message and the reply placeholder,
    /// in display order `[placeholder, user, ...older...]`.
    pub fn begin_exchange(&mut self, text: &str) {
        self.messages.insert(0, Message::pending_user(text));
        self.messages.insert(0, Message::pending_reply());
    }

    pub fn has_pending_reply(&self) -> bool {
        self.messages.iter().any(Message::is_pending_reply)
    }

    /// Append streamed text to the reply placeholder, located by its
    /// delivery state rather than by position: other refreshes may have
    /// touched the buffer since the exchange began.
    pub fn append_reply_delta(&mut self, delta: &str) {
        if let Some(reply) = self.messages.iter_mut().find(|m| m.is_pending_reply()) {
            reply.text.push_str(delta);
        }
    }

    /// Roll back the placeholder after a failed stream. The optimistically
    /// sent user message stays visible.
    pub fn drop_pending_reply(&mut self) {
        self.messages.retain(|m| !m.is_pending_reply());
    }

    /// Replace the buffer with the server's record.
    pub fn reconcile(&mut self, wire: Vec<WireMessage>) {
        self.messages = wire.into_iter().map(Message::from_wire).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(id: i64, role: &str, text: &str) -> WireMessage {
        WireMessage {
            id,
            role: role.to_string(),
            role_name: role.to_string(),
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn test_begin_exchange_prepends_placeholder_then_user() {
        let mut conv = Conversation::default();
        conv.reconcile(vec![wire(1, "assistant", "older")]);
        conv.begin_exchange("Hello");

        let msgs = conv.messages();
        assert_eq!(msgs.len(), 3);
        assert!(msgs[0].is_pending_reply());
        assert_eq!(msgs[0].text, "");
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[1].delivery, Delivery::Pending);
        assert_eq!(msgs[1].text, "Hello");
        assert_eq!(msgs[2].text, "older");
    }

    #[test]
    fn test_deltas_accumulate_on_placeholder() {
        let mut conv = Conversation::default();
        conv.begin_exchange("Hello");
        conv.append_reply_delta("Hi");
        conv.append_reply_delta(" there");

        assert_eq!(conv.messages()[0].text, "Hi there");
        assert_eq!(conv.messages()[1].text, "Hello");
    }

    #[test]
    fn test_delta_finds_placeholder_by_state_not_position() {
        let mut conv = Conversation::default();
        conv.begin_exchange("question");
        // A refresh elsewhere shuffles a confirmed message to the front.
        conv.messages.insert(0, Message::from_wire(wire(9, "assistant", "aside")));

        conv.append_reply_delta("answer");

        let reply = conv.messages().iter().find(|m| m.is_pending_reply()).unwrap();
        assert_eq!(reply.text, "answer");
        assert_eq!(conv.messages()[0].text, "aside");
    }

    #[test]
    fn test_failure_rollback_keeps_user_message() {
        let mut conv = Conversation::default();
        conv.begin_exchange("Hello");
        conv.append_reply_delta("par");
        conv.drop_pending_reply();

        assert!(!conv.has_pending_reply());
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].role, Role::User);
        assert_eq!(conv.messages()[0].text, "Hello");
    }

    #[test]
    fn test_reconcile_leaves_no_pending_entries() {
        let mut conv = Conversation::default();
        conv.begin_exchange("Hello");
        conv.append_reply_delta("Hi there");

        conv.reconcile(vec![wire(4, "assistant", "Hi there"), wire(3, "user", "Hello")]);

        assert!(!conv.has_pending_reply());
        assert!(conv
            .messages()
            .iter()
            .all(|m| matches!(m.delivery, Delivery::Confirmed(_))));
        assert_eq!(conv.messages()[0].delivery, Delivery::Confirmed(4));
    }

    #[test]
    fn test_unknown_wire_role_displays_as_assistant() {
        let msg = Message::from_wire(wire(1, "unknown", "x"));
        assert_eq!(msg.role, Role::Assistant);
    }
}
