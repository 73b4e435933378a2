//! Chat message log so user sends and streamed assistant replies share one order.
//!
//! The log is append-only. A user message is appended synchronously at send
//! time regardless of connection state; an assistant message is appended as a
//! draft on its first chunk and finalized in place. Messages are never
//! retracted.

use std::time::SystemTime;

use serde::Serialize;

/// Stable message identifier (1-based, insertion order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MessageId(pub u64);

/// One chat message, user-authored or assistant-streamed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub is_user: bool,
    pub text: Option<String>,
    pub image_data: Option<Vec<u8>>,
    /// True while assistant content is still streaming in.
    pub is_draft: bool,
    /// True once the message was handed to the transport. A user message sent
    /// while disconnected keeps `false` so the UI can show it as unsent.
    pub sent: bool,
    pub created_at: SystemTime,
}

/// Append-only message sequence with at most one open assistant draft.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    next_id: u64,
    draft: Option<MessageId>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
            draft: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_draft(&self) -> bool {
        self.draft.is_some()
    }

    /// Append a user message. `sent` records whether the transport accepted it.
    pub fn push_user(
        &mut self,
        text: Option<String>,
        image_data: Option<Vec<u8>>,
        sent: bool,
    ) -> MessageId {
        let id = self.alloc_id();
        self.messages.push(Message {
            id,
            is_user: true,
            text,
            image_data,
            is_draft: false,
            sent,
            created_at: SystemTime::now(),
        });
        id
    }

    /// Flip a user message to sent after a successful transport hand-off.
    pub fn mark_sent(&mut self, id: MessageId) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.sent = true;
        }
    }

    /// Append streamed assistant text, opening a draft on the first chunk.
    pub fn append_assistant_chunk(&mut self, chunk: &str) -> MessageId {
        if let Some(id) = self.draft {
            if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
                message
                    .text
                    .get_or_insert_with(String::new)
                    .push_str(chunk);
                return id;
            }
        }
        let id = self.alloc_id();
        self.messages.push(Message {
            id,
            is_user: false,
            text: Some(chunk.to_string()),
            image_data: None,
            is_draft: true,
            sent: false,
            created_at: SystemTime::now(),
        });
        self.draft = Some(id);
        id
    }

    /// Finalize the open draft in place and return its text.
    ///
    /// Returns `None` when no draft is open (a completion without chunks).
    pub fn finalize_draft(&mut self) -> Option<String> {
        let id = self.draft.take()?;
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        message.is_draft = false;
        message.text.clone()
    }

    fn alloc_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }
}
