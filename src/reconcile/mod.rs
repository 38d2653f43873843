//! Client-side reconciliation of optimistic sends.
//!
//! A send is shown immediately as a local placeholder keyed by its
//! `clientMessageId`. The server answers twice for the same message in some
//! setups (the ack and a room broadcast reaching another device of the sender);
//! whichever arrives first replaces the placeholder in place, the other is
//! detected as a duplicate.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::models::{Attachment, MessageView};
use crate::services::SendMessageRequest;
use crate::websocket::events::{AckFrame, ClientFrame};
use crate::websocket::ServerEvent;

/// How long a send may wait for its ack before it is marked failed.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub client_message_id: Option<String>,
    pub state: SendState,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub replied_to_id: Option<i64>,
    /// Transmissions of a local send; zero for messages received from the server.
    pub attempts: u32,
    /// Server record once confirmed.
    pub server: Option<MessageView>,
}

impl LocalMessage {
    pub fn server_id(&self) -> Option<i64> {
        self.server.as_ref().map(|m| m.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A local placeholder was swapped for the server record.
    Replaced,
    /// A message not sent from here was added.
    Appended,
    /// The server record was already applied.
    Duplicate,
    /// Nothing relevant to this timeline.
    Ignored,
    /// The send was rejected; the placeholder is now failed.
    Rejected,
}

#[derive(Debug)]
struct PendingSend {
    sent_at: Instant,
}

/// Local view of one conversation for one user.
#[derive(Debug)]
pub struct LocalTimeline {
    conversation_id: Uuid,
    messages: Vec<LocalMessage>,
    pending: HashMap<String, PendingSend>,
    applied: HashSet<i64>,
    ack_timeout: Duration,
}

impl LocalTimeline {
    pub fn new(conversation_id: Uuid) -> Self {
        Self::with_ack_timeout(conversation_id, DEFAULT_ACK_TIMEOUT)
    }

    pub fn with_ack_timeout(conversation_id: Uuid, ack_timeout: Duration) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            pending: HashMap::new(),
            applied: HashSet::new(),
            ack_timeout,
        }
    }

    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn find(&self, client_message_id: &str) -> Option<&LocalMessage> {
        self.messages
            .iter()
            .find(|m| m.client_message_id.as_deref() == Some(client_message_id))
    }

    /// Loads server history (a page), skipping records already present.
    pub fn load_history(&mut self, page: Vec<MessageView>) {
        for view in page {
            self.apply_server_message(view);
        }
    }

    /// Inserts the placeholder and returns the `sendMessage` frame to transmit.
    /// The `clientMessageId` doubles as the frame's `ackId`.
    pub fn begin_send(
        &mut self,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        replied_to_id: Option<i64>,
        now: Instant,
    ) -> ClientFrame {
        let client_message_id = Uuid::new_v4().to_string();
        let local = LocalMessage {
            client_message_id: Some(client_message_id.clone()),
            state: SendState::Pending,
            content: content.into(),
            attachments,
            replied_to_id,
            attempts: 1,
            server: None,
        };
        let frame = self.send_frame(&local, &client_message_id);
        self.messages.push(local);
        self.pending
            .insert(client_message_id, PendingSend { sent_at: now });
        frame
    }

    fn send_frame(&self, local: &LocalMessage, client_message_id: &str) -> ClientFrame {
        let request = SendMessageRequest {
            conversation_id: self.conversation_id,
            content: Some(local.content.clone()),
            attachments: local.attachments.clone(),
            replied_to_id: local.replied_to_id,
            client_message_id: Some(client_message_id.to_string()),
        };
        ClientFrame::new(
            "sendMessage",
            Some(client_message_id.to_string()),
            serde_json::to_value(request).unwrap_or(Value::Null),
        )
    }

    /// Applies an ack for one of our sends.
    pub fn apply_ack(&mut self, ack: &AckFrame) -> ReconcileOutcome {
        if !ack.is_ok() {
            return self.apply_ack_error(&ack.ack_id);
        }
        match ack
            .data
            .get("message")
            .cloned()
            .map(serde_json::from_value::<MessageView>)
        {
            Some(Ok(view)) => self.apply_server_message(view),
            _ => ReconcileOutcome::Ignored,
        }
    }

    pub fn apply_ack_error(&mut self, client_message_id: &str) -> ReconcileOutcome {
        if self.pending.remove(client_message_id).is_none() {
            return ReconcileOutcome::Ignored;
        }
        match self.local_mut(client_message_id) {
            Some(local) if local.state == SendState::Pending => {
                local.state = SendState::Failed;
                ReconcileOutcome::Rejected
            }
            _ => ReconcileOutcome::Ignored,
        }
    }

    /// Applies a `receiveMessage` broadcast.
    pub fn apply_broadcast(&mut self, view: MessageView) -> ReconcileOutcome {
        self.apply_server_message(view)
    }

    /// Parses one server text frame and applies it when relevant.
    pub fn apply_server_text(&mut self, text: &str) -> Result<ReconcileOutcome, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("event").and_then(Value::as_str) == Some("ack") {
            let ack: AckFrame = serde_json::from_value(value)?;
            return Ok(self.apply_ack(&ack));
        }
        Ok(match serde_json::from_value::<ServerEvent>(value) {
            Ok(ServerEvent::ReceiveMessage(view)) => self.apply_broadcast(view),
            _ => ReconcileOutcome::Ignored,
        })
    }

    fn apply_server_message(&mut self, view: MessageView) -> ReconcileOutcome {
        if view.conversation_id != self.conversation_id {
            return ReconcileOutcome::Ignored;
        }
        if !self.applied.insert(view.id) {
            return ReconcileOutcome::Duplicate;
        }

        if let Some(client_id) = view.client_message_id.clone() {
            if let Some(local) = self.local_mut(&client_id) {
                if local.server.is_none() {
                    local.state = SendState::Confirmed;
                    local.content = view.content.clone();
                    local.server = Some(view);
                    self.pending.remove(&client_id);
                    return ReconcileOutcome::Replaced;
                }
            }
        }

        self.messages.push(LocalMessage {
            client_message_id: view.client_message_id.clone(),
            state: SendState::Confirmed,
            content: view.content.clone(),
            attachments: view.attachments.clone(),
            replied_to_id: view.replied_to.as_ref().map(|r| r.id),
            attempts: 0,
            server: Some(view),
        });
        ReconcileOutcome::Appended
    }

    fn local_mut(&mut self, client_message_id: &str) -> Option<&mut LocalMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.client_message_id.as_deref() == Some(client_message_id))
    }

    /// Marks sends whose ack is overdue as failed. Returns their client ids.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.ack_timeout;
        let overdue: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &overdue {
            self.pending.remove(id);
            if let Some(local) = self.local_mut(id) {
                local.state = SendState::Failed;
            }
        }
        overdue
    }

    /// Re-arms a failed send with the same `clientMessageId`, so a late server
    /// record still reconciles onto the same placeholder.
    pub fn retry(&mut self, client_message_id: &str, now: Instant) -> Option<ClientFrame> {
        let local = self.local_mut(client_message_id)?;
        if local.state != SendState::Failed {
            return None;
        }
        local.state = SendState::Pending;
        local.attempts += 1;
        let local = local.clone();

        self.pending
            .insert(client_message_id.to_string(), PendingSend { sent_at: now });
        Some(self.send_frame(&local, client_message_id))
    }
}
