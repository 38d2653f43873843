//! Per-connection protocol handling, independent of the transport actor.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use uuid::Uuid;

use super::events::{AckFrame, ClientEvent, ClientFrame, ReactionAck, ReceiptPayload};
use super::presence::TypingTracker;
use super::{Broadcaster, ConnectionId, ConnectionRegistry, ServerEvent};
use crate::error::{AppError, AppResult};
use crate::middleware::guards::ConversationMember;
use crate::models::DeliveryStatus;
use crate::repository::ChatRepository;
use crate::services::{DeliveryService, MessageService, ReactionService};

/// Realtime gateway
///
/// `connect` authenticates nothing itself: the transport verifies the bearer token
/// first and only then hands over the user id. From there a connection is joined
/// to every conversation room of the user, processes client frames through
/// `handle_text`, and is torn down with `disconnect`.
#[derive(Clone)]
pub struct Gateway {
    repo: Arc<dyn ChatRepository>,
    registry: ConnectionRegistry,
    typing: TypingTracker,
    messages: MessageService,
    delivery: DeliveryService,
    reactions: ReactionService,
}

impl Gateway {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        registry: ConnectionRegistry,
        typing: TypingTracker,
        messages: MessageService,
        delivery: DeliveryService,
        reactions: ReactionService,
    ) -> Self {
        Self {
            repo,
            registry,
            typing,
            messages,
            delivery,
            reactions,
        }
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.typing
    }

    /// Registers the connection and joins it to all of the user's rooms. On failure
    /// the connection is unregistered again so no partial state survives.
    #[tracing::instrument(skip(self))]
    pub async fn connect(
        &self,
        user_id: Uuid,
    ) -> AppResult<(ConnectionId, UnboundedReceiver<String>)> {
        let (conn, rx, first) = self.registry.register(user_id).await;
        match self.join_all(conn, user_id, first).await {
            Ok(rooms) => {
                tracing::info!(connection_id = %conn, rooms, "connection authenticated");
                Ok((conn, rx))
            }
            Err(e) => {
                self.registry.unregister(conn).await;
                Err(e)
            }
        }
    }

    async fn join_all(&self, conn: ConnectionId, user_id: Uuid, first: bool) -> AppResult<usize> {
        let rooms = self.repo.conversation_ids_for_user(user_id).await?;
        for room in &rooms {
            self.registry.join(*room, conn).await;
            self.typing.ensure_sweep(*room).await;
        }

        if first {
            let rooms = self.repo.set_online(user_id, true).await?;
            self.announce_presence(user_id, true, &rooms, Some(conn))
                .await;
        }
        Ok(rooms.len())
    }

    async fn announce_presence(
        &self,
        user_id: Uuid,
        online: bool,
        rooms: &[Uuid],
        except: Option<ConnectionId>,
    ) {
        for room in rooms {
            self.registry
                .emit(*room, ServerEvent::PresenceUpdate { user_id, online }, except)
                .await;
        }
    }

    /// Starts the connection's inbound worker. Frames pushed into the returned
    /// sender are handled one at a time in arrival order, so two sends from one
    /// socket are stored in the order the client issued them. The worker drains
    /// what is queued and exits once the sender is dropped.
    pub fn spawn_inbound(&self, conn: ConnectionId, user_id: Uuid) -> UnboundedSender<String> {
        let (tx, mut rx) = unbounded_channel::<String>();
        let gateway = self.clone();
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                gateway.handle_text(conn, user_id, &text).await;
            }
            tracing::debug!(connection_id = %conn, "inbound worker finished");
        });
        tx
    }

    /// Connection closed. Leaves every room, stops sweeps of rooms nobody watches
    /// anymore, and clears presence once the user's last connection is gone.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, conn: ConnectionId, user_id: Uuid) {
        let rooms = self.registry.unregister(conn).await;
        for room in &rooms {
            if self.registry.subscriber_count(*room).await == 0 {
                self.typing.stop_sweep(*room).await;
            }
        }

        if self.registry.user_connection_count(user_id).await > 0 {
            return;
        }

        for room in self.typing.clear_user(user_id).await {
            self.registry
                .emit(
                    room,
                    ServerEvent::TypingStop {
                        conversation_id: room,
                        user_id,
                    },
                    None,
                )
                .await;
        }
        match self.repo.set_online(user_id, false).await {
            Ok(rooms) => self.announce_presence(user_id, false, &rooms, None).await,
            Err(e) => tracing::warn!(error = %e, %user_id, "failed to clear presence"),
        }
        tracing::info!(connection_id = %conn, "connection closed");
    }

    /// Processes one client text frame. Every reply (ack, error or direct event) is
    /// written to the connection's own channel; nothing is raised to the transport.
    pub async fn handle_text(&self, conn: ConnectionId, user_id: Uuid, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                let err = AppError::Validation(format!("malformed frame: {e}"));
                self.send_event(conn, &ServerEvent::error(&err)).await;
                return;
            }
        };

        let result = match ClientEvent::decode(&frame) {
            Ok(event) => self.dispatch(conn, user_id, event).await,
            Err(e) => Err(e),
        };

        match (frame.ack_id, result) {
            (Some(ack_id), Ok(body)) => self.send_ack(conn, AckFrame::ok(ack_id, body)).await,
            (Some(ack_id), Err(e)) => {
                tracing::debug!(event = %frame.event, error = %e, "event failed");
                self.send_ack(conn, AckFrame::error(ack_id, &e)).await
            }
            (None, Ok(_)) => {}
            (None, Err(e)) => {
                tracing::debug!(event = %frame.event, error = %e, "event failed");
                self.send_event(conn, &ServerEvent::error(&e)).await
            }
        }
    }

    async fn dispatch(
        &self,
        conn: ConnectionId,
        user_id: Uuid,
        event: ClientEvent,
    ) -> AppResult<Value> {
        match event {
            ClientEvent::JoinConversation(target) => {
                let conversation_id = target.conversation_id;
                ConversationMember::verify(self.repo.as_ref(), user_id, conversation_id).await?;
                self.registry.join(conversation_id, conn).await;
                self.typing.ensure_sweep(conversation_id).await;
                self.send_event(conn, &ServerEvent::JoinedConversation { conversation_id })
                    .await;
                Ok(serde_json::json!({ "conversationId": conversation_id }))
            }
            ClientEvent::SendMessage(request) => {
                let message = self.messages.append(user_id, request, Some(conn)).await?;
                Ok(serde_json::json!({ "message": to_value(&message)? }))
            }
            ClientEvent::MessageDelivered(payload) => {
                self.receipt(conn, user_id, payload, DeliveryStatus::Delivered)
                    .await
            }
            ClientEvent::MessageRead(payload) => {
                self.receipt(conn, user_id, payload, DeliveryStatus::Read)
                    .await
            }
            ClientEvent::ReactToMessage(payload) => {
                let toggle = self
                    .reactions
                    .set_reaction(user_id, payload.message_id, &payload.emoji, Some(conn))
                    .await?;
                to_value(&ReactionAck::from(toggle))
            }
            ClientEvent::TypingStart(target) => {
                let conversation_id = target.conversation_id;
                self.require_subscribed(conversation_id, conn).await?;
                self.typing
                    .touch(conversation_id, user_id, Instant::now())
                    .await;
                self.registry
                    .emit(
                        conversation_id,
                        ServerEvent::TypingStart {
                            conversation_id,
                            user_id,
                        },
                        Some(conn),
                    )
                    .await;
                Ok(Value::Object(Default::default()))
            }
            ClientEvent::TypingStop(target) => {
                let conversation_id = target.conversation_id;
                self.require_subscribed(conversation_id, conn).await?;
                self.typing.clear(conversation_id, user_id).await;
                self.registry
                    .emit(
                        conversation_id,
                        ServerEvent::TypingStop {
                            conversation_id,
                            user_id,
                        },
                        Some(conn),
                    )
                    .await;
                Ok(Value::Object(Default::default()))
            }
        }
    }

    async fn receipt(
        &self,
        conn: ConnectionId,
        user_id: Uuid,
        payload: ReceiptPayload,
        status: DeliveryStatus,
    ) -> AppResult<Value> {
        let batch = match payload.message_id {
            Some(message_id) => {
                self.delivery
                    .mark_message(user_id, payload.conversation_id, message_id, status, Some(conn))
                    .await?
            }
            None => {
                self.delivery
                    .mark_conversation(user_id, payload.conversation_id, status, Some(conn))
                    .await?
            }
        };
        Ok(serde_json::json!({ "receipt": to_value(&batch)? }))
    }

    /// Typing is only relayed for rooms the connection already joined, which in
    /// turn required membership.
    async fn require_subscribed(&self, room: Uuid, conn: ConnectionId) -> AppResult<()> {
        if self.registry.is_subscribed(room, conn).await {
            Ok(())
        } else {
            Err(AppError::NotParticipant)
        }
    }

    async fn send_event(&self, conn: ConnectionId, event: &ServerEvent) {
        match event.to_frame() {
            Ok(frame) => {
                self.registry.send_to(conn, frame).await;
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize event"),
        }
    }

    async fn send_ack(&self, conn: ConnectionId, ack: AckFrame) {
        match ack.to_frame() {
            Ok(frame) => {
                self.registry.send_to(conn, frame).await;
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize ack"),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize ack body");
        AppError::Internal
    })
}
