mod common;

use common::test_app;
use realtime_messaging_service::{
    error::AppError,
    models::{Attachment, AttachmentKind, DeliveryStatus, PageDirection, PageRequest},
    services::{MessageTarget, SendMessageRequest},
};
use std::collections::HashSet;
use uuid::Uuid;

fn send(conversation_id: Uuid, content: &str, client_id: Option<&str>) -> SendMessageRequest {
    SendMessageRequest {
        conversation_id,
        content: Some(content.to_string()),
        attachments: Vec::new(),
        replied_to_id: None,
        client_message_id: client_id.map(str::to_string),
    }
}

#[tokio::test]
async fn test_append_requires_participant() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let mallory = app.user("mallory").await;
    let conversation = app.direct(alice, bob).await;

    let err = app
        .state
        .messages
        .append(mallory, send(conversation.id, "hi", None), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotParticipant));
}

#[tokio::test]
async fn test_cursor_ids_strictly_increase_across_deletes() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let mut last = 0;
    for i in 0..5 {
        let message = app
            .state
            .messages
            .append(alice, send(conversation.id, &format!("m{i}"), None), None)
            .await
            .unwrap();
        assert!(message.id > last);
        last = message.id;
        if i % 2 == 0 {
            app.state
                .messages
                .soft_delete(alice, message.id, None)
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_client_message_id_is_echoed_and_idempotent() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let first = app
        .state
        .messages
        .append(alice, send(conversation.id, "hi", Some("c1")), None)
        .await
        .unwrap();
    let retry = app
        .state
        .messages
        .append(alice, send(conversation.id, "hi", Some("c1")), None)
        .await
        .unwrap();
    assert_eq!(first.client_message_id.as_deref(), Some("c1"));
    assert_eq!(first.id, retry.id);
    assert_eq!(first.sender.username, "alice");

    let page = app
        .state
        .messages
        .page(bob, conversation.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
}

#[tokio::test]
async fn test_backward_pagination_round_trip() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let mut all = Vec::new();
    for i in 0..7 {
        let m = app
            .state
            .messages
            .append(alice, send(conversation.id, &format!("m{i}"), None), None)
            .await
            .unwrap();
        all.push(m.id);
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = app
            .state
            .messages
            .page(
                bob,
                conversation.id,
                PageRequest::new(cursor, None, Some(3), Some(false)),
            )
            .await
            .unwrap();
        let ids: Vec<i64> = page.messages.iter().map(|m| m.id).collect();
        // every page is chronological
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        seen.splice(0..0, ids);
        cursor = page.page_info.next_cursor;
        if !page.page_info.has_more {
            break;
        }
    }
    assert_eq!(seen, all);
    let unique: HashSet<i64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), all.len());
}

#[tokio::test]
async fn test_forward_pagination_and_empty_page_cursor() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(
            app.state
                .messages
                .append(alice, send(conversation.id, &format!("m{i}"), None), None)
                .await
                .unwrap()
                .id,
        );
    }

    let page = app
        .state
        .messages
        .page(
            bob,
            conversation.id,
            PageRequest::new(Some(ids[0]), Some(PageDirection::Forward), Some(2), Some(false)),
        )
        .await
        .unwrap();
    let got: Vec<i64> = page.messages.iter().map(|m| m.id).collect();
    assert_eq!(got, vec![ids[1], ids[2]]);
    assert!(page.page_info.has_more);
    assert_eq!(page.page_info.next_cursor, Some(ids[2]));
    assert_eq!(page.page_info.direction, PageDirection::Forward);

    let tail = app
        .state
        .messages
        .page(
            bob,
            conversation.id,
            PageRequest::new(Some(ids[3]), Some(PageDirection::Forward), Some(2), Some(false)),
        )
        .await
        .unwrap();
    assert!(tail.messages.is_empty());
    assert!(!tail.page_info.has_more);
    assert_eq!(tail.page_info.next_cursor, Some(ids[3]));
}

#[tokio::test]
async fn test_edit_rules() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let message = app
        .state
        .messages
        .append(alice, send(conversation.id, "draft", Some("c-edit")), None)
        .await
        .unwrap();

    let err = app
        .state
        .messages
        .edit(bob, MessageTarget::Id(message.id), "hijack", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let edited = app
        .state
        .messages
        .edit(
            alice,
            MessageTarget::Client {
                conversation_id: conversation.id,
                client_message_id: "c-edit".into(),
            },
            "final",
            None,
        )
        .await
        .unwrap();
    assert_eq!(edited.id, message.id);
    assert_eq!(edited.content, "final");
    assert!(edited.edited_at.is_some());

    app.state
        .messages
        .soft_delete(alice, message.id, None)
        .await
        .unwrap();
    let err = app
        .state
        .messages
        .edit(alice, MessageTarget::Id(message.id), "again", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MessageDeleted));
}

#[tokio::test]
async fn test_soft_delete_hides_message_and_tombstones_replies() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let original = app
        .state
        .messages
        .append(alice, send(conversation.id, "question", None), None)
        .await
        .unwrap();
    let mut reply = send(conversation.id, "answer", None);
    reply.replied_to_id = Some(original.id);
    let reply = app.state.messages.append(bob, reply, None).await.unwrap();
    assert_eq!(
        reply.replied_to.as_ref().map(|r| r.content.as_str()),
        Some("question")
    );

    let err = app
        .state
        .messages
        .soft_delete(bob, original.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    app.state
        .messages
        .soft_delete(alice, original.id, None)
        .await
        .unwrap();

    let page = app
        .state
        .messages
        .page(alice, conversation.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    let preview = page.messages[0].replied_to.as_ref().unwrap();
    assert!(preview.is_deleted);
    assert!(preview.content.is_empty());

    // the conversation's last message falls back past the deleted one
    let list = app.state.conversations.list_for_user(alice).await.unwrap();
    assert_eq!(list[0].last_message.as_ref().map(|m| m.id), Some(reply.id));

    // a deleted message cannot be replied to
    let mut late = send(conversation.id, "late", None);
    late.replied_to_id = Some(original.id);
    let err = app.state.messages.append(bob, late, None).await.unwrap_err();
    assert!(matches!(err, AppError::MessageDeleted));
}

#[tokio::test]
async fn test_attachment_only_message() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let mut request = send(conversation.id, "", None);
    request.content = None;
    request.attachments.push(Attachment {
        url: "https://cdn.example.com/cat.gif".into(),
        mime: "image/gif".into(),
        name: Some("cat.gif".into()),
        size: None,
        kind: AttachmentKind::Gif,
    });
    let message = app.state.messages.append(alice, request, None).await.unwrap();
    assert!(message.content.is_empty());
    assert_eq!(message.attachments.len(), 1);
}

#[tokio::test]
async fn test_page_load_marks_messages_delivered_without_downgrading_read() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let first = app
        .state
        .messages
        .append(alice, send(conversation.id, "one", None), None)
        .await
        .unwrap();
    app.state
        .delivery
        .mark_read(bob, conversation.id, None)
        .await
        .unwrap();
    let second = app
        .state
        .messages
        .append(alice, send(conversation.id, "two", None), None)
        .await
        .unwrap();

    // bob opens the conversation
    app.state
        .messages
        .page(bob, conversation.id, PageRequest::default())
        .await
        .unwrap();

    let page = app
        .state
        .messages
        .page(alice, conversation.id, PageRequest::default())
        .await
        .unwrap();
    let status_of = |id: i64| {
        page.messages
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.delivery.as_ref())
            .map(|d| d.status)
    };
    assert_eq!(status_of(first.id), Some(DeliveryStatus::Read));
    assert_eq!(status_of(second.id), Some(DeliveryStatus::Delivered));
}

#[tokio::test]
async fn test_pinned_messages() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let message = app
        .state
        .messages
        .append(alice, send(conversation.id, "remember this", None), None)
        .await
        .unwrap();

    let pin = app
        .state
        .messages
        .pin_message(bob, message.id, None)
        .await
        .unwrap();
    assert_eq!(pin.pinned_by, bob);

    let pins = app
        .state
        .messages
        .pinned_messages(alice, conversation.id)
        .await
        .unwrap();
    assert_eq!(pins.len(), 1);
    assert!(pins[0].message.pinned);

    app.state
        .messages
        .soft_delete(alice, message.id, None)
        .await
        .unwrap();
    let err = app
        .state
        .messages
        .pin_message(bob, message.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MessageDeleted));
    assert!(app
        .state
        .messages
        .pinned_messages(alice, conversation.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_group_owner_cannot_delete_members_messages() {
    let app = test_app();
    let owner = app.user("owner").await;
    let bob = app.user("bob").await;
    let carol = app.user("carol").await;
    let group = app.group(owner, &[bob, carol]).await;
    let message = app
        .state
        .messages
        .append(bob, send(group.id, "mine", None), None)
        .await
        .unwrap();

    let err = app
        .state
        .messages
        .soft_delete(owner, message.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let page = app
        .state
        .messages
        .page(owner, group.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].content, "mine");

    let deleted = app
        .state
        .messages
        .soft_delete(bob, message.id, None)
        .await
        .unwrap();
    assert!(deleted.is_deleted);
}
