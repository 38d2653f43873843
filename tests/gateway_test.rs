mod common;

use common::{drain, events, test_app};
use realtime_messaging_service::{
    models::{DeliveryStatus, PageRequest},
    repository::ChatRepository,
    reconcile::{LocalTimeline, ReconcileOutcome, SendState},
    websocket::events::ClientFrame,
};
use serde_json::{json, Value};
use std::time::Instant;

fn frame(event: &str, ack_id: Option<&str>, data: Value) -> String {
    serde_json::to_string(&ClientFrame::new(event, ack_id.map(str::to_string), data)).unwrap()
}

#[tokio::test]
async fn test_send_deliver_scenario() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;

    let (conn_a, mut rx_a) = app.connect(alice).await;
    let (conn_b, mut rx_b) = app.connect(bob).await;
    let presence = drain(&mut rx_a);
    assert_eq!(events(&presence), vec!["presence:update"]);
    assert_eq!(presence[0]["data"]["online"], true);
    drain(&mut rx_b);

    // alice sends optimistically
    let mut timeline = LocalTimeline::new(conversation.id);
    let send = timeline.begin_send("hi", Vec::new(), None, Instant::now());
    let client_id = send.ack_id.clone().unwrap();
    app.state
        .gateway
        .handle_text(conn_a, alice, &serde_json::to_string(&send).unwrap())
        .await;

    let to_alice = drain(&mut rx_a);
    assert_eq!(events(&to_alice), vec!["ack"]);
    assert_eq!(to_alice[0]["ackId"], client_id.as_str());
    assert_eq!(to_alice[0]["data"]["status"], "ok");
    let message_id = to_alice[0]["data"]["message"]["id"].as_i64().unwrap();

    let to_bob = drain(&mut rx_b);
    assert_eq!(events(&to_bob), vec!["receiveMessage"]);
    assert_eq!(to_bob[0]["data"]["id"], message_id);
    assert_eq!(to_bob[0]["data"]["clientMessageId"], client_id.as_str());

    let outcome = timeline
        .apply_server_text(&to_alice[0].to_string())
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Replaced);
    assert_eq!(timeline.messages().len(), 1);
    assert_eq!(timeline.messages()[0].state, SendState::Confirmed);

    // bob's client acknowledges delivery
    app.state
        .gateway
        .handle_text(
            conn_b,
            bob,
            &frame(
                "messageDelivered",
                None,
                json!({ "conversationId": conversation.id, "messageId": message_id }),
            ),
        )
        .await;
    assert!(drain(&mut rx_b).is_empty());
    let delivered = drain(&mut rx_a);
    assert_eq!(events(&delivered), vec!["message:delivered"]);
    assert_eq!(delivered[0]["data"]["messageIds"], json!([message_id]));

    let page = app
        .state
        .messages
        .page(alice, conversation.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, message_id);
    assert_eq!(page.messages[0].content, "hi");
    assert_eq!(
        page.messages[0].delivery.as_ref().map(|d| d.status),
        Some(DeliveryStatus::Delivered)
    );

    let bob_page = app
        .state
        .messages
        .page(bob, conversation.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(bob_page.messages.len(), 1);
    assert_eq!(bob_page.messages[0].id, message_id);
}

#[tokio::test]
async fn test_failed_send_is_acked_with_error() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let (conn, mut rx) = app.connect(alice).await;
    drain(&mut rx);

    app.state
        .gateway
        .handle_text(
            conn,
            alice,
            &frame(
                "sendMessage",
                Some("a1"),
                json!({ "conversationId": conversation.id, "content": "   " }),
            ),
        )
        .await;
    let frames = drain(&mut rx);
    assert_eq!(events(&frames), vec!["ack"]);
    assert_eq!(frames[0]["data"]["status"], "error");
    assert_eq!(frames[0]["data"]["code"], "INVALID_REQUEST");
    assert!(frames[0]["data"]["error"].is_string());
}

#[tokio::test]
async fn test_malformed_and_unknown_frames_get_error_event() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    app.direct(alice, bob).await;
    let (conn_a, mut rx_a) = app.connect(alice).await;
    let (_conn_b, mut rx_b) = app.connect(bob).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    app.state.gateway.handle_text(conn_a, alice, "not json").await;
    app.state
        .gateway
        .handle_text(conn_a, alice, &frame("selfDestruct", None, json!({})))
        .await;
    app.state
        .gateway
        .handle_text(conn_a, alice, &frame("typing:start", None, json!({ "wrong": 1 })))
        .await;

    let frames = drain(&mut rx_a);
    assert_eq!(events(&frames), vec!["error", "error", "error"]);
    assert!(frames.iter().all(|f| f["data"]["code"] == "INVALID_REQUEST"));
    assert!(drain(&mut rx_b).is_empty());
}

#[tokio::test]
async fn test_join_conversation_checks_membership() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let mallory = app.user("mallory").await;
    let conversation = app.direct(alice, bob).await;

    let (conn_m, mut rx_m) = app.connect(mallory).await;
    app.state
        .gateway
        .handle_text(
            conn_m,
            mallory,
            &frame(
                "joinConversation",
                Some("j1"),
                json!({ "conversationId": conversation.id }),
            ),
        )
        .await;
    let frames = drain(&mut rx_m);
    assert_eq!(frames[0]["data"]["status"], "error");
    assert_eq!(frames[0]["data"]["code"], "NOT_CONVERSATION_MEMBER");
    assert_eq!(app.state.registry.subscriber_count(conversation.id).await, 0);

    let (conn_a, mut rx_a) = app.connect(alice).await;
    drain(&mut rx_a);
    app.state
        .gateway
        .handle_text(
            conn_a,
            alice,
            &frame(
                "joinConversation",
                Some("j2"),
                json!({ "conversationId": conversation.id }),
            ),
        )
        .await;
    let frames = drain(&mut rx_a);
    assert_eq!(events(&frames), vec!["joinedConversation", "ack"]);
    assert_eq!(frames[1]["data"]["status"], "ok");
    assert!(app.state.registry.is_subscribed(conversation.id, conn_a).await);
}

#[tokio::test]
async fn test_new_conversation_reaches_connected_members() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let (_conn_b, mut rx_b) = app.connect(bob).await;

    let conversation = app.direct(alice, bob).await;
    let frames = drain(&mut rx_b);
    assert_eq!(events(&frames), vec!["conversation:created"]);
    assert_eq!(frames[0]["data"]["id"], conversation.id.to_string());
}

#[tokio::test]
async fn test_typing_is_relayed_to_others_only() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let (conn_a, mut rx_a) = app.connect(alice).await;
    let (_conn_b, mut rx_b) = app.connect(bob).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    let data = json!({ "conversationId": conversation.id });
    app.state
        .gateway
        .handle_text(conn_a, alice, &frame("typing:start", None, data.clone()))
        .await;
    assert!(app.state.gateway.typing().is_typing(conversation.id, alice).await);
    app.state
        .gateway
        .handle_text(conn_a, alice, &frame("typing:stop", None, data))
        .await;

    assert!(drain(&mut rx_a).is_empty());
    let frames = drain(&mut rx_b);
    assert_eq!(events(&frames), vec!["typing:start", "typing:stop"]);
    assert_eq!(frames[0]["data"]["userId"], alice.to_string());
    assert!(!app.state.gateway.typing().is_typing(conversation.id, alice).await);
}

#[tokio::test]
async fn test_reaction_ack_and_room_broadcasts() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let (conn_a, mut rx_a) = app.connect(alice).await;
    let (conn_b, mut rx_b) = app.connect(bob).await;

    app.state
        .gateway
        .handle_text(
            conn_a,
            alice,
            &frame(
                "sendMessage",
                Some("s1"),
                json!({ "conversationId": conversation.id, "content": "hi", "clientMessageId": "s1" }),
            ),
        )
        .await;
    let message_id = drain(&mut rx_a)
        .into_iter()
        .find(|f| f["event"] == "ack")
        .and_then(|f| f["data"]["message"]["id"].as_i64())
        .unwrap();
    drain(&mut rx_b);

    app.state
        .gateway
        .handle_text(
            conn_b,
            bob,
            &frame(
                "reactToMessage",
                Some("r1"),
                json!({ "messageId": message_id, "emoji": "🔥" }),
            ),
        )
        .await;

    let to_bob = drain(&mut rx_b);
    assert_eq!(events(&to_bob), vec!["ack"]);
    assert_eq!(to_bob[0]["data"]["reaction"]["toggledOn"], true);
    assert_eq!(to_bob[0]["data"]["reaction"]["summary"]["groups"][0]["count"], 1);

    let to_alice = drain(&mut rx_a);
    assert_eq!(events(&to_alice), vec!["message:reaction", "reaction:updated"]);
    assert_eq!(to_alice[1]["data"]["groups"][0]["emoji"], "🔥");
    assert_eq!(to_alice[1]["data"]["groups"][0]["users"], json!([bob]));
}

#[tokio::test]
async fn test_last_disconnect_goes_offline() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    app.direct(alice, bob).await;
    let (_conn_a, mut rx_a) = app.connect(alice).await;
    let (phone, _rx_phone) = app.connect(bob).await;
    let (laptop, _rx_laptop) = app.connect(bob).await;
    drain(&mut rx_a);

    app.state.gateway.disconnect(phone, bob).await;
    assert!(drain(&mut rx_a).is_empty());

    app.state.gateway.disconnect(laptop, bob).await;
    let frames = drain(&mut rx_a);
    assert_eq!(events(&frames), vec!["presence:update"]);
    assert_eq!(frames[0]["data"]["userId"], bob.to_string());
    assert_eq!(frames[0]["data"]["online"], false);
    assert_eq!(app.state.registry.user_connection_count(bob).await, 0);
}

#[tokio::test]
async fn test_read_receipt_event_marks_whole_conversation() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let (_conn_a, mut rx_a) = app.connect(alice).await;
    let (conn_b, mut rx_b) = app.connect(bob).await;

    for content in ["one", "two"] {
        app.state
            .messages
            .append(
                alice,
                realtime_messaging_service::services::SendMessageRequest {
                    conversation_id: conversation.id,
                    content: Some(content.into()),
                    attachments: Vec::new(),
                    replied_to_id: None,
                    client_message_id: None,
                },
                None,
            )
            .await
            .unwrap();
    }
    drain(&mut rx_a);
    drain(&mut rx_b);

    app.state
        .gateway
        .handle_text(
            conn_b,
            bob,
            &frame(
                "messageRead",
                Some("read-1"),
                json!({ "conversationId": conversation.id }),
            ),
        )
        .await;

    let ack = drain(&mut rx_b);
    assert_eq!(ack[0]["data"]["receipt"]["status"], "read");
    assert_eq!(ack[0]["data"]["receipt"]["messageIds"].as_array().unwrap().len(), 2);
    let frames = drain(&mut rx_a);
    assert_eq!(events(&frames), vec!["message:read"]);
}

#[tokio::test]
async fn test_inbound_frames_are_handled_in_arrival_order() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let (conn, mut rx) = app.connect(alice).await;
    drain(&mut rx);

    let inbound = app.state.gateway.spawn_inbound(conn, alice);
    for i in 0..20 {
        inbound
            .send(frame(
                "sendMessage",
                Some(&format!("a{i}")),
                json!({
                    "conversationId": conversation.id,
                    "content": format!("m{i}"),
                    "clientMessageId": format!("c{i}"),
                }),
            ))
            .unwrap();
    }

    let mut ack_ids = Vec::new();
    while ack_ids.len() < 20 {
        let text = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("ack in time")
            .expect("connection open");
        let frame: Value = serde_json::from_str(&text).unwrap();
        if frame["event"] == "ack" {
            assert_eq!(frame["data"]["status"], "ok");
            ack_ids.push(frame["ackId"].as_str().unwrap().to_string());
        }
    }
    let expected: Vec<String> = (0..20).map(|i| format!("a{i}")).collect();
    assert_eq!(ack_ids, expected);

    let page = app
        .state
        .messages
        .page(
            alice,
            conversation.id,
            PageRequest::new(None, None, Some(50), Some(false)),
        )
        .await
        .unwrap();
    let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn test_concurrent_device_connects_announce_online_once() {
    let app = test_app();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;
    let conversation = app.direct(alice, bob).await;
    let (_conn_a, mut rx_a) = app.connect(alice).await;
    drain(&mut rx_a);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gateway = app.state.gateway.clone();
            tokio::spawn(async move { gateway.connect(bob).await.unwrap() })
        })
        .collect();
    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap());
    }

    let frames = drain(&mut rx_a);
    assert_eq!(events(&frames), vec!["presence:update"]);
    assert_eq!(frames[0]["data"]["online"], true);
    let participant = app
        .state
        .repo
        .get_participant(conversation.id, bob)
        .await
        .unwrap()
        .unwrap();
    assert!(participant.online);
    assert_eq!(app.state.registry.user_connection_count(bob).await, 8);
}
