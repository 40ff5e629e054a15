use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use safechat_db::MessageStore;
use safechat_types::api::Claims;
use safechat_types::events::{RelayCommand, RelayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection may take to identify before it is closed.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single relay WebSocket connection: identify handshake, ready
/// event, then the send/receive loop until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    store: Arc<MessageStore>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("relay client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to relay", username, user_id);

    let ready = RelayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Register this connection's channel with the dispatcher; keep a sender
    // handle for events addressed to this connection alone (errors).
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn_id = dispatcher.register(user_id, tx.clone()).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let store_recv = store.clone();
    let reply_tx = tx;
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RelayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &store_recv, &reply_tx, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                        let _ = reply_tx.send(RelayEvent::Error {
                            message: format!("malformed command: {}", e),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(user_id, conn_id).await;
    info!("{} ({}) disconnected from relay", username, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(i64, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(RelayCommand::Identify { token }) =
                    serde_json::from_str::<RelayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    store: &Arc<MessageStore>,
    reply: &mpsc::UnboundedSender<RelayEvent>,
    cmd: RelayCommand,
) {
    match cmd {
        RelayCommand::Identify { .. } => {} // Already handled during the handshake

        RelayCommand::SendMessage {
            thread_id,
            sender_id,
            receiver_id,
            content,
        } => {
            relay_send_message(
                dispatcher, store, reply, thread_id, sender_id, receiver_id, content,
            )
            .await;
        }
    }
}

/// Persist-then-deliver. A persistence failure aborts delivery: the sender
/// gets an error event on its own connection and no receiver ever sees the
/// message.
pub async fn relay_send_message(
    dispatcher: &Dispatcher,
    store: &Arc<MessageStore>,
    reply: &mpsc::UnboundedSender<RelayEvent>,
    thread_id: String,
    sender_id: i64,
    receiver_id: i64,
    content: String,
) {
    // The relay path never defaults the thread id: a live event always
    // belongs to a UI thread context that already has one.
    if thread_id.is_empty() || content.is_empty() {
        let _ = reply.send(RelayEvent::Error {
            message: "thread_id and content are required".into(),
        });
        return;
    }

    let store_cloned = store.clone();
    let tid = thread_id.clone();
    let body = content.clone();
    let persisted = tokio::task::spawn_blocking(move || {
        store_cloned.persist(Some(&tid), sender_id, receiver_id, &body, None)
    })
    .await;

    let persisted = match persisted {
        Ok(Ok(msg)) => msg,
        Ok(Err(e)) => {
            warn!("relay persist failed for thread {}: {}", thread_id, e);
            let _ = reply.send(RelayEvent::Error {
                message: e.to_string(),
            });
            return;
        }
        Err(e) => {
            warn!("relay persist task failed: {}", e);
            let _ = reply.send(RelayEvent::Error {
                message: "store unavailable".into(),
            });
            return;
        }
    };

    let delivered = dispatcher
        .send_to_user(
            receiver_id,
            RelayEvent::ReceiveMessage {
                thread_id: persisted.thread_id,
                sender_id,
                content,
            },
        )
        .await;

    if delivered == 0 {
        debug!(
            "receiver {} offline, message {} persisted without live delivery",
            receiver_id, persisted.id
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use safechat_db::Database;
    use safechat_types::events::RelayEvent;

    use super::*;

    /// In-memory store with two seeded users (ids 1 and 2).
    fn test_store() -> Arc<MessageStore> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("alice", "alice@example.com", "hash-a").unwrap();
        db.create_user("bob", "bob@example.com", "hash-b").unwrap();
        Arc::new(MessageStore::new(db, safechat_crypto::keys::generate_key()))
    }

    #[tokio::test]
    async fn delivers_plaintext_to_connected_receiver() {
        let dispatcher = Dispatcher::new();
        let store = test_store();

        let (receiver_tx, mut receiver_rx) = mpsc::unbounded_channel();
        dispatcher.register(2, receiver_tx).await;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        relay_send_message(
            &dispatcher,
            &store,
            &reply_tx,
            "t1".into(),
            1,
            2,
            "hello".into(),
        )
        .await;

        match receiver_rx.try_recv().unwrap() {
            RelayEvent::ReceiveMessage {
                thread_id,
                sender_id,
                content,
            } => {
                assert_eq!(thread_id, "t1");
                assert_eq!(sender_id, 1);
                assert_eq!(content, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // No error back to the sender, and the message is durable
        assert!(reply_rx.try_recv().is_err());
        assert_eq!(store.get_thread("t1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_receiver_still_gets_the_message_persisted() {
        let dispatcher = Dispatcher::new();
        let store = test_store();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        relay_send_message(
            &dispatcher,
            &store,
            &reply_tx,
            "t1".into(),
            1,
            2,
            "hello".into(),
        )
        .await;

        // Dropped, not an error
        assert!(reply_rx.try_recv().is_err());
        assert_eq!(store.get_thread("t1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_aborts_delivery() {
        let dispatcher = Dispatcher::new();
        let store = test_store();

        let (receiver_tx, mut receiver_rx) = mpsc::unbounded_channel();
        dispatcher.register(2, receiver_tx).await;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        // User 99 has no row; the store's foreign key rejects the write
        relay_send_message(
            &dispatcher,
            &store,
            &reply_tx,
            "t1".into(),
            99,
            2,
            "hello".into(),
        )
        .await;

        assert!(matches!(
            reply_rx.try_recv().unwrap(),
            RelayEvent::Error { .. }
        ));
        assert!(receiver_rx.try_recv().is_err());
        assert!(store.get_thread("t1").is_err());
    }

    #[tokio::test]
    async fn missing_thread_id_is_rejected_to_sender_only() {
        let dispatcher = Dispatcher::new();
        let store = test_store();

        let (receiver_tx, mut receiver_rx) = mpsc::unbounded_channel();
        dispatcher.register(2, receiver_tx).await;
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        relay_send_message(&dispatcher, &store, &reply_tx, "".into(), 1, 2, "hi".into()).await;

        assert!(matches!(
            reply_rx.try_recv().unwrap(),
            RelayEvent::Error { .. }
        ));
        assert!(receiver_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let dispatcher = Dispatcher::new();
        let store = test_store();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        relay_send_message(&dispatcher, &store, &reply_tx, "t1".into(), 1, 2, "".into()).await;

        assert!(matches!(
            reply_rx.try_recv().unwrap(),
            RelayEvent::Error { .. }
        ));
        assert!(store.get_thread("t1").is_err());
    }
}
