use serde::{Deserialize, Serialize};

/// Commands sent FROM client TO server over the relay socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RelayCommand {
    /// Authenticate the socket with an access token
    Identify { token: String },

    /// Send a message into an existing thread. Unlike the HTTP path, the
    /// relay never defaults the thread id: a live event always comes from a
    /// UI context that already has one.
    SendMessage {
        thread_id: String,
        sender_id: i64,
        receiver_id: i64,
        content: String,
    },
}

/// Events pushed FROM server TO client over the relay socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Server confirms successful authentication
    Ready { user_id: i64, username: String },

    /// A message addressed to this user arrived and was persisted
    ReceiveMessage {
        thread_id: String,
        sender_id: i64,
        content: String,
    },

    /// A command from this connection was rejected; never broadcast
    Error { message: String },
}
