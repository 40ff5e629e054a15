use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted message as reported back by the store after a successful
/// write. Content is omitted: the store hands out plaintext only through
/// thread reads, never through the persistence acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub thread_id: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One entry of an ordered conversation, already decrypted for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadEntry {
    pub sender: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}
