//! Database row types — these map directly to SQLite rows.
//! Distinct from safechat-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub mfa_secret: Option<String>,
    pub is_admin: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub thread_id: String,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub file_url: Option<String>,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub is_read: bool,
}
