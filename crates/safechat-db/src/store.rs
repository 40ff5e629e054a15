use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use safechat_types::models::{StoredMessage, ThreadEntry};

use crate::Database;
use crate::error::{Result, StoreError};
use crate::models::MessageRow;

/// Durable message persistence with content encryption.
///
/// The store is the only component that touches ciphertext: callers hand in
/// plaintext and get plaintext back. Bodies are encrypted with the
/// process-wide AES-256-GCM key (fresh random nonce per message) before any
/// row is written, and each write is a single statement under the connection
/// lock, so a message either appears whole with its timestamp or not at all.
pub struct MessageStore {
    db: Arc<Database>,
    key: [u8; 32],
}

impl MessageStore {
    pub fn new(db: Arc<Database>, key: [u8; 32]) -> Self {
        Self { db, key }
    }

    /// Persist a message. An empty or absent `thread_id` starts a new
    /// conversation under a freshly generated identifier; that branch is part
    /// of the contract, not a hidden default.
    ///
    /// Fails with `StoreError::Validation` when there is neither content nor
    /// an attached file reference.
    pub fn persist(
        &self,
        thread_id: Option<&str>,
        sender_id: i64,
        receiver_id: i64,
        plaintext: &str,
        file_url: Option<&str>,
    ) -> Result<StoredMessage> {
        if plaintext.is_empty() && file_url.is_none() {
            return Err(StoreError::Validation("message needs content or a file"));
        }

        let thread_id = match thread_id {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let (ciphertext, nonce) =
            safechat_crypto::encrypt::encrypt_message(&self.key, plaintext.as_bytes())
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let timestamp = Utc::now();
        let created_at = timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);

        let id = self.db.insert_message(
            &thread_id,
            sender_id,
            receiver_id,
            &ciphertext,
            &nonce,
            file_url,
            &created_at,
        )?;

        debug!("Persisted message {} in thread {}", id, thread_id);

        Ok(StoredMessage {
            id,
            thread_id,
            sender_id,
            receiver_id,
            file_url: file_url.map(str::to_string),
            timestamp,
        })
    }

    /// Decrypt a stored row back to its plaintext body.
    pub fn decrypt(&self, row: &MessageRow) -> Result<String> {
        let plaintext =
            safechat_crypto::encrypt::decrypt_message(&self.key, &row.ciphertext, &row.nonce)
                .map_err(|e| StoreError::Decryption(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| StoreError::Decryption(e.to_string()))
    }

    /// The ordered conversation for `thread_id`, oldest first.
    ///
    /// An identifier with no messages is `StoreError::NotFound` — reportable
    /// to the caller, not a defect.
    pub fn get_thread(&self, thread_id: &str) -> Result<Vec<ThreadEntry>> {
        let rows = self.db.thread_messages(thread_id)?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("thread {}", thread_id)));
        }

        rows.iter()
            .map(|row| {
                Ok(ThreadEntry {
                    sender: row.sender_id,
                    content: self.decrypt(row)?,
                    timestamp: parse_timestamp(row),
                    file_url: row.file_url.clone(),
                })
            })
            .collect()
    }
}

fn parse_timestamp(row: &MessageRow) -> DateTime<Utc> {
    row.created_at
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|e| {
            warn!(
                "Corrupt created_at '{}' on message {}: {}",
                row.created_at, row.id, e
            );
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    /// In-memory store with two seeded users (ids 1 and 2).
    fn test_store() -> MessageStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("alice", "alice@example.com", "hash-a").unwrap();
        db.create_user("bob", "bob@example.com", "hash-b").unwrap();
        MessageStore::new(db, safechat_crypto::keys::generate_key())
    }

    #[test]
    fn persist_get_thread_roundtrip() {
        let store = test_store();

        store.persist(Some("t1"), 1, 2, "hello", None).unwrap();

        let thread = store.get_thread("t1").unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].sender, 1);
        assert_eq!(thread[0].content, "hello");
    }

    #[test]
    fn empty_thread_id_starts_fresh_conversation() {
        let store = test_store();

        let msg = store.persist(Some(""), 1, 2, "hello", None).unwrap();
        assert!(Uuid::parse_str(&msg.thread_id).is_ok());

        let thread = store.get_thread(&msg.thread_id).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].sender, 1);
        assert_eq!(thread[0].content, "hello");
    }

    #[test]
    fn absent_thread_ids_never_collide() {
        let store = test_store();

        let first = store.persist(None, 1, 2, "one", None).unwrap();
        let second = store.persist(None, 1, 2, "two", None).unwrap();
        assert_ne!(first.thread_id, second.thread_id);
    }

    #[test]
    fn rejects_message_with_no_content_and_no_file() {
        let store = test_store();

        let err = store.persist(Some("t1"), 1, 2, "", None).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.get_thread("t1").is_err());
    }

    #[test]
    fn file_only_message_is_valid() {
        let store = test_store();

        store
            .persist(Some("t1"), 1, 2, "", Some("/uploads/photo.png"))
            .unwrap();

        let thread = store.get_thread("t1").unwrap();
        assert_eq!(thread[0].content, "");
        assert_eq!(thread[0].file_url.as_deref(), Some("/uploads/photo.png"));
    }

    #[test]
    fn unknown_thread_is_not_found() {
        let store = test_store();

        let err = store.get_thread("no-such-thread").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn rows_hold_ciphertext_not_plaintext() {
        let store = test_store();

        store.persist(Some("t1"), 1, 2, "top secret", None).unwrap();
        store.persist(Some("t1"), 1, 2, "top secret", None).unwrap();

        let rows = store.db.thread_messages("t1").unwrap();
        assert!(rows.iter().all(|r| r.ciphertext != b"top secret"));

        // Same plaintext, fresh nonce, distinct ciphertext
        assert_ne!(rows[0].ciphertext, rows[1].ciphertext);
    }

    #[test]
    fn thread_is_ordered_by_timestamp() {
        let store = test_store();

        for body in ["first", "second", "third"] {
            store.persist(Some("t1"), 1, 2, body, None).unwrap();
        }

        let thread = store.get_thread("t1").unwrap();
        let contents: Vec<_> = thread.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
        assert!(thread.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn timestamp_ties_break_by_insertion_order() {
        let store = test_store();

        // Identical timestamps force the id tie-break
        let at = "2026-01-01T00:00:00.000000Z";
        for body in ["first", "second"] {
            let (ciphertext, nonce) =
                safechat_crypto::encrypt::encrypt_message(&store.key, body.as_bytes()).unwrap();
            store
                .db
                .insert_message("t1", 1, 2, &ciphertext, &nonce, None, at)
                .unwrap();
        }

        let thread = store.get_thread("t1").unwrap();
        assert_eq!(thread[0].content, "first");
        assert_eq!(thread[1].content, "second");
    }

    #[test]
    fn interleaved_senders_both_appear_in_order() {
        let store = test_store();
        let store = Arc::new(store);

        let a = store.clone();
        let b = store.clone();
        let t1 = std::thread::spawn(move || a.persist(Some("t1"), 1, 2, "from alice", None));
        let t2 = std::thread::spawn(move || b.persist(Some("t1"), 2, 1, "from bob", None));
        t1.join().unwrap().unwrap();
        t2.join().unwrap().unwrap();

        let thread = store.get_thread("t1").unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn mismatched_key_surfaces_decryption_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_user("alice", "alice@example.com", "hash-a").unwrap();
        db.create_user("bob", "bob@example.com", "hash-b").unwrap();

        let store = MessageStore::new(db.clone(), safechat_crypto::keys::generate_key());
        store.persist(Some("t1"), 1, 2, "hello", None).unwrap();

        // Same rows read under a rotated key
        let rotated = MessageStore::new(db, safechat_crypto::keys::generate_key());
        let err = rotated.get_thread("t1").unwrap_err();
        assert!(matches!(err, StoreError::Decryption(_)));
    }

    #[test]
    fn persist_refuses_unknown_participants() {
        let store = test_store();

        // receiver 99 has no user row; the foreign key rejects the write
        assert!(store.persist(Some("t1"), 1, 99, "hello", None).is_err());
        assert!(store.get_thread("t1").is_err());
    }
}
