use rusqlite::Connection;

use crate::Database;
use crate::error::Result;
use crate::models::{MessageRow, NotificationRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    pub fn update_profile(&self, id: i64, username: &str, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET username = ?1, email = ?2 WHERE id = ?3",
                (username, email, id),
            )?;
            Ok(())
        })
    }

    pub fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                (password_hash, id),
            )?;
            Ok(())
        })
    }

    pub fn set_mfa_secret(&self, id: i64, secret: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET mfa_secret = ?1 WHERE id = ?2",
                (secret, id),
            )?;
            Ok(())
        })
    }

    /// Returns true if a row was actually removed.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        thread_id: &str,
        sender_id: i64,
        receiver_id: i64,
        ciphertext: &[u8],
        nonce: &[u8],
        file_url: Option<&str>,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (thread_id, sender_id, receiver_id, ciphertext, nonce, file_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![thread_id, sender_id, receiver_id, ciphertext, nonce, file_url, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All rows of one thread, oldest first. Equal timestamps fall back to
    /// insertion (id) order, keeping the sort stable.
    pub fn thread_messages(&self, thread_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, sender_id, receiver_id, ciphertext, nonce, file_url, created_at
                 FROM messages
                 WHERE thread_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map([thread_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        thread_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        receiver_id: row.get(3)?,
                        ciphertext: row.get(4)?,
                        nonce: row.get(5)?,
                        file_url: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, user_id: i64, content: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (user_id, content) VALUES (?1, ?2)",
                rusqlite::params![user_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn unread_notifications(&self, user_id: i64) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, content, is_read FROM notifications
                 WHERE user_id = ?1 AND is_read = 0
                 ORDER BY id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        content: row.get(2)?,
                        is_read: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Flip every unread notification of the user to read. The flag never
    /// moves back. Returns how many rows changed.
    pub fn mark_notifications_read(&self, user_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, mfa_secret, is_admin, created_at";

fn query_user<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    param: P,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {predicate}"
    ))?;

    let row = stmt
        .query_row(rusqlite::params![param], user_from_row)
        .optional()?;

    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        mfa_secret: row.get(4)?,
        is_admin: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "alice@example.com", "hash-a").unwrap();
        db.create_user("bob", "bob@example.com", "hash-b").unwrap();
        db
    }

    #[test]
    fn user_lookup_by_each_key() {
        let db = seeded_db();

        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        let by_email = db.get_user_by_email("alice@example.com").unwrap().unwrap();
        let by_id = db.get_user_by_id(by_name.id).unwrap().unwrap();

        assert_eq!(by_name.id, by_email.id);
        assert_eq!(by_id.username, "alice");
        assert!(!by_id.is_admin);
        assert!(by_id.mfa_secret.is_none());

        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_rejected() {
        let db = seeded_db();
        assert!(db.create_user("alice", "other@example.com", "hash").is_err());
    }

    #[test]
    fn delete_user_reports_whether_removed() {
        let db = seeded_db();
        let alice = db.get_user_by_username("alice").unwrap().unwrap();

        assert!(db.delete_user(alice.id).unwrap());
        assert!(!db.delete_user(alice.id).unwrap());
        assert!(db.get_user_by_username("alice").unwrap().is_none());
    }

    #[test]
    fn notification_read_flag_is_one_way() {
        let db = seeded_db();
        let alice = db.get_user_by_username("alice").unwrap().unwrap();

        db.insert_notification(alice.id, "New message from bob").unwrap();
        db.insert_notification(alice.id, "New message from bob").unwrap();

        let unread = db.unread_notifications(alice.id).unwrap();
        assert_eq!(unread.len(), 2);
        assert!(unread.iter().all(|n| !n.is_read));

        assert_eq!(db.mark_notifications_read(alice.id).unwrap(), 2);
        assert!(db.unread_notifications(alice.id).unwrap().is_empty());

        // A second pass has nothing left to flip
        assert_eq!(db.mark_notifications_read(alice.id).unwrap(), 0);
    }
}
