use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// 50 MB upload limit for attachments
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Saves attachments under the configured uploads directory and hands back
/// an opaque reference URL. The message store never looks inside the
/// reference.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Write `data` to disk and return the reference URL for the stored
    /// file. Stored names are prefixed with a fresh UUID, so identical
    /// client filenames never collide.
    pub async fn save(&self, filename: &str, data: &[u8]) -> ApiResult<String> {
        if data.len() > MAX_FILE_SIZE {
            return Err(ApiError::PayloadTooLarge);
        }

        let name = format!("{}_{}", Uuid::new_v4(), sanitize(filename));

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            error!("Failed to create uploads directory: {}", e);
            ApiError::Internal
        })?;

        let path = self.root.join(&name);
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create file {}: {}", path.display(), e);
            ApiError::Internal
        })?;
        file.write_all(data).await.map_err(|e| {
            error!("Failed to write file {}: {}", path.display(), e);
            ApiError::Internal
        })?;

        Ok(format!("/uploads/{}", name))
    }
}

/// Keep stored names shell- and URL-safe; anything suspicious becomes '_'.
fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn sanitize_strips_path_tricks() {
        assert_eq!(sanitize("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize("photo (1).png"), "photo__1_.png");
        assert_eq!(sanitize("report.pdf"), "report.pdf");
    }

    #[tokio::test]
    async fn save_writes_bytes_and_returns_reference() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("safechat-uploads-{}", nanos));
        let store = FileStore::new(root.clone());

        let url = store.save("hello.txt", b"hi there").await.unwrap();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with("_hello.txt"));

        let name = url.strip_prefix("/uploads/").unwrap();
        let on_disk = tokio::fs::read(root.join(name)).await.unwrap();
        assert_eq!(on_disk, b"hi there");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let store = FileStore::new(std::env::temp_dir().join("safechat-uploads-unused"));
        let data = vec![0u8; MAX_FILE_SIZE + 1];

        assert!(matches!(
            store.save("big.bin", &data).await,
            Err(ApiError::PayloadTooLarge)
        ));
    }
}
