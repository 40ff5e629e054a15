use std::fs;
use std::path::Path;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tracing::info;

/// Generate a random 256-bit content key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encode a key to base64 for persistence.
pub fn key_to_base64(key: &[u8; 32]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 key.
pub fn key_from_base64(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64.decode(encoded)?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Invalid key length"))?;
    Ok(key)
}

/// Load the content key from `path`, generating and persisting a fresh one
/// on first boot. Messages encrypted before a restart stay decryptable
/// because every process reads the same key file.
pub fn load_or_create(path: &Path) -> Result<[u8; 32]> {
    if path.exists() {
        let encoded = fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        return key_from_base64(encoded.trim())
            .with_context(|| format!("decoding key file {}", path.display()));
    }

    let key = generate_key();
    fs::write(path, key_to_base64(&key))
        .with_context(|| format!("writing key file {}", path.display()))?;
    info!("Generated new content key at {}", path.display());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn scratch_path(tag: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("safechat-key-{}-{}", tag, nanos))
    }

    #[test]
    fn base64_roundtrip() {
        let key = generate_key();
        let encoded = key_to_base64(&key);
        assert_eq!(key_from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn rejects_wrong_length() {
        let encoded = BASE64.encode([0u8; 16]);
        assert!(key_from_base64(&encoded).is_err());
    }

    #[test]
    fn load_or_create_is_stable_across_restarts() {
        let path = scratch_path("stable");

        let first = load_or_create(&path).unwrap();
        let second = load_or_create(&path).unwrap();
        assert_eq!(first, second);

        fs::remove_file(&path).unwrap();
    }
}
