//! Content encryption for the SafeChat backend.
//!
//! A single symmetric AES-256-GCM key encrypts every message body at rest.
//! The key is loaded from a persisted key file at startup (generated on
//! first boot), so a process restart never orphans previously encrypted
//! rows. Every encryption uses a fresh random 96-bit nonce: identical
//! plaintexts yield distinct, tamper-evident ciphertexts.

pub mod encrypt;
pub mod keys;
