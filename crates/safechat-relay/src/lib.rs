//! Realtime message relay.
//!
//! A connected client identifies with its access token, then sends live
//! `send_message` events. Each event is persisted through the message store
//! first and only then pushed to the receiver's open connections — never
//! relay-without-persist. A receiver with no open connection simply misses
//! the live push; the message waits in its thread.

pub mod connection;
pub mod dispatcher;
