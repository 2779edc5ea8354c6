//! WebSocket plumbing for the streaming feed

pub mod connection;
pub mod subscription;

pub use connection::{classify_close, WebSocketConnection, WebSocketError};
pub use subscription::{SubscriptionBatch, SubscriptionManager, MAX_BATCH_SIZE};
