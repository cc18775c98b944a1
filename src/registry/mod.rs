//! Connection and watch registries
//!
//! ```text
//! ConnectionRegistry ──1:*── Connection ──1:*── Watch
//!   RwLock<id → conn>          RwLock<id → watch>   │ token channel (cap 1)
//!                                                   ▼
//!                                               Forwarder ── WatchSubscription
//! ```
//!
//! Both maps are only locked for structural reads and writes; no guard is
//! held across a store call or a channel await.

mod connection;
mod forwarder;
mod watch;

pub use connection::*;
pub use watch::*;


/// Payload for a receive on an unknown connection
pub const INVALID_CONNECTION: &str = "invalid connection";
/// Payload for a receive on an unknown watch
pub const INVALID_WATCHER: &str = "invalid watcher";
/// Payload for tokens that are still queued when their watch closes
pub const WATCHER_CLOSED: &str = "watcher closed";
