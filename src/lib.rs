//! Exposes etcd connections and watches to a cooperative-scheduling host.
//!
//! The host submits opaque tasks through a blocking [`host::TaskQueue`] and gets
//! exactly one completion per task. [`dispatch::Dispatcher`] decodes each task's
//! command and routes it to the [`registry::ConnectionRegistry`], which owns
//! store sessions and turns each push-based watch stream into a pull-based one
//! with at most one outstanding receive.

pub mod codec;
mod config;
pub mod dispatch;
mod errors;
pub mod host;
pub mod metrics;
pub mod registry;
pub mod store;
pub(crate) mod utils;

pub use config::*;
pub use errors::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
