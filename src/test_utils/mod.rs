//! the test_utils folder here will share utils or test components between
//! unit tests
mod fake_store;
mod test_host;

pub use fake_store::*;
pub use test_host::*;

/// Install a test subscriber once; later calls are no-ops
pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
