pub mod env;
pub mod recorder;

pub use env::TestEnv;
pub use recorder::{Event, RecordingNotifier};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once per process. Set `RUST_LOG`
/// to see engine logs, e.g. `RUST_LOG=quorum_engine=debug`.
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
