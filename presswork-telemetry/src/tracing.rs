use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// Guard for the global subscriber install.
//
// A [`Once`] is enough here because the init functions are infallible: the
// only failure mode of `try_init` is a subscriber already being installed,
// which is exactly what the guard prevents during tests that share a
// process.
static INIT: Once = Once::new();

/// Initializes structured logging with log levels configurable via the
/// `RUST_LOG` environment variable.
///
/// Defaults to `presswork=info` when `RUST_LOG` is not set.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "presswork=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

/// Initializes tracing for tests.
///
/// Multiple tests in the same process can safely call this; the subscriber
/// is installed once and subsequent calls are no-ops. Output goes through
/// the test writer so it is captured per test.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "presswork=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}
