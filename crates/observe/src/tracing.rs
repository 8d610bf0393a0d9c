use {
    std::sync::Once,
    tracing_subscriber::{EnvFilter, fmt},
};

/// Environment variable that overrides the filter passed to [`initialize`].
pub const LOG_FILTER_ENV: &str = "LOG_FILTER";

/// Installs the global subscriber. `env_filter` uses the `EnvFilter` syntax,
/// e.g. `"warn,vault=debug"`, and is replaced by `LOG_FILTER` when that is
/// set.
///
/// Panics if a global subscriber has already been installed. Use
/// [`initialize_reentrant`] from tests.
pub fn initialize(env_filter: &str) {
    subscriber(env_filter).init();
    tracing::info!(filter = env_filter, "tracing initialized");
}

/// Like [`initialize`] but may be called any number of times. Only the first
/// call has an effect and output goes through the test writer so that it is
/// captured per test.
pub fn initialize_reentrant(env_filter: &str) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // Another harness may have installed a subscriber already.
        let _ = subscriber(env_filter).with_test_writer().try_init();
    });
}

fn subscriber(
    env_filter: &str,
) -> fmt::SubscriberBuilder<fmt::format::DefaultFields, fmt::format::Format, EnvFilter> {
    fmt::fmt().with_env_filter(
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(env_filter)),
    )
}
