use dockling_shared::constants::envs;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "warn";

/// Route dockling's tracing output to the test harness.
///
/// The level comes from `RUST_LOG`, e.g. `RUST_LOG=dockling=debug`. Output
/// goes through the test writer, so it is captured per test and only shown
/// for failing tests. Calling this more than once is harmless.
pub fn init_logging() {
    let env_filter = std::env::var(envs::RUST_LOG)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));
    register_to_tracing(env_filter);
}

fn register_to_tracing(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_logging();
        init_logging();
        tracing::debug!("still alive");
    }
}
