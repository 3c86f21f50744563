//! Shared fixtures for dockling tests.

mod fake_engine;

pub use fake_engine::{FakeEngine, Gate, KILLED_EXIT_CODE, Op, Program, STOPPED_EXIT_CODE};

use dockling::{Session, SessionOptions};
use std::sync::Arc;

/// Image every fixture engine has available locally.
pub const TEST_IMAGE: &str = "busybox:latest";

/// Engine with [`TEST_IMAGE`] available.
pub fn engine() -> FakeEngine {
    FakeEngine::new().with_image(TEST_IMAGE)
}

/// Session on top of `engine`, with log output routed to the test harness.
pub async fn session(engine: &FakeEngine, options: SessionOptions) -> Session {
    dockling::init_logging();
    Session::with_engine(Arc::new(engine.clone()), options)
        .await
        .expect("Failed to create session")
}
