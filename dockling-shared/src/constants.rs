//! Shared constants
//!
//! Values used by the library as well as by test doubles, so both sides agree.

use std::time::Duration;

/// Readiness polling constants
pub mod poll {
    use super::Duration;

    /// Nap between two inspections while waiting for a PID to show up.
    pub const DEFAULT_SLEEP: Duration = Duration::from_millis(10);
}

/// Identifier formatting
pub mod ids {
    /// Number of hex digits of a container ID shown in errors and logs.
    pub const ABBREVIATED_ID_LENGTH: usize = 10;
}

/// Environment variables
pub mod envs {
    /// Engine endpoint, such as `unix:///var/run/docker.sock`.
    pub const DOCKER_HOST: &str = "DOCKER_HOST";

    /// Log filter directives picked up by `util::init_logging`.
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Stream framing of non-TTY attach connections
pub mod framing {
    /// Size of the header preceding each multiplexed chunk.
    pub const HEADER_LEN: usize = 8;

    /// Stream type byte for stdin.
    pub const STDIN: u8 = 0;

    /// Stream type byte for stdout.
    pub const STDOUT: u8 = 1;

    /// Stream type byte for stderr.
    pub const STDERR: u8 = 2;
}

/// Engine-side defaults
pub mod engine {
    /// Default unix socket of a local engine.
    pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

    /// Wait condition used when waiting for containers.
    pub const WAIT_NOT_RUNNING: &str = "not-running";
}
