//! Dockling - throw-away containers for integration tests.
//!
//! A [`Session`] talks to a container engine and hands out containers
//! ([`Session::run`]), commands executing inside them ([`Container::exec`])
//! and networks ([`Session::create_network`]). Container and command output
//! is copied into caller-supplied writers while they run; the `done`
//! signals of [`Container`] and [`ExecSession`] fire once all of it has been
//! written.
//!
//! ```rust,no_run
//! use dockling::{CancellationToken, Command, ExecOptions, RunOptions, Session, SessionOptions, SharedBuffer};
//!
//! # async fn demo() -> dockling::DocklingResult<()> {
//! let session = Session::new(SessionOptions::new().auto_cleaning("test.dockling=")).await?;
//! let container = session
//!     .run("busybox:latest", RunOptions::new().command(["/bin/sleep", "30"]))
//!     .await?;
//!
//! let out = SharedBuffer::new();
//! let cancel = CancellationToken::new();
//! let exec = container
//!     .exec(Command::new("/bin/echo").arg("hello"), ExecOptions::new().combined_output(out.clone()))
//!     .await?;
//! assert_eq!(exec.wait(&cancel).await?, 0);
//! assert_eq!(out.to_string_lossy(), "hello\n");
//!
//! container.kill().await;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod engine;
pub mod exec;
pub mod image;
pub mod labels;
pub mod network;
pub mod output;
pub mod poll;
pub mod session;
pub mod stream;
pub mod util;

pub use container::{Container, PublishedAddr, RunOptions};
pub use engine::{DockerEngine, EngineClient};
pub use exec::{Command, ExecOptions, ExecSession};
pub use image::RemoveImageOptions;
pub use network::{Network, NetworkOptions};
pub use output::{SharedBuffer, Timestamper};
pub use session::{Session, SessionOptions};
pub use stream::Completion;
pub use util::init_logging;

pub use dockling_shared::{DocklingError, DocklingResult, EngineError, EngineResult, Transport};
pub use tokio_util::sync::CancellationToken;
