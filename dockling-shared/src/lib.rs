//! dockling shared - code used by the library and its test doubles
//!
//! This crate contains the error types, constants, and engine transport
//! description shared between `dockling` and `dockling-test-utils`.

pub mod constants;
pub mod errors;
pub mod transport;

pub use errors::{DocklingError, DocklingResult, EngineError, EngineResult};
pub use transport::Transport;
