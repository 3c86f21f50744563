//! Stream plumbing between attach connections and caller I/O.

mod completion;
pub mod frame;
pub mod pump;

pub use completion::{Completer, Completion};
pub use frame::{MultiplexedCodec, OutputChunk};
pub use pump::{BoxedReader, BoxedWriter, OutputSinks, PumpIo};
