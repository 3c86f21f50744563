//! Hijacked attach connections.
//!
//! Attaching to a container or a command execution upgrades the HTTP request
//! into a bidirectional byte stream. Engines hand it to us either already
//! split into output chunks, or as a raw reader/writer pair that still needs
//! demultiplexing.

use crate::stream::frame::{MultiplexedCodec, OutputChunk};
use futures::stream::{Stream, TryStreamExt};
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tokio_util::io::ReaderStream;

/// Output side of a hijacked connection.
pub type OutputStream = Pin<Box<dyn Stream<Item = io::Result<OutputChunk>> + Send>>;

/// Input side of a hijacked connection.
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// An attached, bidirectional connection to a container or command.
pub struct HijackedConnection {
    pub output: OutputStream,
    pub input: InputSink,
}

impl HijackedConnection {
    pub fn new(output: OutputStream, input: InputSink) -> Self {
        Self { output, input }
    }

    /// Build a connection from raw byte streams.
    ///
    /// With a TTY the engine sends undemultiplexed console output, otherwise
    /// the reader carries multiplexed stdout/stderr frames.
    pub fn from_raw<R, W>(reader: R, writer: W, tty: bool) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let output: OutputStream = if tty {
            Box::pin(ReaderStream::new(reader).map_ok(OutputChunk::Console))
        } else {
            Box::pin(FramedRead::new(reader, MultiplexedCodec))
        };
        Self {
            output,
            input: Box::pin(writer),
        }
    }

    pub fn into_parts(self) -> (OutputStream, InputSink) {
        (self.output, self.input)
    }
}

impl std::fmt::Debug for HijackedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HijackedConnection").finish_non_exhaustive()
    }
}
