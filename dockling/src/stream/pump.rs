//! Copies bytes between a hijacked connection and caller-supplied I/O.
//!
//! Each direction runs in its own task. The output task owns the connection:
//! after the output side ran dry it waits for the input task to hand back the
//! write half, releases both halves and only then fires the completion
//! signal.

use super::completion::{Completer, Completion};
use super::frame::OutputChunk;
use crate::engine::{HijackedConnection, InputSink, OutputStream};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

/// Caller-supplied writer receiving process output.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Caller-supplied reader feeding process input.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where process output goes.
pub enum OutputSinks {
    /// stdout and stderr end up in the same writer.
    Combined(BoxedWriter),
    /// stdout and stderr go to separate writers.
    Demuxed {
        stdout: BoxedWriter,
        stderr: BoxedWriter,
    },
}

impl OutputSinks {
    /// Throw away all output.
    pub fn discard() -> Self {
        OutputSinks::Combined(Box::new(tokio::io::sink()))
    }

    fn stdout(&mut self) -> &mut BoxedWriter {
        match self {
            OutputSinks::Combined(w) => w,
            OutputSinks::Demuxed { stdout, .. } => stdout,
        }
    }

    fn stderr(&mut self) -> &mut BoxedWriter {
        match self {
            OutputSinks::Combined(w) => w,
            OutputSinks::Demuxed { stderr, .. } => stderr,
        }
    }

    /// Pick the writer for a chunk. With a TTY there is only a single
    /// console stream, which always goes to stdout.
    fn writer_for(&mut self, chunk: &OutputChunk, tty: bool) -> Option<&mut BoxedWriter> {
        match chunk {
            OutputChunk::Stdin(_) => None,
            OutputChunk::Stderr(_) if !tty => Some(self.stderr()),
            _ => Some(self.stdout()),
        }
    }

    async fn flush(&mut self) {
        let _ = self.stdout().flush().await;
        let _ = self.stderr().flush().await;
    }
}

impl Default for OutputSinks {
    fn default() -> Self {
        Self::discard()
    }
}

impl std::fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputSinks::Combined(_) => f.write_str("OutputSinks::Combined"),
            OutputSinks::Demuxed { .. } => f.write_str("OutputSinks::Demuxed"),
        }
    }
}

/// Caller side of an attach session.
#[derive(Default)]
pub struct PumpIo {
    pub input: Option<BoxedReader>,
    pub output: OutputSinks,
}

impl std::fmt::Debug for PumpIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpIo")
            .field("input", &self.input.is_some())
            .field("output", &self.output)
            .finish()
    }
}

enum InputSide {
    /// No input reader, the write half just sits there until release.
    Idle(InputSink),
    Pumping(JoinHandle<InputSink>),
}

/// Start pumping; `id` names the container or command execution in logs.
///
/// Must be called before the process is started, so no output is lost.
pub fn spawn(conn: HijackedConnection, io: PumpIo, tty: bool, id: &str) -> Completion {
    let (completer, completion) = Completion::new();
    let (output, input) = conn.into_parts();
    let PumpIo {
        input: source,
        output: sinks,
    } = io;

    let input = match source {
        Some(source) => {
            InputSide::Pumping(tokio::spawn(pump_input(source, input, id.to_string())))
        }
        None => InputSide::Idle(input),
    };
    tokio::spawn(pump_output(output, input, sinks, tty, id.to_string(), completer));

    completion
}

async fn pump_input(mut source: BoxedReader, mut sink: InputSink, id: String) -> InputSink {
    match tokio::io::copy(&mut source, &mut sink).await {
        Ok(n) => tracing::trace!(id = %id, bytes = n, "Input drained"),
        Err(e) => tracing::debug!(id = %id, error = %e, "Copying input failed"),
    }
    if let Err(e) = sink.shutdown().await {
        tracing::debug!(id = %id, error = %e, "Closing input side failed");
    }
    sink
}

async fn pump_output(
    mut output: OutputStream,
    input: InputSide,
    mut sinks: OutputSinks,
    tty: bool,
    id: String,
    completer: Completer,
) {
    let mut copied = 0u64;
    while let Some(chunk) = output.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(id = %id, error = %e, "Reading output failed");
                break;
            }
        };
        let Some(writer) = sinks.writer_for(&chunk, tty) else {
            continue;
        };
        let payload = chunk.into_payload();
        tracing::trace!(id = %id, len = payload.len(), "Received output");
        if let Err(e) = writer.write_all(&payload).await {
            tracing::debug!(id = %id, error = %e, "Writing output failed");
            break;
        }
        copied += payload.len() as u64;
    }
    sinks.flush().await;

    let input = match input {
        InputSide::Idle(sink) => Some(sink),
        InputSide::Pumping(handle) => handle.await.ok(),
    };
    drop(input);
    drop(output);
    tracing::debug!(id = %id, bytes = copied, "Streams drained, connection released");

    completer.complete();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SharedBuffer;
    use crate::stream::frame::encode_chunk;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn frame(chunk: OutputChunk) -> Bytes {
        encode_chunk(chunk).unwrap()
    }

    #[tokio::test]
    async fn demultiplexes_into_separate_sinks() {
        let (mut engine, ours) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(ours);
        let conn = HijackedConnection::from_raw(reader, writer, false);

        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let io = PumpIo {
            input: None,
            output: OutputSinks::Demuxed {
                stdout: Box::new(stdout.clone()),
                stderr: Box::new(stderr.clone()),
            },
        };
        let done = spawn(conn, io, false, "test");

        engine
            .write_all(&frame(OutputChunk::Stdout(Bytes::from_static(b"out"))))
            .await
            .unwrap();
        engine
            .write_all(&frame(OutputChunk::Stderr(Bytes::from_static(b"err"))))
            .await
            .unwrap();
        drop(engine);

        done.wait().await;
        assert_eq!(stdout.to_string_lossy(), "out");
        assert_eq!(stderr.to_string_lossy(), "err");
    }

    #[tokio::test]
    async fn input_is_copied_and_closed_before_completion() {
        let (engine, ours) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(ours);
        let conn = HijackedConnection::from_raw(reader, writer, true);
        let (mut engine_rx, mut engine_tx) = tokio::io::split(engine);

        let io = PumpIo {
            input: Some(Box::new(&b"ping"[..])),
            output: OutputSinks::discard(),
        };
        let done = spawn(conn, io, true, "test");

        // The input side gets shut down after EOF of the reader.
        let mut received = Vec::new();
        engine_rx.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ping");
        assert!(!done.is_done(), "output side is still open");

        engine_tx.shutdown().await.unwrap();
        drop(engine_tx);
        drop(engine_rx);
        done.wait().await;
    }
}
