//! Multiplexed stream framing
//!
//! Without a TTY the engine sends stdout and stderr over a single connection,
//! chopped into chunks. Each chunk is preceded by an 8 byte header:
//!
//! ```text
//! [stream type, 0, 0, 0, size (u32, big endian)]
//! ```
//!
//! where the stream type is 0 for stdin, 1 for stdout and 2 for stderr.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use dockling_shared::constants::framing;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// A chunk of output received over an attach connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputChunk {
    Stdin(Bytes),
    Stdout(Bytes),
    Stderr(Bytes),
    /// Undemultiplexed TTY output.
    Console(Bytes),
}

impl OutputChunk {
    pub fn into_payload(self) -> Bytes {
        match self {
            OutputChunk::Stdin(b)
            | OutputChunk::Stdout(b)
            | OutputChunk::Stderr(b)
            | OutputChunk::Console(b) => b,
        }
    }
}

/// Largest buffer growth a single partial frame triggers.
const MAX_RESERVE: usize = 64 * 1024;

/// Codec for the engine's multiplexed stdout/stderr framing.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiplexedCodec;

impl Decoder for MultiplexedCodec {
    type Item = OutputChunk;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < framing::HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        let frame_len = framing::HEADER_LEN + len;
        if src.len() < frame_len {
            // The length comes off the wire; grow in bounded steps.
            src.reserve((frame_len - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        let kind = src[0];
        src.advance(framing::HEADER_LEN);
        let payload = src.split_to(len).freeze();

        match kind {
            framing::STDIN => Ok(Some(OutputChunk::Stdin(payload))),
            framing::STDOUT => Ok(Some(OutputChunk::Stdout(payload))),
            framing::STDERR => Ok(Some(OutputChunk::Stderr(payload))),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown stream type {} in multiplexed frame", other),
            )),
        }
    }
}

impl Encoder<OutputChunk> for MultiplexedCodec {
    type Error = io::Error;

    fn encode(&mut self, item: OutputChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let kind = match &item {
            OutputChunk::Stdin(_) => framing::STDIN,
            OutputChunk::Stdout(_) => framing::STDOUT,
            OutputChunk::Stderr(_) => framing::STDERR,
            OutputChunk::Console(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "console output cannot be multiplexed",
                ));
            }
        };
        let payload = item.into_payload();
        let len = u32::try_from(payload.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "chunk too large for framing")
        })?;

        dst.reserve(framing::HEADER_LEN + payload.len());
        dst.put_u8(kind);
        dst.put_bytes(0, 3);
        dst.put_u32(len);
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Frame a single chunk, for engines and test doubles writing raw connections.
pub fn encode_chunk(chunk: OutputChunk) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    MultiplexedCodec.encode(chunk, &mut buf)?;
    Ok(buf.freeze())
}
