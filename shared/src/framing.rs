//! Length-prefixed framing of named binary messages
//!
//! Every frame on the wire is a 4-byte big-endian length followed by that many
//! bytes of `name`, a single NUL byte and an opaque payload. Decoding is a
//! two-state machine: wait for the length prefix, then wait for the whole
//! body. Nothing is handed upwards until the full body has arrived.

use crate::error::FrameError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Upper bound on a single frame body unless configured otherwise
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;
const SEPARATOR: u8 = 0;
const READ_CHUNK: usize = 4096;

/// A decoded `(name, payload)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Serializes the frame, length prefix included
    pub fn encode(&self) -> Bytes {
        encode_frame(&self.name, &self.payload)
    }
}

/// Builds `len(name + NUL + payload)` as u32 BE, then the body itself
pub fn encode_frame(name: &str, payload: &[u8]) -> Bytes {
    debug_assert!(!name.as_bytes().contains(&SEPARATOR));

    let body_len = name.len() + 1 + payload.len();
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + body_len);
    buf.put_u32(body_len as u32);
    buf.put_slice(name.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(payload);
    buf.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingLength,
    AwaitingBody(usize),
}

/// Incremental frame decoder
///
/// Bytes are appended as they arrive; `decode` yields complete frames one at
/// a time. The state machine is back in `AwaitingLength` after every body,
/// whether or not that body turned out to be well formed, so a bad message
/// never desynchronizes the ones behind it.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: BytesMut,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            state: DecodeState::AwaitingLength,
            buffer: BytesMut::new(),
            max_frame_len,
        }
    }

    /// Appends raw bytes received from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Returns the next complete frame, if one has been fully buffered
    pub fn decode(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                DecodeState::AwaitingLength => {
                    if self.buffer.len() < LENGTH_PREFIX {
                        return Ok(None);
                    }

                    let len = self.buffer.get_u32() as usize;
                    if len > self.max_frame_len {
                        self.reset();
                        return Err(FrameError::TooLarge {
                            len,
                            limit: self.max_frame_len,
                        });
                    }
                    self.state = DecodeState::AwaitingBody(len);
                }
                DecodeState::AwaitingBody(len) => {
                    if self.buffer.len() < len {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(len).freeze();
                    self.state = DecodeState::AwaitingLength;
                    return split_body(body).map(Some);
                }
            }
        }
    }

    /// Describes a partially received frame as `(expected, received)` bytes
    ///
    /// `None` means the decoder sits cleanly between frames.
    pub fn pending(&self) -> Option<(usize, usize)> {
        match self.state {
            DecodeState::AwaitingLength if self.buffer.is_empty() => None,
            DecodeState::AwaitingLength => Some((LENGTH_PREFIX, self.buffer.len())),
            DecodeState::AwaitingBody(len) => Some((len, self.buffer.len())),
        }
    }

    fn reset(&mut self) {
        self.state = DecodeState::AwaitingLength;
        self.buffer.clear();
    }
}

fn split_body(body: Bytes) -> Result<Frame, FrameError> {
    let separator = body
        .iter()
        .position(|byte| *byte == SEPARATOR)
        .ok_or(FrameError::MissingSeparator)?;

    let name = std::str::from_utf8(&body[..separator])
        .map_err(|_| FrameError::InvalidName)?
        .to_owned();

    Ok(Frame {
        name,
        payload: body.slice(separator + 1..),
    })
}

/// Reads frames from any async byte source
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_len: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(max_frame_len),
        }
    }

    /// Waits for the next frame
    ///
    /// Returns `Ok(None)` when the peer closed the stream between frames and
    /// `FrameError::Truncated` when it closed in the middle of one. A
    /// non-fatal error leaves the reader usable for the following frame.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(Some(frame));
            }

            let buffer = self.decoder.buffer_mut();
            buffer.reserve(READ_CHUNK);
            let read = self.reader.read_buf(buffer).await?;

            if read == 0 {
                return match self.decoder.pending() {
                    None => Ok(None),
                    Some((expected, received)) => {
                        Err(FrameError::Truncated { expected, received })
                    }
                };
            }
        }
    }
}

/// Handle used to queue encoded frames for a connection's writer task
pub type Outbound = mpsc::UnboundedSender<Bytes>;

/// Writes queued frames until every sender is dropped, then shuts the stream
///
/// Frames queued before the last sender went away are still flushed, which is
/// what lets a `Kick` reach the peer before the socket closes.
pub async fn drain_outbound<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) -> std::io::Result<()> {
    while let Some(frame) = outbound.recv().await {
        writer.write_all(&frame).await?;
    }
    writer.shutdown().await
}
