//! Length-prefixed JSON framing over a byte stream.
//!
//! The tracer sends repeated frames of the form
//! `[u32 big-endian length][N bytes UTF-8 JSON]`. The parser buffers
//! arbitrary chunks: a single read may carry zero, one, or many frames, and
//! a payload may span many reads. A parse failure of a complete frame is
//! fatal for the owning stream — the caller must stop feeding bytes and tear
//! the socket and subprocess down.

use serde_json::Value;

use crate::errors::FrameError;

const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends a chunk of raw bytes from the stream.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts the next fully-buffered frame, if any.
    ///
    /// Returns `None` when more bytes are needed. A complete frame whose
    /// payload is not valid JSON yields `Some(Err(..))`; no partial or
    /// corrupted frame is ever returned.
    pub fn next_frame(&mut self) -> Option<Result<Value, FrameError>> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return None;
        }
        let payload_len =
            u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                as usize;
        if self.buffer.len() < FRAME_HEADER_LEN + payload_len {
            return None;
        }

        let payload: Vec<u8> = self
            .buffer
            .drain(..FRAME_HEADER_LEN + payload_len)
            .skip(FRAME_HEADER_LEN)
            .collect();

        match serde_json::from_slice::<Value>(&payload) {
            Ok(value) => Some(Ok(value)),
            Err(err) => Some(Err(FrameError(err))),
        }
    }

    /// Encodes one JSON value as a wire frame.
    pub fn encode(value: &Value) -> Vec<u8> {
        let json = value.to_string();
        let payload = json.as_bytes();

        let mut res = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        res.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        res.extend_from_slice(payload);
        res
    }
}
