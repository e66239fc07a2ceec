//! # Streaming Binary Encoder
//!
//! Encodes a `<base64>` parameter from byte chunks of any size.
//!
//! ## Invariants
//! - **Group Alignment**: Before `end`, only whole 4-character groups are emitted;
//!   up to two trailing bytes are carried into the next `push`.
//! - **Chunking Invariance**: The concatenated output decodes to the concatenated
//!   input, wherever the chunk boundaries fell.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::Error;
use crate::error::Result;

/// Opens a streamed binary parameter.
pub const PREAMBLE: &str = "<param><value><base64>";

/// Closes a streamed binary parameter.
pub const EPILOGUE: &str = "</base64></value></param>";

/// Incremental base64 encoder for one binary parameter.
///
/// Output is appended to a caller-supplied buffer, so the encoder itself never
/// holds more than two raw bytes.
#[derive(Debug)]
pub struct Base64Stream {
    carry: Vec<u8>,
    ended: bool,
}

impl Base64Stream {
    /// Starts a parameter, appending the preamble to `out`.
    pub fn start(out: &mut String) -> Self {
        out.push_str(PREAMBLE);
        Self { carry: Vec::with_capacity(2), ended: false }
    }

    /// Encodes as much of `bytes` as forms whole groups.
    ///
    /// Returns `true` if anything was appended to `out`.
    ///
    /// # Errors
    /// Returns `Error::Usage` once the stream has ended.
    pub fn push(&mut self, bytes: &[u8], out: &mut String) -> Result<bool> {
        if self.ended {
            return Err(Error::Usage("push on an ended base64 stream".into()));
        }

        let before = out.len();
        let mut input = bytes;

        if !self.carry.is_empty() {
            let take = (3 - self.carry.len()).min(input.len());
            self.carry.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.carry.len() < 3 {
                return Ok(false);
            }
            STANDARD.encode_string(&self.carry, out);
            self.carry.clear();
        }

        let whole = input.len() - input.len() % 3;
        if whole > 0 {
            STANDARD.encode_string(&input[..whole], out);
        }
        self.carry.extend_from_slice(&input[whole..]);

        Ok(out.len() > before)
    }

    /// Flushes the padded remainder and appends the epilogue.
    ///
    /// # Errors
    /// Returns `Error::Usage` if called twice.
    pub fn end(&mut self, out: &mut String) -> Result<()> {
        if self.ended {
            return Err(Error::Usage("base64 stream ended twice".into()));
        }
        self.ended = true;

        if !self.carry.is_empty() {
            STANDARD.encode_string(&self.carry, out);
            self.carry.clear();
        }
        out.push_str(EPILOGUE);
        Ok(())
    }

    /// Raw bytes waiting for a complete group.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}
