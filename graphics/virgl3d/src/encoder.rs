//! VirGL command stream encoder
//!
//! Commands are appended one record at a time. [`Encoder::begin_record`]
//! reserves the header word and hands out a [`RecordBuilder`]; payload words
//! are pushed through the builder and the header is patched with the final
//! payload length when the builder is finalized or dropped.
//!
//! The encoder writes into any [`WordSink`]. A `Vec<u32>` grows on demand,
//! a [`BoundedSink`] wraps caller storage and reports overflow instead of
//! writing past its end. A record that fails part way is removed from the
//! sink again, so the output only ever holds complete records.

use alloc::vec::Vec;

use crate::protocol::{encode_header, VirGLCommand, MAX_PAYLOAD_WORDS};
use crate::{Error, Result};

/// Destination for encoded words
pub trait WordSink {
    /// Number of words written so far
    fn len(&self) -> usize;

    /// Whether no words have been written
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one word
    fn push(&mut self, word: u32) -> Result<()>;

    /// Overwrite a previously written word
    fn patch(&mut self, index: usize, word: u32);

    /// Drop every word from `len` onwards
    fn truncate(&mut self, len: usize);

    /// Words written so far
    fn words(&self) -> &[u32];
}

impl WordSink for Vec<u32> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn push(&mut self, word: u32) -> Result<()> {
        Vec::push(self, word);
        Ok(())
    }

    fn patch(&mut self, index: usize, word: u32) {
        self[index] = word;
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }

    fn words(&self) -> &[u32] {
        self.as_slice()
    }
}

/// Fixed-capacity sink over caller storage
pub struct BoundedSink<'a> {
    buffer: &'a mut [u32],
    used: usize,
}

impl<'a> BoundedSink<'a> {
    pub fn new(buffer: &'a mut [u32]) -> Self {
        Self { buffer, used: 0 }
    }

    /// Total capacity in words
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Words still available
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.used
    }
}

impl WordSink for BoundedSink<'_> {
    fn len(&self) -> usize {
        self.used
    }

    fn push(&mut self, word: u32) -> Result<()> {
        let capacity = self.buffer.len();
        let slot = self
            .buffer
            .get_mut(self.used)
            .ok_or(Error::BufferOverflow { capacity })?;
        *slot = word;
        self.used += 1;
        Ok(())
    }

    fn patch(&mut self, index: usize, word: u32) {
        assert!(index < self.used, "patch beyond written words");
        self.buffer[index] = word;
    }

    fn truncate(&mut self, len: usize) {
        self.used = self.used.min(len);
    }

    fn words(&self) -> &[u32] {
        &self.buffer[..self.used]
    }
}

/// Command stream encoder
pub struct Encoder<S: WordSink> {
    sink: S,
}

impl Encoder<Vec<u32>> {
    /// Encoder over a growable buffer
    pub fn growable() -> Self {
        Self { sink: Vec::new() }
    }
}

impl<'a> Encoder<BoundedSink<'a>> {
    /// Encoder over fixed caller storage
    pub fn bounded(buffer: &'a mut [u32]) -> Self {
        Self {
            sink: BoundedSink::new(buffer),
        }
    }
}

impl<S: WordSink> Encoder<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Start a new record, reserving its header word
    pub fn begin_record(&mut self, opcode: VirGLCommand, mid: u32) -> Result<RecordBuilder<'_, S>> {
        let header_index = self.sink.len();
        self.sink.push(encode_header(0, mid, opcode.raw()))?;
        Ok(RecordBuilder {
            sink: &mut self.sink,
            header_index,
            opcode,
            mid,
            payload_words: 0,
            failure: None,
            finalized: false,
        })
    }

    /// Words encoded so far
    pub fn words(&self) -> &[u32] {
        self.sink.words()
    }

    /// Number of words encoded so far
    pub fn len(&self) -> usize {
        self.sink.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sink.is_empty()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

/// Scoped writer for the payload of one record
pub struct RecordBuilder<'e, S: WordSink> {
    sink: &'e mut S,
    header_index: usize,
    opcode: VirGLCommand,
    mid: u32,
    payload_words: usize,
    failure: Option<Error>,
    finalized: bool,
}

impl<S: WordSink> RecordBuilder<'_, S> {
    /// Append a raw word
    pub fn append_u32(&mut self, word: u32) -> Result<()> {
        assert!(
            !self.finalized,
            "append to finalized {:?} record",
            self.opcode
        );
        if let Some(err) = self.failure {
            return Err(err);
        }
        if self.payload_words == MAX_PAYLOAD_WORDS {
            return Err(self.fail(Error::RecordTooLong));
        }
        match self.sink.push(word) {
            Ok(()) => {
                self.payload_words += 1;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Append the IEEE-754 bit pattern of `value`
    pub fn append_f32(&mut self, value: f32) -> Result<()> {
        self.append_u32(value.to_bits())
    }

    /// Append the bit pattern of `value` as two words, low half first
    pub fn append_f64(&mut self, value: f64) -> Result<()> {
        let bits = value.to_bits();
        self.append_u32(bits as u32)?;
        self.append_u32((bits >> 32) as u32)
    }

    /// Append `bytes` packed little-endian into words, zero padded to the next
    /// word boundary with at least one trailing zero byte.
    pub fn append_padded_string(&mut self, bytes: &[u8]) -> Result<()> {
        let mut chunks = bytes.chunks_exact(4);
        for chunk in &mut chunks {
            self.append_u32(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))?;
        }
        let mut last = [0u8; 4];
        let rest = chunks.remainder();
        last[..rest.len()].copy_from_slice(rest);
        self.append_u32(u32::from_le_bytes(last))
    }

    /// Append a slice of raw words
    pub fn append_slice(&mut self, words: &[u32]) -> Result<()> {
        for &word in words {
            self.append_u32(word)?;
        }
        Ok(())
    }

    /// Payload words written so far
    pub fn payload_len(&self) -> usize {
        self.payload_words
    }

    /// Patch the header with the payload length. A record whose append failed
    /// is removed from the sink instead. Calling this twice is a no-op.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if self.failure.is_some() {
            self.sink.truncate(self.header_index);
            return;
        }
        self.sink.patch(
            self.header_index,
            encode_header(self.payload_words as u32, self.mid, self.opcode.raw()),
        );
    }

    fn fail(&mut self, err: Error) -> Error {
        self.failure = Some(err);
        err
    }
}

impl<S: WordSink> Drop for RecordBuilder<'_, S> {
    fn drop(&mut self) {
        self.finalize();
    }
}
