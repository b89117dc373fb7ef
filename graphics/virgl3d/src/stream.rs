//! Command stream decoding
//!
//! Walks an encoded word stream record by record using only the header
//! length fields. Opcodes this crate does not know are still framed
//! correctly and can be skipped by the caller.

use crate::protocol::{VirGLCommand, HEADER_FIELD_MASK, HEADER_LENGTH_SHIFT, HEADER_MID_SHIFT};
use crate::{Error, Result};

/// Decoded command header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u32,
    pub mid: u32,
    pub length: usize,
}

impl Header {
    pub fn decode(word: u32) -> Self {
        Self {
            opcode: word & HEADER_FIELD_MASK,
            mid: (word >> HEADER_MID_SHIFT) & HEADER_FIELD_MASK,
            length: (word >> HEADER_LENGTH_SHIFT) as usize,
        }
    }

    /// Known opcode, if any
    pub fn command(&self) -> Option<VirGLCommand> {
        VirGLCommand::from_raw(self.opcode)
    }
}

/// Iterator over the records of a word stream
pub struct Records<'a> {
    words: &'a [u32],
    offset: usize,
    failed: bool,
}

/// Iterate the records in `words`
pub fn records(words: &[u32]) -> Records<'_> {
    Records {
        words,
        offset: 0,
        failed: false,
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<(Header, &'a [u32])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.words.len() {
            return None;
        }

        let header = Header::decode(self.words[self.offset]);
        let start = self.offset + 1;
        let end = start + header.length;
        if end > self.words.len() {
            self.failed = true;
            return Some(Err(Error::TruncatedRecord {
                offset: self.offset,
            }));
        }

        self.offset = end;
        Some(Ok((header, &self.words[start..end])))
    }
}
