//! Header/body boundary detection over an accumulating byte stream.
//!
//! The scanner consumes bytes in whatever chunks the socket delivers and
//! walks a five-state machine toward the `CRLFCRLF` sequence that ends an
//! HTTP/1.1 header block. State is kept across chunks, so a boundary split
//! between two reads is still found, at its first occurrence.

use memchr::memchr;

/// Progress toward the 4-byte `\r\n\r\n` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameState {
    NoMatch,
    SawCr,
    SawCrlf,
    SawCrlfCr,
    SawCrlfCrlf,
}

impl FrameState {
    pub(crate) const fn advance(self, byte: u8) -> Self {
        match (self, byte) {
            (Self::NoMatch, b'\r') => Self::SawCr,
            (Self::NoMatch, _) => Self::NoMatch,

            (Self::SawCr, b'\n') => Self::SawCrlf,
            (Self::SawCr, b'\r') => Self::SawCr,
            (Self::SawCr, _) => Self::NoMatch,

            (Self::SawCrlf, b'\r') => Self::SawCrlfCr,
            (Self::SawCrlf, _) => Self::NoMatch,

            (Self::SawCrlfCr, b'\n') => Self::SawCrlfCrlf,
            // "\r\n\r\r" may still begin a fresh "\r\n\r\n".
            (Self::SawCrlfCr, b'\r') => Self::SawCr,
            (Self::SawCrlfCr, _) => Self::NoMatch,

            (Self::SawCrlfCrlf, _) => Self::SawCrlfCrlf,
        }
    }
}

/// Accumulates request bytes and locates the header/body boundary.
///
/// After the boundary is found the buffer keeps growing with body bytes;
/// [`body_available`](FrameScanner::body_available) exposes how many have
/// arrived past the boundary.
#[derive(Debug)]
pub(crate) struct FrameScanner {
    buffer: Vec<u8>,
    scanned: usize,
    state: FrameState,
    boundary: Option<usize>,
}

impl FrameScanner {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            scanned: 0,
            state: FrameState::NoMatch,
            boundary: None,
        }
    }

    /// Forgets the previous message but keeps the allocation.
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.state = FrameState::NoMatch;
        self.boundary = None;
    }

    /// Buffer to read socket bytes into.
    pub(crate) fn space(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Index one past the terminating `\r\n\r\n`, once seen.
    pub(crate) fn boundary(&self) -> Option<usize> {
        self.boundary
    }

    /// Scans bytes appended since the last call. Returns the boundary as
    /// soon as the state machine completes; further calls are no-ops.
    pub(crate) fn scan(&mut self) -> Option<usize> {
        if self.boundary.is_some() {
            return self.boundary;
        }

        while self.scanned < self.buffer.len() {
            if self.state == FrameState::NoMatch {
                // Nothing interesting can happen before the next CR.
                match memchr(b'\r', &self.buffer[self.scanned..]) {
                    Some(offset) => self.scanned += offset,
                    None => {
                        self.scanned = self.buffer.len();
                        break;
                    }
                }
            }

            self.state = self.state.advance(self.buffer[self.scanned]);
            self.scanned += 1;

            if self.state == FrameState::SawCrlfCrlf {
                self.boundary = Some(self.scanned);
                break;
            }
        }

        self.boundary
    }

    /// The complete header block, terminator included.
    pub(crate) fn header_block(&self) -> &[u8] {
        match self.boundary {
            Some(end) => &self.buffer[..end],
            None => &[],
        }
    }

    /// Bytes received past the header block so far.
    pub(crate) fn body_available(&self) -> usize {
        match self.boundary {
            Some(end) => self.buffer.len() - end,
            None => 0,
        }
    }

    /// Copies out exactly `length` body bytes.
    pub(crate) fn take_body(&self, length: usize) -> Vec<u8> {
        match self.boundary {
            Some(end) => self.buffer[end..end + length].to_vec(),
            None => Vec::new(),
        }
    }
}
