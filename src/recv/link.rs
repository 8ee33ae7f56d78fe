//! Chained chunk buffer backing a stream reader.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Arrived chunks, logically concatenated.
///
/// Chunks are kept as received. Reads that fall inside the front chunk are
/// zero-copy; reads spanning chunks copy once into a fresh buffer. Empty
/// chunks are never stored.
#[derive(Debug, Default, Clone)]
pub struct LinkBuffer {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl LinkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readable bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently linked.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Link `buf` after the existing data without copying.
    pub fn append(&mut self, buf: Bytes) {
        if buf.is_empty() {
            return;
        }
        self.len += buf.len();
        self.chunks.push_back(buf);
    }

    /// Return the first `n` bytes without consuming them.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are buffered.
    pub fn peek(&self, n: usize) -> Bytes {
        assert!(n <= self.len, "peek past end of buffer: {n} > {}", self.len);
        match self.chunks.front() {
            Some(front) if front.len() >= n => front.slice(..n),
            _ => {
                let mut out = BytesMut::with_capacity(n);
                for chunk in &self.chunks {
                    let take = (n - out.len()).min(chunk.len());
                    out.extend_from_slice(&chunk[..take]);
                    if out.len() == n {
                        break;
                    }
                }
                out.freeze()
            }
        }
    }

    /// Detach the first `n` bytes as a new buffer, sharing chunk storage.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are buffered.
    pub fn split_to(&mut self, n: usize) -> LinkBuffer {
        assert!(n <= self.len, "split past end of buffer: {n} > {}", self.len);
        let mut out = LinkBuffer::new();
        let mut rem = n;
        while rem > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= rem {
                rem -= front.len();
                if let Some(chunk) = self.chunks.pop_front() {
                    out.append(chunk);
                }
            } else {
                out.append(front.split_to(rem));
                rem = 0;
            }
        }
        self.len -= n;
        out
    }

    /// Offset of the first occurrence of `delim`.
    pub fn position(&self, delim: u8) -> Option<usize> {
        let mut offset = 0;
        for chunk in &self.chunks {
            if let Some(i) = chunk.iter().position(|&b| b == delim) {
                return Some(offset + i);
            }
            offset += chunk.len();
        }
        None
    }

    /// Drop spare chunk slots left behind by consumed data.
    pub fn release(&mut self) {
        self.chunks.shrink_to_fit();
    }
}

impl Buf for LinkBuffer {
    fn remaining(&self) -> usize {
        self.len
    }

    fn chunk(&self) -> &[u8] {
        self.chunks.front().map_or(&[], |b| b.as_ref())
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(cnt <= self.len, "advance past end of buffer: {cnt} > {}", self.len);
        self.len -= cnt;
        while cnt > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if cnt < front.len() {
                front.advance(cnt);
                return;
            }
            cnt -= front.len();
            self.chunks.pop_front();
        }
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        assert!(len <= self.len, "read past end of buffer: {len} > {}", self.len);
        if let Some(front) = self.chunks.front_mut() {
            if front.len() >= len {
                let out = front.split_to(len);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                self.len -= len;
                return out;
            }
        }
        let mut out = BytesMut::with_capacity(len);
        out.put((&mut *self).take(len));
        out.freeze()
    }
}
