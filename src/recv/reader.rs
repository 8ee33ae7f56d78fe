//! Blocking reads over a stream's arriving chunks.

use std::sync::Arc;

use bytes::{Buf, Bytes};

use super::buffer::{RecvBuffer, RecvSlot};
use super::context::CallContext;
use super::link::LinkBuffer;
use super::{RecvMsg, StreamError};

/// Closes the owning stream with the given error.
///
/// Client streams install one so that a canceled call is reported through
/// the receive buffer instead of bypassing it.
pub type CloseStream = Box<dyn Fn(StreamError) + Send + Sync>;

/// Reads a stream's data out of its [`RecvBuffer`].
///
/// Every read first ensures enough bytes are buffered, pulling further
/// messages from the buffer and waiting when none are ready. The first
/// terminal condition is cached and returned by every later call.
pub struct RecvBufferReader {
    close_stream: Option<CloseStream>,
    ctx: CallContext,
    recv: Arc<RecvBuffer>,
    slot: RecvSlot,
    last: LinkBuffer,
    err: Option<StreamError>,
}

impl RecvBufferReader {
    pub fn new(ctx: CallContext, recv: Arc<RecvBuffer>, slot: RecvSlot) -> Self {
        Self {
            close_stream: None,
            ctx,
            recv,
            slot,
            last: LinkBuffer::new(),
            err: None,
        }
    }

    /// Switch to client behaviour: on cancellation, close the stream through
    /// `close_stream` and keep draining the buffer instead of returning the
    /// context error directly.
    pub fn with_close_stream(mut self, close_stream: CloseStream) -> Self {
        self.close_stream = Some(close_stream);
        self
    }

    /// Read and consume `n` bytes.
    pub async fn next(&mut self, n: usize) -> Result<Bytes, StreamError> {
        self.check(n).await?;
        Ok(self.last.copy_to_bytes(n))
    }

    /// Return `n` bytes without consuming them.
    pub async fn peek(&mut self, n: usize) -> Result<Bytes, StreamError> {
        self.check(n).await?;
        Ok(self.last.peek(n))
    }

    pub async fn skip(&mut self, n: usize) -> Result<(), StreamError> {
        self.check(n).await?;
        self.last.advance(n);
        Ok(())
    }

    /// Read `n` bytes as UTF-8.
    ///
    /// The bytes are consumed even when they are not valid UTF-8.
    pub async fn read_string(&mut self, n: usize) -> Result<String, StreamError> {
        let buf = self.next(n).await?;
        std::str::from_utf8(&buf)
            .map(str::to_owned)
            .map_err(|_| StreamError::InvalidUtf8)
    }

    /// Read `n` bytes into an owned vector.
    pub async fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, StreamError> {
        self.check(n).await?;
        let mut out = vec![0u8; n];
        self.last.copy_to_slice(&mut out);
        Ok(out)
    }

    pub async fn read_byte(&mut self) -> Result<u8, StreamError> {
        self.check(1).await?;
        Ok(self.last.get_u8())
    }

    /// Detach the next `n` bytes as their own buffer without copying.
    pub async fn slice(&mut self, n: usize) -> Result<LinkBuffer, StreamError> {
        self.check(n).await?;
        Ok(self.last.split_to(n))
    }

    /// Read through the first occurrence of `delim`, inclusive.
    pub async fn until(&mut self, delim: u8) -> Result<Bytes, StreamError> {
        let mut want = 1;
        loop {
            self.check(want).await?;
            if let Some(pos) = self.last.position(delim) {
                return Ok(self.last.copy_to_bytes(pos + 1));
            }
            want = self.last.len() + 1;
        }
    }

    pub fn release(&mut self) {
        self.last.release();
    }

    /// Bytes buffered and readable without waiting.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    /// The cached terminal condition, if any.
    pub fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    async fn check(&mut self, n: usize) -> Result<(), StreamError> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        while self.last.len() < n {
            let filled = if self.close_stream.is_some() {
                self.fill_client().await
            } else {
                self.fill().await
            };
            if let Err(err) = filled {
                tracing::debug!(error = %err, buffered = self.last.len(), "Stream reader terminated");
                self.err = Some(err.clone());
                return Err(err);
            }
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<(), StreamError> {
        // Messages already delivered win over cancellation.
        let msg = tokio::select! {
            biased;
            msg = self.slot.get() => Some(msg),
            () = self.ctx.done() => None,
        };
        match msg {
            Some(msg) => self.fill_additional(msg),
            None => Err(self.context_err()),
        }
    }

    async fn fill_client(&mut self) -> Result<(), StreamError> {
        let msg = tokio::select! {
            biased;
            msg = self.slot.get() => Some(msg),
            () = self.ctx.done() => None,
        };
        let msg = match msg {
            Some(msg) => msg,
            None => {
                // The cancellation goes to the tail of the receive buffer, so
                // anything that arrived first (including the trailer) is read
                // before it. This also marks the stream done.
                let err = self.context_err();
                if let Some(close_stream) = &self.close_stream {
                    close_stream(err);
                }
                self.slot.get().await
            }
        };
        self.fill_additional(msg)
    }

    fn fill_additional(&mut self, msg: RecvMsg) -> Result<(), StreamError> {
        self.recv.load();
        match msg {
            RecvMsg::Data(buf) => {
                self.last.append(buf);
                Ok(())
            }
            RecvMsg::Terminal(err) => Err(err),
        }
    }

    fn context_err(&self) -> StreamError {
        self.ctx.err().unwrap_or(StreamError::Canceled)
    }
}
