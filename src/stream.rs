//! Per-call stream reader.
//!
//! A [`Stream`] is what the RPC codec reads from. It owns the stream's
//! receive buffer and the reader chain on top of it, and refuses to touch
//! the transport again once a read has failed.

use std::sync::Arc;

use bytes::Bytes;

use crate::recv::{
    CallContext, LinkBuffer, RecvBuffer, RecvBufferReader, RecvMsg, StreamError,
    TransportReader, WindowHandler,
};

/// Told how many bytes the reader is about to ask for, before it asks.
pub type RequestRead = Arc<dyn Fn(usize) + Send + Sync>;

/// Inbound half of one RPC stream.
pub struct Stream {
    id: u32,
    ctx: CallContext,
    recv: Arc<RecvBuffer>,
    reader: TransportReader,
    request_read: Option<RequestRead>,
}

impl Stream {
    /// Create a server-side stream.
    ///
    /// Cancellation of `ctx` is reported as soon as the reader has to wait.
    pub fn server(id: u32, ctx: CallContext, window_handler: WindowHandler) -> Self {
        let (recv, slot) = RecvBuffer::channel();
        let reader = RecvBufferReader::new(ctx.clone(), Arc::clone(&recv), slot);
        Self::assemble(id, ctx, recv, reader, window_handler)
    }

    /// Create a client-side stream.
    ///
    /// Cancellation of `ctx` closes the stream through its own receive
    /// buffer, so data and trailers that arrived before it are read first.
    pub fn client(id: u32, ctx: CallContext, window_handler: WindowHandler) -> Self {
        let (recv, slot) = RecvBuffer::channel();
        let closer = Arc::clone(&recv);
        let reader = RecvBufferReader::new(ctx.clone(), Arc::clone(&recv), slot)
            .with_close_stream(Box::new(move |err| closer.put(RecvMsg::error(err))));
        Self::assemble(id, ctx, recv, reader, window_handler)
    }

    fn assemble(
        id: u32,
        ctx: CallContext,
        recv: Arc<RecvBuffer>,
        reader: RecvBufferReader,
        window_handler: WindowHandler,
    ) -> Self {
        Self {
            id,
            ctx,
            recv,
            reader: TransportReader::new(reader, window_handler),
            request_read: None,
        }
    }

    /// Install a hook called with the size of each read before it is issued.
    pub fn with_request_read(mut self, request_read: RequestRead) -> Self {
        self.request_read = Some(request_read);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// The buffer the connection's read side delivers into.
    pub fn recv_buffer(&self) -> &Arc<RecvBuffer> {
        &self.recv
    }

    /// The failure that ended this stream, if any.
    pub fn err(&self) -> Option<&StreamError> {
        self.reader.err()
    }

    pub async fn next(&mut self, n: usize) -> Result<Bytes, StreamError> {
        self.begin(n)?;
        self.reader.next(n).await
    }

    pub async fn peek(&mut self, n: usize) -> Result<Bytes, StreamError> {
        self.begin(n)?;
        self.reader.peek(n).await
    }

    pub async fn skip(&mut self, n: usize) -> Result<(), StreamError> {
        self.begin(n)?;
        self.reader.skip(n).await
    }

    pub async fn read_string(&mut self, n: usize) -> Result<String, StreamError> {
        self.begin(n)?;
        self.reader.read_string(n).await
    }

    pub async fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, StreamError> {
        self.begin(n)?;
        self.reader.read_binary(n).await
    }

    pub async fn read_byte(&mut self) -> Result<u8, StreamError> {
        self.begin(1)?;
        self.reader.read_byte().await
    }

    pub async fn slice(&mut self, n: usize) -> Result<LinkBuffer, StreamError> {
        self.begin(n)?;
        self.reader.slice(n).await
    }

    /// Read through `delim`. The size is unknown up front, so `request_read`
    /// is not consulted.
    pub async fn until(&mut self, delim: u8) -> Result<Bytes, StreamError> {
        self.failed()?;
        self.reader.until(delim).await
    }

    /// Fill `buf` completely.
    pub async fn read_full(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        let data = self.next(buf.len()).await?;
        buf.copy_from_slice(&data);
        Ok(())
    }

    pub fn release(&mut self) {
        self.reader.release();
    }

    pub fn len(&self) -> usize {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    fn failed(&self) -> Result<(), StreamError> {
        match self.reader.err() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    // Don't request a read if there was an error earlier.
    fn begin(&self, n: usize) -> Result<(), StreamError> {
        self.failed()?;
        if let Some(request_read) = &self.request_read {
            request_read(n);
        }
        Ok(())
    }
}
