//! Outbound connection writer boundary.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Error type for outbound connection operations.
///
/// Every variant is fatal to the connection.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write half of a connection as seen by the drain task.
///
/// `append` only stages a unit; nothing reaches the peer until `flush`.
/// Units are `Bytes`, so staging an existing buffer is zero-copy.
#[async_trait]
pub trait ConnWriter: Send + 'static {
    /// Stage `buf` for the next flush.
    fn append(&mut self, buf: Bytes) -> Result<(), ConnError>;

    /// Write all staged units to the peer.
    async fn flush(&mut self) -> Result<(), ConnError>;

    /// Close the connection. Idempotent.
    async fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// `ConnWriter` over any tokio `AsyncWrite`.
#[derive(Debug)]
pub struct IoConnWriter<W> {
    io: W,
    staged: VecDeque<Bytes>,
    staged_len: usize,
    closed: bool,
}

impl<W> IoConnWriter<W> {
    pub fn new(io: W) -> Self {
        Self {
            io,
            staged: VecDeque::new(),
            staged_len: 0,
            closed: false,
        }
    }

    /// Bytes staged but not yet flushed.
    pub fn staged_len(&self) -> usize {
        self.staged_len
    }

    pub fn get_ref(&self) -> &W {
        &self.io
    }
}

#[async_trait]
impl<W> ConnWriter for IoConnWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn append(&mut self, buf: Bytes) -> Result<(), ConnError> {
        if self.closed {
            return Err(ConnError::Closed);
        }
        if !buf.is_empty() {
            self.staged_len += buf.len();
            self.staged.push_back(buf);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnError> {
        if self.closed {
            return Err(ConnError::Closed);
        }
        while let Some(mut buf) = self.staged.pop_front() {
            let len = buf.len();
            if let Err(e) = self.io.write_all_buf(&mut buf).await {
                self.staged.clear();
                self.staged_len = 0;
                return Err(e.into());
            }
            self.staged_len -= len;
        }
        self.io.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.staged.clear();
        self.staged_len = 0;
        if let Err(e) = self.io.shutdown().await {
            tracing::debug!(error = %e, "Connection shutdown failed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
