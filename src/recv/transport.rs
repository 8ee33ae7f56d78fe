//! Flow-control wrapper around [`RecvBufferReader`].

use std::sync::Arc;

use bytes::Bytes;

use super::link::LinkBuffer;
use super::reader::RecvBufferReader;
use super::StreamError;

/// Called with the byte count of every successful read.
///
/// Must not block; coalescing into window update frames is the callee's job.
pub type WindowHandler = Arc<dyn Fn(usize) + Send + Sync>;

/// Reports consumed bytes to the connection's flow control.
///
/// The first failed read is cached; from then on every call returns it
/// without touching the inner reader.
pub struct TransportReader {
    reader: RecvBufferReader,
    window_handler: WindowHandler,
    er: Option<StreamError>,
}

impl TransportReader {
    pub fn new(reader: RecvBufferReader, window_handler: WindowHandler) -> Self {
        Self {
            reader,
            window_handler,
            er: None,
        }
    }

    /// The cached failure, if any read has failed.
    pub fn err(&self) -> Option<&StreamError> {
        self.er.as_ref()
    }

    pub async fn next(&mut self, n: usize) -> Result<Bytes, StreamError> {
        self.failed()?;
        let res = self.reader.next(n).await;
        self.settle(res, n)
    }

    /// Peek does not consume, so it does not open the window.
    pub async fn peek(&mut self, n: usize) -> Result<Bytes, StreamError> {
        self.failed()?;
        let res = self.reader.peek(n).await;
        self.settle(res, 0)
    }

    pub async fn skip(&mut self, n: usize) -> Result<(), StreamError> {
        self.failed()?;
        let res = self.reader.skip(n).await;
        self.settle(res, n)
    }

    pub async fn read_string(&mut self, n: usize) -> Result<String, StreamError> {
        self.failed()?;
        let res = self.reader.read_string(n).await;
        // Invalid UTF-8 still consumed the bytes; hand them back to the window.
        if n > 0 && res == Err(StreamError::InvalidUtf8) {
            (self.window_handler)(n);
        }
        self.settle(res, n)
    }

    pub async fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, StreamError> {
        self.failed()?;
        let res = self.reader.read_binary(n).await;
        self.settle(res, n)
    }

    pub async fn read_byte(&mut self) -> Result<u8, StreamError> {
        self.failed()?;
        let res = self.reader.read_byte().await;
        self.settle(res, 1)
    }

    pub async fn slice(&mut self, n: usize) -> Result<LinkBuffer, StreamError> {
        self.failed()?;
        let res = self.reader.slice(n).await;
        self.settle(res, n)
    }

    pub async fn until(&mut self, delim: u8) -> Result<Bytes, StreamError> {
        self.failed()?;
        let res = self.reader.until(delim).await;
        let n = res.as_ref().map_or(0, Bytes::len);
        self.settle(res, n)
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
        match &self.er {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn settle<T>(&mut self, res: Result<T, StreamError>, consumed: usize) -> Result<T, StreamError> {
        match res {
            Ok(v) => {
                if consumed > 0 {
                    (self.window_handler)(consumed);
                }
                Ok(v)
            }
            Err(err) => {
                self.er = Some(err.clone());
                Err(err)
            }
        }
    }
}
