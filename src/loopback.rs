//! Loopback benchmark.
//!
//! Opens a TCP connection to ourselves, writes length-prefixed frames from
//! concurrent producers through a [`SharedQueue`], and reads them back
//! through a flow-controlled [`Stream`] on the accepting side.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::flow::InboundWindow;
use crate::mux::{IoConnWriter, QueueStats, SharedQueue};
use crate::recv::{CallContext, RecvBuffer, RecvMsg, StreamError};
use crate::stream::Stream;

/// Length prefix of each benchmark frame.
pub const FRAME_HEADER_LEN: usize = 4;

const READ_CHUNK: usize = 16 * 1024;

/// Producers yield to the scheduler after this many frames.
const PRODUCER_BATCH: usize = 64;

/// Outcome of one loopback run.
#[derive(Debug, Clone)]
pub struct LoopbackReport {
    pub frames: usize,
    pub bytes: u64,
    pub elapsed: Duration,
    pub queue: QueueStats,
    pub window_updates: u64,
    pub window_bytes: u64,
}

impl LoopbackReport {
    pub fn frames_per_second(&self) -> f64 {
        self.frames as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

/// Encode `payload` with a big-endian `u32` length prefix.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Run the loopback benchmark described by `config`.
pub async fn run_loopback(config: &Config) -> Result<LoopbackReport> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .context("failed to bind loopback listener")?;
    let addr = listener.local_addr()?;

    let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let client = connected.context("failed to connect loopback client")?;
    let (server, _) = accepted.context("failed to accept loopback client")?;
    client.set_nodelay(true)?;
    tracing::info!(address = %addr, shards = config.shards, "Loopback connection established");

    let (_client_rd, client_wr) = client.into_split();
    let queue = SharedQueue::new(config.mux(), IoConnWriter::new(BufWriter::new(client_wr)))?;

    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let window = Arc::new(InboundWindow::new(config.window_size));
    let mut stream = Stream::server(1, CallContext::new(), window.handler(1, updates_tx));

    let reader = tokio::spawn(read_loop(server, Arc::clone(stream.recv_buffer())));
    let updates = tokio::spawn(async move {
        let (mut count, mut bytes) = (0u64, 0u64);
        while let Some(update) = updates_rx.recv().await {
            count += 1;
            bytes += u64::from(update.increment);
        }
        (count, bytes)
    });

    let start = Instant::now();
    let producers: Vec<_> = (0..config.producers)
        .map(|id| {
            let queue = queue.clone();
            let payload = vec![id as u8; config.payload_size];
            let messages = config.messages;
            tokio::spawn(async move {
                for seq in 0..messages {
                    let frame = encode_frame(&payload);
                    queue.add_one(Box::new(move || Some(frame)));
                    if seq % PRODUCER_BATCH == PRODUCER_BATCH - 1 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();

    let frames = config.producers * config.messages;
    let mut bytes = 0u64;
    for _ in 0..frames {
        let mut header = stream.next(FRAME_HEADER_LEN).await?;
        let len = header.get_u32() as usize;
        if len != config.payload_size {
            bail!("frame length {len} does not match payload size {}", config.payload_size);
        }
        stream.skip(len).await?;
        bytes += (FRAME_HEADER_LEN + len) as u64;
    }
    let elapsed = start.elapsed();

    for producer in producers {
        producer.await.context("producer task failed")?;
    }

    queue.close().await;
    match stream.next(1).await {
        Err(StreamError::Eof) => {}
        Ok(_) => bail!("unexpected data after the last frame"),
        Err(e) => return Err(e.into()),
    }
    reader.await.context("reader task failed")?;

    let queue_stats = queue.stats();
    drop(stream);
    let (window_updates, window_bytes) = updates.await.context("window task failed")?;

    Ok(LoopbackReport {
        frames,
        bytes,
        elapsed,
        queue: queue_stats,
        window_updates,
        window_bytes,
    })
}

/// Feed everything read from `socket` into `recv` until EOF or error.
async fn read_loop(mut socket: TcpStream, recv: Arc<RecvBuffer>) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match socket.read_buf(&mut buf).await {
            Ok(0) => {
                recv.put(RecvMsg::eof());
                return;
            }
            Ok(_) => recv.put(RecvMsg::Data(buf.split().freeze())),
            Err(e) => {
                tracing::warn!(error = %e, "Loopback read failed");
                recv.put(RecvMsg::error(e.into()));
                return;
            }
        }
    }
}
