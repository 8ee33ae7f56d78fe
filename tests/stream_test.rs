//! Integration tests for the inbound path.
//!
//! Tests:
//! - Receive buffer ordering and terminal handling
//! - Reads spanning chunks and blocking until data or a terminal arrives
//! - Flow-control callbacks
//! - Cancellation on server and client streams
//! - End-to-end loopback run

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use sluice_mux::config::Config;
use sluice_mux::flow::{InboundWindow, WindowUpdate};
use sluice_mux::loopback::run_loopback;
use sluice_mux::recv::{CallContext, RecvBuffer, RecvMsg, StreamError, WindowHandler};
use sluice_mux::Stream;
use tokio::sync::mpsc;
use tokio_test::{assert_pending, assert_ready, task};

fn recording_window() -> (WindowHandler, Arc<Mutex<Vec<usize>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Arc::new(move |n| sink.lock().push(n)), seen)
}

fn data(msg: RecvMsg) -> Bytes {
    match msg {
        RecvMsg::Data(buf) => buf,
        RecvMsg::Terminal(err) => panic!("expected data, got {err}"),
    }
}

#[tokio::test]
async fn test_backlog_delivers_in_order_and_ignores_late_puts() {
    let (recv, mut slot) = RecvBuffer::channel();
    recv.put(RecvMsg::data("ab"));
    recv.put(RecvMsg::data("cd"));
    recv.put(RecvMsg::eof());
    recv.put(RecvMsg::data("ef"));

    assert_eq!(data(slot.get().await), "ab");
    recv.load();
    assert_eq!(data(slot.get().await), "cd");
    recv.load();
    assert_eq!(slot.get().await, RecvMsg::eof());
    recv.load();
    assert!(slot.try_get().is_none());
    assert_eq!(recv.backlog_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_keep_each_producer_order() {
    let (recv, slot) = RecvBuffer::channel();
    let mut stream_reader =
        sluice_mux::recv::RecvBufferReader::new(CallContext::new(), Arc::clone(&recv), slot);

    // Producers run while the reader is already pulling, so put, get and
    // load interleave freely.
    let producers: Vec<_> = (0..4u8)
        .map(|p| {
            let recv = Arc::clone(&recv);
            std::thread::spawn(move || {
                for seq in 0..250u8 {
                    recv.put(RecvMsg::data(vec![p, seq]));
                    if seq % 16 == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut next = [0u8; 4];
    for _ in 0..1000 {
        let unit = stream_reader.next(2).await.unwrap();
        let p = unit[0] as usize;
        assert_eq!(unit[1], next[p], "producer {p} out of order");
        next[p] = next[p].wrapping_add(1);
    }
    assert!(stream_reader.is_empty());

    for producer in producers {
        producer.join().unwrap();
    }
    recv.put(RecvMsg::eof());
    assert_eq!(stream_reader.next(1).await, Err(StreamError::Eof));
}

#[tokio::test]
async fn test_read_spans_chunks() {
    let (window, seen) = recording_window();
    let mut stream = Stream::server(1, CallContext::new(), window);
    stream.recv_buffer().put(RecvMsg::data("ab"));
    stream.recv_buffer().put(RecvMsg::data("cdef"));

    assert_eq!(stream.next(5).await.unwrap(), "abcde");
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.read_byte().await.unwrap(), b'f');
    assert_eq!(*seen.lock(), vec![5, 1]);
}

#[test]
fn test_read_blocks_until_terminal() {
    let (window, _) = recording_window();
    let mut stream = Stream::server(1, CallContext::new(), window);
    let recv = Arc::clone(stream.recv_buffer());
    recv.put(RecvMsg::data("abc"));

    let mut read = task::spawn(stream.next(10));
    assert_pending!(read.poll());

    recv.put(RecvMsg::data("de"));
    assert_pending!(read.poll());

    recv.put(RecvMsg::eof());
    assert!(read.is_woken());
    assert_eq!(assert_ready!(read.poll()), Err(StreamError::Eof));
}

#[tokio::test]
async fn test_window_callbacks_follow_reads() {
    let (window, seen) = recording_window();
    let mut stream = Stream::server(1, CallContext::new(), window);
    stream.recv_buffer().put(RecvMsg::data("0123456789xyz\n"));

    stream.skip(2).await.unwrap();
    assert_eq!(stream.peek(3).await.unwrap(), "234");
    assert_eq!(stream.read_string(3).await.unwrap(), "234");
    assert_eq!(stream.read_binary(4).await.unwrap(), b"5678");
    assert_eq!(stream.slice(1).await.unwrap().len(), 1);
    assert_eq!(stream.until(b'\n').await.unwrap(), "xyz\n");

    assert_eq!(*seen.lock(), vec![2, 3, 4, 1, 4]);
}

#[tokio::test]
async fn test_failure_is_sticky_and_silent() {
    let (window, seen) = recording_window();
    let mut stream = Stream::server(1, CallContext::new(), window);
    let recv = Arc::clone(stream.recv_buffer());
    recv.put(RecvMsg::error(StreamError::transport("connection reset")));

    let expected = StreamError::transport("connection reset");
    assert_eq!(stream.next(1).await, Err(expected.clone()));

    // Data arriving afterwards never reaches the caller.
    recv.put(RecvMsg::data("late"));
    assert_eq!(stream.next(1).await, Err(expected.clone()));
    assert_eq!(stream.read_byte().await, Err(expected));
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_invalid_utf8_fails_stream() {
    let (window, seen) = recording_window();
    let mut stream = Stream::server(1, CallContext::new(), window);
    stream.recv_buffer().put(RecvMsg::data(vec![0xff, 0xfe, b'o', b'k']));

    assert_eq!(stream.read_string(2).await, Err(StreamError::InvalidUtf8));
    assert_eq!(stream.next(2).await, Err(StreamError::InvalidUtf8));
    // The rejected bytes were consumed, so they are credited back once.
    assert_eq!(*seen.lock(), vec![2]);
}

#[tokio::test]
async fn test_server_cancel_returns_context_error() {
    let ctx = CallContext::new();
    let (window, _) = recording_window();
    let mut stream = Stream::server(1, ctx.clone(), window);
    stream.recv_buffer().put(RecvMsg::data("ab"));

    assert_eq!(stream.next(2).await.unwrap(), "ab");
    ctx.cancel();
    assert_eq!(stream.next(1).await, Err(StreamError::Canceled));
}

#[tokio::test]
async fn test_client_cancel_drains_arrived_data_first() {
    let ctx = CallContext::new();
    let (window, _) = recording_window();
    let mut stream = Stream::client(2, ctx.clone(), window);
    let recv = Arc::clone(stream.recv_buffer());
    recv.put(RecvMsg::data("ab"));
    recv.put(RecvMsg::data("cd"));

    assert_eq!(stream.next(1).await.unwrap(), "a");
    ctx.cancel();

    // Already-delivered bytes still satisfy reads.
    assert_eq!(stream.next(3).await.unwrap(), "bcd");
    assert_eq!(stream.next(1).await, Err(StreamError::Canceled));
    assert!(recv.is_terminated());
}

#[tokio::test]
async fn test_deadline_expires_blocked_read() {
    let ctx = CallContext::with_timeout(Duration::from_millis(20));
    let (window, _) = recording_window();
    let mut stream = Stream::server(1, ctx, window);

    assert_eq!(stream.next(1).await, Err(StreamError::DeadlineExceeded));
}

#[tokio::test]
async fn test_inbound_window_coalesces_stream_reads() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let window = Arc::new(InboundWindow::new(16));
    let mut stream = Stream::server(7, CallContext::new(), window.handler(7, tx));
    stream.recv_buffer().put(RecvMsg::data(vec![0u8; 20]));

    for _ in 0..3 {
        stream.next(1).await.unwrap();
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(window.pending(), 3);

    stream.next(1).await.unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        WindowUpdate {
            stream_id: 7,
            increment: 4
        }
    );
    assert_eq!(window.pending(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_loopback_end_to_end() {
    let config = Config::test_config();
    let report = tokio::time::timeout(Duration::from_secs(20), run_loopback(&config))
        .await
        .expect("loopback timed out")
        .unwrap();

    assert_eq!(report.frames, 300);
    assert_eq!(report.bytes, 300 * (4 + 32));
    assert_eq!(report.queue.getters_invoked, 300);
    assert_eq!(report.queue.getters_dropped, 0);
    assert!(report.queue.flushes >= 1);
    assert_eq!(report.queue.max_active_drains, 1);
    // 10800 bytes read against a 16383-byte threshold
    assert_eq!(report.window_updates, 0);
}
