//! In-memory transport double shared by the client and supervisor tests.
//!
//! `MockTransport` is a cheap handle over shared state: the test keeps one
//! clone to script the broker side and inspect what was written, the client
//! owns the other.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stompline::{ConnectError, Frame, Transport, TransportError, decode};

/// How long an empty `receive` waits, standing in for a socket read timeout.
pub const RECEIVE_WAIT: Duration = Duration::from_millis(20);

#[derive(Default)]
struct Inner {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<u8>,
    send_calls: usize,
    connect_failures: u32,
    connect_calls: u32,
    close_calls: u32,
    open: bool,
    fail_sends: bool,
    peer_closed: bool,
    hang_up_on_connect: bool,
    reply_connected: bool,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that answers every CONNECT with `CONNECTED`.
    pub fn broker() -> Self {
        let t = Self::new();
        t.inner.lock().unwrap().reply_connected = true;
        t
    }

    /// Queue one chunk for a future `receive`.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().inbound.push_back(bytes.to_vec());
    }

    /// Make the next `n` connect calls fail with "connection refused".
    pub fn fail_connects(&self, n: u32) {
        self.inner.lock().unwrap().connect_failures = n;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_sends = fail;
    }

    /// Simulate the broker closing the stream once queued chunks are drained.
    pub fn close_peer(&self) {
        self.inner.lock().unwrap().peer_closed = true;
    }

    /// Accept connections but close them before sending anything.
    pub fn hang_up_on_connect(&self) {
        self.inner.lock().unwrap().hang_up_on_connect = true;
    }

    pub fn connect_calls(&self) -> u32 {
        self.inner.lock().unwrap().connect_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.inner.lock().unwrap().close_calls
    }

    pub fn send_calls(&self) -> usize {
        self.inner.lock().unwrap().send_calls
    }

    pub fn sent_bytes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Every frame the client has written so far, in order.
    pub fn sent_frames(&self) -> Vec<Frame> {
        let bytes = self.sent_bytes();
        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some((frame, consumed)) = decode(&bytes, offset).expect("client wrote bad frame")
        {
            frames.push(frame);
            offset += consumed;
        }
        frames
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_calls += 1;
        if inner.connect_failures > 0 {
            inner.connect_failures -= 1;
            return Err(ConnectError::RefusedOrUnreachable {
                addr: format!("{}:{}", host, port),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        inner.open = true;
        inner.peer_closed = inner.hang_up_on_connect;
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.open {
            return Err(TransportError::Closed);
        }
        if inner.fail_sends {
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        inner.send_calls += 1;
        inner.sent.extend_from_slice(bytes);
        if inner.reply_connected && bytes.starts_with(b"CONNECT\n") {
            inner
                .inbound
                .push_back(b"CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0".to_vec());
        }
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize) -> Result<Bytes, TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.open {
                return Err(TransportError::Closed);
            }
            if let Some(mut chunk) = inner.inbound.pop_front() {
                if chunk.len() > max_bytes {
                    let rest = chunk.split_off(max_bytes);
                    inner.inbound.push_front(rest);
                }
                return Ok(Bytes::from(chunk));
            }
            if inner.peer_closed {
                inner.open = false;
                return Err(TransportError::Closed);
            }
        }
        tokio::time::sleep(RECEIVE_WAIT).await;
        Ok(Bytes::new())
    }

    async fn close(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.close_calls += 1;
        inner.open = false;
    }

    fn is_open(&self) -> bool {
        self.inner.lock().unwrap().open
    }
}
