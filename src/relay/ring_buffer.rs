//! Bounded ring buffer with per-client read cursors, single producer,
//! many readers. Writes never block on slow readers; a reader that
//! falls further behind than the buffer's capacity is overrun and must
//! be dropped by its caller.

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::errors::{AppError, AppResult};

struct RingState {
    buf: Vec<u8>,
    /// Total bytes ever written (monotonic); `buf[pos % capacity]` is the
    /// most recently written byte at `pos - 1`.
    write_pos: u64,
    closed: bool,
}

pub struct RingBuffer {
    capacity: usize,
    state: Mutex<RingState>,
    notify: Notify,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(RingState { buf: vec![0u8; capacity], write_pos: 0, closed: false }),
            notify: Notify::new(),
        }
    }

    /// Append producer bytes, overwriting the oldest data once the ring
    /// wraps. Never blocks.
    pub fn write(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        for &byte in data {
            let idx = (state.write_pos as usize) % self.capacity;
            state.buf[idx] = byte;
            state.write_pos += 1;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    /// A cursor positioned at the current write head — a newly joined
    /// client sees bytes from "now", not from stream start.
    pub fn tail_cursor(&self) -> u64 {
        self.state.lock().unwrap().write_pos
    }

    /// Block until new bytes are available past `cursor`, then return
    /// them and the advanced cursor. Returns `Ok(None)` once the
    /// session has closed and no more data will ever arrive.
    pub async fn read_from(&self, cursor: u64) -> AppResult<Option<(Vec<u8>, u64)>> {
        loop {
            {
                let state = self.state.lock().unwrap();
                let oldest_available = state.write_pos.saturating_sub(self.capacity as u64);
                if cursor < oldest_available {
                    return Err(AppError::client_overrun());
                }
                if state.write_pos > cursor {
                    let mut out = Vec::with_capacity((state.write_pos - cursor) as usize);
                    for pos in cursor..state.write_pos {
                        out.push(state.buf[(pos as usize) % self.capacity]);
                    }
                    return Ok(Some((out, state.write_pos)));
                }
                if state.closed {
                    return Ok(None);
                }
            }
            self.notify.notified().await;
        }
    }
}
