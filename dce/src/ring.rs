// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Staging ring between the chain thread and the codec worker.
//!
//! A [`StagingRing`] accepts variable-sized input chunks from a single
//! producer and serves fixed-size contiguous *windows* to a single
//! consumer. Windows may be consumed partially; unconsumed bytes stay at
//! the front of the ring for the next window. Once draining, the consumer
//! receives whatever is pending (up to one window per call) and finally a
//! zero-length window as the end-of-data sentinel.
//!
//! # Contiguity
//!
//! The backing store is `capacity + window_size` bytes. When a window
//! straddles the wrap point, the wrapped head is copied into the spill
//! region past the end (under the ring lock, before the window is handed
//! out) so every window is one contiguous slice. The producer only ever
//! writes into free space and never touches the spill region, which keeps
//! an outstanding window stable without holding the lock.
//!
//! # Locking
//!
//! One mutex covers the cursors and flags; it is held only for the
//! `push` / `get_window` / `data_consumed` critical sections. No codec or
//! I/O call executes under it.

use std::sync::{Condvar, Mutex};

use crate::{Error, Result};

struct RingState {
    buf: Box<[u8]>,
    /// Read cursor, `0..capacity`.
    read: usize,
    /// Bytes staged and not yet consumed.
    pending: usize,
    draining: bool,
    aborted: bool,
    /// Timestamp latched by the first `push` since the last window.
    timestamp: Option<u64>,
    /// Single-consumer protocol: set while a window is unacknowledged.
    window_outstanding: bool,
}

impl RingState {
    fn write_pos(&self, capacity: usize) -> usize {
        (self.read + self.pending) % capacity
    }
}

/// Ring buffer staging input chunks into fixed-size codec windows.
///
/// Created per encode/decode session; dropping it (or calling
/// [`consumer_aborted`](StagingRing::consumer_aborted) /
/// [`drain`](StagingRing::drain) with `force`) unblocks both sides, so no
/// thread is left waiting across a session teardown.
pub struct StagingRing {
    capacity: usize,
    window_size: usize,
    state: Mutex<RingState>,
    /// Consumer waits here for a full window (or drain).
    data_ready: Condvar,
    /// Producer waits here in [`StagingRing::wait_for_space`].
    space_ready: Condvar,
}

impl StagingRing {
    /// Creates a ring of `capacity` bytes serving `window_size`-byte windows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless
    /// `0 < window_size <= capacity`.
    pub fn new(capacity: usize, window_size: usize) -> Result<Self> {
        if window_size == 0 || capacity == 0 {
            return Err(Error::InvalidConfig(
                "staging ring capacity and window size must be non-zero".into(),
            ));
        }
        if window_size > capacity {
            return Err(Error::InvalidConfig(format!(
                "window size {window_size} exceeds ring capacity {capacity}"
            )));
        }
        Ok(Self {
            capacity,
            window_size,
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity + window_size].into_boxed_slice(),
                read: 0,
                pending: 0,
                draining: false,
                aborted: false,
                timestamp: None,
                window_outstanding: false,
            }),
            data_ready: Condvar::new(),
            space_ready: Condvar::new(),
        })
    }

    /// Stages one input chunk.
    ///
    /// Never blocks: a chunk that does not fit in the free space is a
    /// stream error. Producer-side backpressure belongs in
    /// [`wait_for_space`](Self::wait_for_space), ahead of the push.
    ///
    /// The chunk's timestamp is latched if no timestamp is currently
    /// pending; the next window delivered carries it.
    ///
    /// # Errors
    ///
    /// - [`Error::Overrun`] if `chunk` exceeds the free space (fatal)
    /// - [`Error::ConsumerAborted`] once the worker has aborted
    /// - [`Error::Other`] if called after [`drain`](Self::drain)
    pub fn push(&self, chunk: &[u8], timestamp: Option<u64>) -> Result<()> {
        let mut state = self.state.lock().expect("ring mutex poisoned");
        if state.aborted {
            return Err(Error::ConsumerAborted);
        }
        if state.draining {
            return Err(Error::Other("staging ring is draining".into()));
        }
        if chunk.is_empty() {
            return Ok(());
        }
        if self.capacity - state.pending < chunk.len() {
            return Err(Error::Overrun {
                pending: state.pending,
                chunk: chunk.len(),
                capacity: self.capacity,
            });
        }

        let pos = state.write_pos(self.capacity);
        let first = chunk.len().min(self.capacity - pos);
        state.buf[pos..pos + first].copy_from_slice(&chunk[..first]);
        if first < chunk.len() {
            let rest = chunk.len() - first;
            state.buf[..rest].copy_from_slice(&chunk[first..]);
        }

        if state.timestamp.is_none() {
            state.timestamp = timestamp;
        }
        state.pending += chunk.len();
        self.data_ready.notify_one();
        Ok(())
    }

    /// Blocks the producer until the pending byte count drops to
    /// `threshold` or below.
    ///
    /// Woken by [`data_consumed`](Self::data_consumed), by a forced
    /// [`drain`](Self::drain) and by
    /// [`consumer_aborted`](Self::consumer_aborted), so a producer can
    /// never be left waiting across a teardown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConsumerAborted`] once the worker has aborted.
    pub fn wait_for_space(&self, threshold: usize) -> Result<()> {
        let mut state = self.state.lock().expect("ring mutex poisoned");
        while state.pending > threshold && !state.aborted && !state.draining {
            state = self
                .space_ready
                .wait(state)
                .expect("ring mutex poisoned");
        }
        if state.aborted {
            return Err(Error::ConsumerAborted);
        }
        Ok(())
    }

    /// Serves the next window to the consumer, blocking until a full
    /// window is available or the ring is draining.
    ///
    /// While draining, returns whatever is pending (at most one window per
    /// call); a zero-length window is the end-of-data sentinel. A short
    /// window is only ever returned at end of stream: a final chunk that
    /// does not fill a window keeps the consumer blocked until drain.
    ///
    /// # Panics
    ///
    /// Panics if the previous window has not been acknowledged with
    /// [`data_consumed`](Self::data_consumed) (single-consumer protocol).
    pub fn get_window(&self) -> Window<'_> {
        let mut state = self.state.lock().expect("ring mutex poisoned");
        assert!(
            !state.window_outstanding,
            "get_window called with an unacknowledged window outstanding"
        );

        let len = loop {
            if state.aborted {
                break 0;
            }
            if state.pending >= self.window_size {
                break self.window_size;
            }
            if state.draining {
                break state.pending;
            }
            state = self
                .data_ready
                .wait(state)
                .expect("ring mutex poisoned");
        };

        let start = state.read;
        if start + len > self.capacity {
            // Window wraps: copy the wrapped head into the spill region so
            // the caller sees one contiguous slice.
            let spill = start + len - self.capacity;
            let (body, tail) = state.buf.split_at_mut(self.capacity);
            tail[..spill].copy_from_slice(&body[..spill]);
        }

        state.window_outstanding = true;
        let timestamp = state.timestamp.take();
        let ptr = state.buf[start..].as_ptr();
        Window {
            ring: self,
            ptr,
            len,
            timestamp,
            acked: false,
        }
    }

    /// Acknowledges consumption of `n_bytes` from `window` and advances
    /// the read cursor; any unconsumed suffix stays at the front of the
    /// ring for the next [`get_window`](Self::get_window).
    ///
    /// # Panics
    ///
    /// Panics if `n_bytes` exceeds the window's length.
    pub fn data_consumed(&self, mut window: Window<'_>, n_bytes: usize) {
        assert!(
            n_bytes <= window.len,
            "consumed {n_bytes} byte(s) from a {}-byte window",
            window.len
        );
        window.acked = true;
        let mut state = self.state.lock().expect("ring mutex poisoned");
        state.read = (state.read + n_bytes) % self.capacity;
        state.pending -= n_bytes;
        state.window_outstanding = false;
        self.space_ready.notify_all();
    }

    /// Transitions the ring to draining.
    ///
    /// The consumer is woken and from now on receives short windows down
    /// to the zero-length sentinel. With `force`, producer-side waiters
    /// are woken as well; that is the error-teardown path, not normal EOS.
    pub fn drain(&self, force: bool) {
        let mut state = self.state.lock().expect("ring mutex poisoned");
        state.draining = true;
        self.data_ready.notify_one();
        if force {
            self.space_ready.notify_all();
        }
    }

    /// Marks the consumer as aborted and permanently wakes any blocked
    /// producer with an error, so the chain thread cannot hang waiting for
    /// ring space after a codec failure.
    pub fn consumer_aborted(&self) {
        let mut state = self.state.lock().expect("ring mutex poisoned");
        state.aborted = true;
        self.data_ready.notify_one();
        self.space_ready.notify_all();
    }

    /// Ring capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fixed window size in bytes.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Bytes currently staged and unconsumed.
    pub fn pending(&self) -> usize {
        self.state.lock().expect("ring mutex poisoned").pending
    }

    /// Whether the ring has entered draining.
    pub fn is_draining(&self) -> bool {
        self.state.lock().expect("ring mutex poisoned").draining
    }
}

/// One contiguous view into the staging ring, handed to the consumer for
/// one processing step.
///
/// Dereferences to the window's bytes. Dropping the window without
/// acknowledging it re-arms the consumer side without advancing the read
/// cursor (the same bytes are served again).
pub struct Window<'a> {
    ring: &'a StagingRing,
    ptr: *const u8,
    len: usize,
    timestamp: Option<u64>,
    acked: bool,
}

impl Window<'_> {
    /// Window length in bytes; shorter than the ring's window size only
    /// while draining.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A zero-length window is the end-of-data sentinel.
    pub fn is_end_of_data(&self) -> bool {
        self.len == 0
    }

    /// Timestamp latched when the window's first bytes were pushed.
    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }
}

impl std::ops::Deref for Window<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: the window region is pending data (plus spill copied
        // under the lock); the producer only writes free space, and the
        // single-consumer protocol keeps the region stable until this
        // window is acknowledged or dropped.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for Window<'_> {
    /// Re-arms the consumer side if the window was never acknowledged.
    fn drop(&mut self) {
        if !self.acked {
            let mut state = self.ring.state.lock().expect("ring mutex poisoned");
            state.window_outstanding = false;
        }
    }
}
