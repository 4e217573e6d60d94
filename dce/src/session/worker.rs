// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! The per-session worker thread and its state machine.
//!
//! The worker owns the codec for its whole life: it creates the codec (so
//! a failed engine open aborts before any data moves), sizes and publishes
//! the staging ring, meets the startup rendezvous with the chain thread,
//! then loops pull-window → acquire-buffer → process → hand off →
//! acknowledge until the end-of-data sentinel or a failure.
//!
//! Every exit route, graceful stop and abort alike, releases the
//! worker's in-flight resources, wakes the producer side and forces the
//! teardown rendezvous, so no thread can be left blocked in a suspension
//! point across a session teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::engine::CodecProcessor;
use crate::pool::{BufferPool, Claimant};
use crate::pool::transport::TransportHandle;
use crate::ring::StagingRing;
use crate::{Error, SessionConfig};

use super::{FrameSink, OutputFrame, WorkerShared};

/// Lifecycle state of a session worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Codec engine opening; no data processed yet.
    Starting = 0,
    /// Steady-state processing.
    Running = 1,
    /// End of stream signalled; flushing staged data.
    Draining = 2,
    /// Terminal: a codec or pipeline failure occurred.
    Aborted = 3,
    /// Terminal: all data flushed and buffers reclaimed.
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            3 => WorkerState::Aborted,
            _ => WorkerState::Stopped,
        }
    }

    /// Whether the worker has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Aborted | WorkerState::Stopped)
    }
}

/// Atomic [`WorkerState`] cell.
///
/// Both the chain thread and the worker read-check the state before each
/// unit of work; a single compare-and-swap replaces the
/// lock-read-compare-unlock polling a mutex-guarded status flag would
/// need.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Starting as u8))
    }

    pub(crate) fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transitions `from -> to`; returns whether the CAS won.
    pub(crate) fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Body of the worker thread.
pub(crate) fn run(
    shared: Arc<WorkerShared>,
    pool: BufferPool,
    config: SessionConfig,
    factory: Box<dyn FnOnce() -> crate::Result<Box<dyn CodecProcessor>> + Send>,
    mut sink: FrameSink,
) {
    let span = tracing::debug_span!("codec_worker", session = %shared.id);
    let _enter = span.enter();

    let mut codec = match factory() {
        Ok(codec) => codec,
        Err(err) => {
            tracing::error!("Codec engine open failed: {err}");
            abort(&shared, None, err);
            return;
        }
    };

    let window_size = codec.input_window_size();
    let ring = match StagingRing::new(
        config.input_window_count.saturating_mul(window_size),
        window_size,
    ) {
        Ok(ring) => Arc::new(ring),
        Err(err) => {
            tracing::error!("Staging ring creation failed: {err}");
            abort(&shared, None, err);
            return;
        }
    };
    let _ = shared.ring.set(Arc::clone(&ring));

    tracing::debug!(window_size, ring_capacity = ring.capacity(), "worker ready");
    shared.startup.meet();

    // A forced shutdown issued before the ring was published could not
    // drain it; re-check now that both sides can see it.
    if shared.is_shutdown_forced() {
        ring.drain(true);
    }

    loop {
        let window = ring.get_window();
        if window.is_end_of_data() {
            drop(window);
            break;
        }

        // First window pulled: the session is live. Later iterations pick
        // up the EOS transition as soon as the ring starts draining.
        shared
            .state
            .transition(WorkerState::Starting, WorkerState::Running);
        if ring.is_draining() {
            shared
                .state
                .transition(WorkerState::Running, WorkerState::Draining);
        }

        if shared.is_shutdown_forced() {
            // Forced teardown: discard staged input without processing.
            let len = window.len();
            ring.data_consumed(window, len);
            continue;
        }

        let mut output = match pool.acquire() {
            Ok(buffer) => buffer,
            Err(Error::Exhausted) if shared.is_shutdown_forced() => {
                let len = window.len();
                ring.data_consumed(window, len);
                continue;
            }
            Err(err) => {
                abort(&shared, Some(&ring), err);
                return;
            }
        };

        let outcome = match codec.process(&window, output.payload_mut()) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("Codec process failed: {err}");
                drop(output);
                drop(window);
                abort(&shared, Some(&ring), err);
                return;
            }
        };

        if config.trace_buffers {
            tracing::trace!(
                consumed = outcome.bytes_consumed,
                produced = outcome.bytes_produced,
                bit_error = outcome.bit_error,
                buffer = output.id().index(),
                "process cycle"
            );
        }

        let consumed = outcome.bytes_consumed.min(window.len());
        if consumed == 0 {
            // The codec accepted the window but moved nothing; re-serving
            // the same bytes would spin forever.
            drop(output);
            drop(window);
            abort(
                &shared,
                Some(&ring),
                Error::Other("codec made no forward progress".into()),
            );
            return;
        }

        if outcome.bytes_produced > 0 {
            let handle = TransportHandle::wrap(output);
            let display = config
                .display_claim
                .then(|| handle.tab(Claimant::Display));
            let frame = OutputFrame {
                handle,
                display,
                len: outcome.bytes_produced,
                timestamp: window.timestamp(),
            };
            if let Err(err) = sink(frame) {
                tracing::error!("Downstream hand-off failed: {err}");
                drop(window);
                abort(&shared, Some(&ring), err);
                return;
            }
        }

        ring.data_consumed(window, consumed);
    }

    // Sentinel observed. Hold Stopped until downstream has returned every
    // outstanding buffer, unless a forced shutdown flipped the pool
    // non-blocking (which abandons the wait).
    if !shared.is_shutdown_forced() {
        pool.wait_until_idle();
    }
    if !shared.state.transition(WorkerState::Draining, WorkerState::Stopped) {
        // EOS with an empty ring can skip Running/Draining entirely.
        shared.state.store(WorkerState::Stopped);
    }
    tracing::debug!("worker stopped");
    shared.teardown.force();
}

/// Common abort path: record the error, fail the producer side fast, and
/// run the same cleanup the `Stopped` path runs so nothing leaks.
fn abort(shared: &Arc<WorkerShared>, ring: Option<&Arc<StagingRing>>, err: Error) {
    shared.set_error(err);
    shared.state.store(WorkerState::Aborted);
    if let Some(ring) = ring {
        ring.consumer_aborted();
    }
    shared.startup.force();
    shared.teardown.force();
}
