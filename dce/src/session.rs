// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Codec session: the surface the pipeline layer drives.
//!
//! A [`Session`] owns one worker thread, one output [`BufferPool`] and one
//! [`StagingRing`]. The chain thread feeds it with
//! [`enqueue`](Session::enqueue); the worker pulls windows, invokes the
//! codec and hands finished frames to the downstream sink callback.
//!
//! Teardown comes in two flavours: [`finish`](Session::finish) drains all
//! staged data to the end-of-data sentinel (normal EOS), while
//! [`request_shutdown`](Session::request_shutdown) forces every suspension
//! point awake and discards staged input (error teardown, state change to
//! NULL). Both rendezvous with the worker so neither side can wedge.

pub mod queue;
pub(crate) mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use uuid::Uuid;

use crate::engine::CodecProcessor;
use crate::pool::BufferPool;
use crate::pool::transport::TransportHandle;
use crate::rendezvous::Rendezvous;
use crate::ring::StagingRing;
use crate::{Error, Result, SessionConfig};

pub use worker::WorkerState;
use worker::StateCell;

/// One finished output frame handed to the downstream sink.
pub struct OutputFrame {
    /// Claim token for the output buffer; dropping it returns the buffer
    /// to the pool.
    pub handle: TransportHandle,
    /// Extra display claim on the same buffer, present when the session is
    /// configured with `display_claim`.
    pub display: Option<TransportHandle>,
    /// Valid bytes in the buffer.
    pub len: usize,
    /// Timestamp of the input window this frame was produced from,
    /// nanoseconds.
    pub timestamp: Option<u64>,
}

impl OutputFrame {
    /// The frame's encoded bytes.
    pub fn data(&self) -> &[u8] {
        &self.handle.payload()[..self.len]
    }
}

/// Downstream hand-off callback, invoked by the worker once per frame.
pub type FrameSink = Box<dyn FnMut(OutputFrame) -> Result<()> + Send>;

/// State shared between the session facade and its worker thread.
pub(crate) struct WorkerShared {
    pub(crate) id: Uuid,
    pub(crate) state: StateCell,
    shutdown: AtomicBool,
    pub(crate) startup: Rendezvous,
    pub(crate) teardown: Rendezvous,
    pub(crate) ring: OnceLock<Arc<StagingRing>>,
    error: Mutex<Option<Error>>,
}

impl WorkerShared {
    pub(crate) fn set_error(&self, err: Error) {
        let mut slot = self.error.lock().expect("session mutex poisoned");
        // First failure wins; later cleanup errors are secondary.
        slot.get_or_insert(err);
    }

    pub(crate) fn is_shutdown_forced(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// One codec session bound to one worker thread.
///
/// # Examples
///
/// ```no_run
/// use dce::{CodecParams, Session, SessionConfig};
///
/// # fn main() -> Result<(), dce::Error> {
/// let api = dce::load_api("libdspce.so")?;
/// let engine = dce::Engine::open(api, "encode")?;
/// let session = Session::spawn(
///     SessionConfig::default(),
///     Box::new(move || {
///         Ok(Box::new(engine.create_codec("aache", &CodecParams::default())?) as Box<_>)
///     }),
///     Box::new(|frame| {
///         println!("{} byte(s) encoded", frame.len);
///         Ok(())
///     }),
/// )?;
///
/// session.enqueue(&[0u8; 4096], Some(0))?;
/// session.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    shared: Arc<WorkerShared>,
    pool: BufferPool,
    config: SessionConfig,
    /// Set once the chain side has completed the startup rendezvous, so
    /// later calls never re-arrive at the 2-party barrier.
    handshake_done: AtomicBool,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Session {
    /// Spawns a session with a heap-backed output pool.
    ///
    /// `factory` runs on the worker thread and creates the codec; a
    /// failure there aborts the session before any data moves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an out-of-range knob and
    /// [`Error::AllocationFailed`] if the output pool cannot be allocated.
    pub fn spawn(
        config: SessionConfig,
        factory: Box<dyn FnOnce() -> Result<Box<dyn CodecProcessor>> + Send>,
        sink: FrameSink,
    ) -> Result<Self> {
        config.validate()?;
        let pool = BufferPool::create(config.output_buffer_count, config.output_buffer_size)?;
        Self::spawn_with_pool(config, pool, factory, sink)
    }

    /// Spawns a session around an existing pool (e.g. one created with the
    /// engine's contiguous allocator).
    pub fn spawn_with_pool(
        config: SessionConfig,
        pool: BufferPool,
        factory: Box<dyn FnOnce() -> Result<Box<dyn CodecProcessor>> + Send>,
        sink: FrameSink,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(WorkerShared {
            id: Uuid::new_v4(),
            state: StateCell::new(),
            shutdown: AtomicBool::new(false),
            startup: Rendezvous::new(2),
            teardown: Rendezvous::new(2),
            ring: OnceLock::new(),
            error: Mutex::new(None),
        });

        let thread = std::thread::Builder::new()
            .name("dce-worker".into())
            .spawn({
                let shared = Arc::clone(&shared);
                let pool = pool.clone();
                let config = config.clone();
                move || worker::run(shared, pool, config, factory, sink)
            })
            .map_err(|err| Error::Other(format!("Failed to spawn worker thread: {err}")))?;

        tracing::debug!(session = %shared.id, "session spawned");
        Ok(Self {
            shared,
            pool,
            config,
            handshake_done: AtomicBool::new(false),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stages one input chunk for the codec.
    ///
    /// The first call performs the startup handshake with the worker.
    /// When a backpressure threshold is configured, the call suspends
    /// until the staged byte count drops below it; the wait is woken by
    /// the worker's progress and by every teardown path.
    ///
    /// # Errors
    ///
    /// - [`Error::Aborted`] once the worker has aborted (immediately,
    ///   without blocking)
    /// - [`Error::Overrun`] if the chunk exceeds the ring's free space
    pub fn enqueue(&self, chunk: &[u8], timestamp: Option<u64>) -> Result<()> {
        let ring = self.handshake()?;

        if self.config.backpressure_bytes > 0 && chunk.len() <= ring.capacity() {
            let threshold = self
                .config
                .backpressure_bytes
                .min(ring.capacity() - chunk.len());
            ring.wait_for_space(threshold)
                .map_err(|_| Error::Aborted)?;
        }

        match ring.push(chunk, timestamp) {
            Err(Error::ConsumerAborted) => Err(Error::Aborted),
            other => other,
        }
    }

    /// Signals end of stream: the worker drains every staged byte, emits
    /// the remaining frames and stops.
    pub fn signal_eos(&self) {
        if let Ok(ring) = self.handshake() {
            ring.drain(false);
        }
    }

    /// Drains to end of stream, rendezvous with the worker's teardown and
    /// reaps its terminal result.
    ///
    /// # Errors
    ///
    /// Surfaces the worker's terminal error if the session aborted.
    pub fn finish(&self) -> Result<()> {
        self.signal_eos();
        self.shared.teardown.meet();
        self.join_worker();
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Forces the session down, discarding staged input.
    ///
    /// Every suspension point is actively woken: the startup rendezvous is
    /// forced, the ring is force-drained, and the pool is flipped
    /// non-blocking so a worker suspended in acquire fails out. Safe to
    /// call in any state, idempotent.
    pub fn request_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.startup.force();
        if let Some(ring) = self.shared.ring.get() {
            ring.drain(true);
        }
        self.pool.set_blocking_policy(false);
        self.shared.teardown.meet();
        self.join_worker();
        tracing::debug!(session = %self.shared.id, "session shut down");
    }

    /// Current worker state.
    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// Takes the worker's terminal error, if it aborted.
    pub fn take_error(&self) -> Option<Error> {
        self.shared
            .error
            .lock()
            .expect("session mutex poisoned")
            .take()
    }

    /// The session's output buffer pool.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Unique id of this session, used in log correlation.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// First-use handshake: waits for the worker to publish the ring, then
    /// fails fast if the session is already dead.
    fn handshake(&self) -> Result<Arc<StagingRing>> {
        if !self.handshake_done.load(Ordering::Acquire) {
            self.shared.startup.meet();
            self.handshake_done.store(true, Ordering::Release);
        }
        match self.shared.state.load() {
            WorkerState::Aborted => Err(Error::Aborted),
            _ => self
                .shared
                .ring
                .get()
                .cloned()
                .ok_or(Error::Aborted),
        }
    }

    fn join_worker(&self) {
        let handle = self
            .thread
            .lock()
            .expect("session mutex poisoned")
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!(session = %self.shared.id, "worker thread panicked");
            self.shared.set_error(Error::Other("worker thread panicked".into()));
            self.shared.state.store(WorkerState::Aborted);
        }
    }
}

impl Drop for Session {
    /// Forces teardown if the session was dropped without `finish` or
    /// `request_shutdown`, so no thread outlives the element.
    fn drop(&mut self) {
        let live = self
            .thread
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        if live {
            tracing::debug!(session = %self.shared.id, "session dropped while live, forcing shutdown");
            self.request_shutdown();
        }
    }
}
