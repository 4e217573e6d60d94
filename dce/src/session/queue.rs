// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Bounded decoupling queue between the chain thread and the session.
//!
//! Some pipelines cannot afford to block the chain thread on ring
//! backpressure; a [`QueuedSession`] interposes a pump thread fed through
//! a bounded channel, so the chain thread only ever blocks on queue depth.
//! Control flow travels through the same channel as data, as explicit
//! [`QueueItem`] variants decoded by the pump, never as magic sentinel
//! values compared by address.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use crate::{Error, Result};

use super::{Session, WorkerState};

/// One item travelling through the decoupling queue.
pub enum QueueItem {
    /// An input chunk with its optional timestamp (nanoseconds).
    Data {
        /// The staged bytes.
        chunk: Vec<u8>,
        /// Timestamp carried into the staging ring.
        timestamp: Option<u64>,
    },
    /// End of stream: drain the session and keep the pump alive so the
    /// queue can still be shut down.
    FlushEos,
    /// Terminate the pump thread.
    Shutdown,
}

/// A [`Session`] fed through a bounded queue by a dedicated pump thread.
///
/// `enqueue` copies the chunk and returns as soon as there is queue room;
/// the pump thread absorbs the ring backpressure. Queue depth is bounded
/// by [`crate::SessionConfig::queue_depth`].
pub struct QueuedSession {
    session: Arc<Session>,
    tx: SyncSender<QueueItem>,
    pump: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl QueuedSession {
    /// Wraps a spawned session behind a pump thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the pump thread cannot be spawned.
    pub fn new(session: Session) -> Result<Self> {
        let depth = session.config.queue_depth;
        let session = Arc::new(session);
        let (tx, rx) = sync_channel(depth);

        let pump = std::thread::Builder::new()
            .name("dce-queue-pump".into())
            .spawn({
                let session = Arc::clone(&session);
                move || pump_loop(&session, rx)
            })
            .map_err(|err| Error::Other(format!("Failed to spawn queue pump: {err}")))?;

        Ok(Self {
            session,
            tx,
            pump: std::sync::Mutex::new(Some(pump)),
        })
    }

    /// Queues one input chunk.
    ///
    /// Blocks only on queue depth; the pump always drains the queue, even
    /// after an abort, so this cannot block indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] once the session has aborted.
    pub fn enqueue(&self, chunk: &[u8], timestamp: Option<u64>) -> Result<()> {
        if self.session.state() == WorkerState::Aborted {
            return Err(Error::Aborted);
        }
        self.tx
            .send(QueueItem::Data {
                chunk: chunk.to_vec(),
                timestamp,
            })
            .map_err(|_| Error::Aborted)
    }

    /// Queues an end-of-stream marker behind any pending data.
    pub fn signal_eos(&self) {
        let _ = self.tx.send(QueueItem::FlushEos);
    }

    /// Drains to end of stream, stops the pump and reaps the session.
    ///
    /// # Errors
    ///
    /// Surfaces the worker's terminal error if the session aborted.
    pub fn finish(&self) -> Result<()> {
        self.signal_eos();
        self.stop_pump();
        self.session.finish()
    }

    /// Forces the session down, then stops the pump.
    ///
    /// Forcing the session first guarantees the pump cannot stay blocked
    /// inside a ring suspension while the queue is being torn down.
    pub fn request_shutdown(&self) {
        self.session.request_shutdown();
        self.stop_pump();
    }

    /// Current worker state.
    pub fn state(&self) -> WorkerState {
        self.session.state()
    }

    /// Takes the worker's terminal error, if it aborted.
    pub fn take_error(&self) -> Option<Error> {
        self.session.take_error()
    }

    fn stop_pump(&self) {
        let _ = self.tx.send(QueueItem::Shutdown);
        let handle = self
            .pump
            .lock()
            .expect("queue mutex poisoned")
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("queue pump thread panicked");
        }
    }
}

impl Drop for QueuedSession {
    /// Stops the pump if the queue was dropped without an explicit
    /// teardown; the inner session's own drop handles the worker.
    fn drop(&mut self) {
        let live = self
            .pump
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false);
        if live {
            self.request_shutdown();
        }
    }
}

/// Pump body: decode items until `Shutdown`.
///
/// After a session failure the pump keeps draining and discarding, so
/// producers blocked on queue depth always make progress.
fn pump_loop(session: &Session, rx: Receiver<QueueItem>) {
    let mut dead = false;
    while let Ok(item) = rx.recv() {
        match item {
            QueueItem::Data { chunk, timestamp } => {
                if dead {
                    continue;
                }
                if let Err(err) = session.enqueue(&chunk, timestamp) {
                    tracing::error!(session = %session.id(), "queued enqueue failed: {err}");
                    dead = true;
                }
            }
            QueueItem::FlushEos => {
                if !dead {
                    session.signal_eos();
                }
            }
            QueueItem::Shutdown => break,
        }
    }
}
