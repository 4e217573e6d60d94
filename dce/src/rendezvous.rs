// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! N-party rendezvous barrier with a forced-release path.
//!
//! The standard library barrier has no way to release waiters that will
//! never be joined by their missing parties, which is exactly what a
//! teardown sequence needs when one side has already exited. [`Rendezvous`]
//! adds [`force`](Rendezvous::force): it releases every current waiter,
//! latches the barrier open so late arrivals pass straight through, and
//! stays open until [`reset`](Rendezvous::reset) re-arms it.
//!
//! Used for the 2-party startup handshake between the chain thread and the
//! worker thread, and for the teardown handshake on every worker exit route.

use std::sync::{Condvar, Mutex};

struct RendezvousState {
    /// Arrivals in the current generation.
    arrived: u32,
    /// Incremented each time a generation completes; waiters watch it.
    generation: u64,
    /// Latched by `force`; cleared by `reset`.
    forced: bool,
}

/// Reusable N-party synchronization point.
///
/// `parties` threads call [`meet`](Rendezvous::meet); all of them block
/// until the last one arrives, then all are released together and the
/// barrier re-arms for the next round.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dce::Rendezvous;
///
/// let barrier = Arc::new(Rendezvous::new(2));
/// let other = Arc::clone(&barrier);
/// let handle = std::thread::spawn(move || other.meet());
/// barrier.meet();
/// handle.join().unwrap();
/// ```
pub struct Rendezvous {
    parties: u32,
    state: Mutex<RendezvousState>,
    released: Condvar,
}

impl Rendezvous {
    /// Creates a rendezvous for `parties` threads.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    pub fn new(parties: u32) -> Self {
        assert!(parties > 0, "a rendezvous needs at least one party");
        Self {
            parties,
            state: Mutex::new(RendezvousState {
                arrived: 0,
                generation: 0,
                forced: false,
            }),
            released: Condvar::new(),
        }
    }

    /// Blocks until `parties` threads have arrived in the current
    /// generation, then releases all of them together.
    ///
    /// Returns immediately if the rendezvous has been [`force`]d open and
    /// not yet [`reset`].
    ///
    /// [`force`]: Rendezvous::force
    /// [`reset`]: Rendezvous::reset
    pub fn meet(&self) {
        let mut state = self.state.lock().expect("rendezvous mutex poisoned");
        if state.forced {
            return;
        }

        state.arrived += 1;
        if state.arrived >= self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return;
        }

        let generation = state.generation;
        while state.generation == generation && !state.forced {
            state = self
                .released
                .wait(state)
                .expect("rendezvous mutex poisoned");
        }
    }

    /// Releases every thread currently blocked in [`meet`](Rendezvous::meet)
    /// as if the arrival count were satisfied, and latches the rendezvous
    /// open so threads that have not arrived yet cannot wedge on it.
    ///
    /// Shutdown-path only; never called in the steady-state data path.
    pub fn force(&self) {
        let mut state = self.state.lock().expect("rendezvous mutex poisoned");
        state.arrived = 0;
        state.generation = state.generation.wrapping_add(1);
        state.forced = true;
        self.released.notify_all();
    }

    /// Re-arms the rendezvous without releasing anyone.
    ///
    /// Clears a pending [`force`](Rendezvous::force) latch and discards any
    /// partial arrival count, so the same object can be reused for a later
    /// handshake round with fresh semantics.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("rendezvous mutex poisoned");
        state.arrived = 0;
        state.forced = false;
    }

    /// Number of parties this rendezvous synchronizes.
    pub fn parties(&self) -> u32 {
        self.parties
    }
}
