// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Owning transport wrapper for buffers in flight downstream.

use std::sync::Arc;

use super::{BufferId, BufferPool, Claimant, PoolBuffer, PoolShared};

/// Owning claim token for one pool buffer handed off downstream.
///
/// Makes "this buffer is in flight" and "the buffer returns to its pool
/// when the last consumer is done" a single, non-bypassable operation:
/// the handle is created by wrapping an acquired [`PoolBuffer`], moves
/// rather than copies, and clears its claimant bit exactly once on drop.
/// While any handle exists it holds a strong reference to the pool state,
/// so the pool outlives the element that created it.
///
/// # Examples
///
/// ```
/// use dce::{BufferPool, TransportHandle};
///
/// # fn main() -> Result<(), dce::Error> {
/// let pool = BufferPool::create(2, 1024)?;
/// let mut buffer = pool.acquire()?;
/// buffer.payload_mut()[..4].copy_from_slice(b"data");
///
/// let handle = TransportHandle::wrap(buffer);
/// assert!(handle.is_owned_by(&pool));
/// assert_eq!(&handle.payload()[..4], b"data");
/// drop(handle); // releases the buffer back to the pool
/// assert_eq!(pool.in_use(), 0);
/// # Ok(())
/// # }
/// ```
pub struct TransportHandle {
    shared: Arc<PoolShared>,
    id: BufferId,
    claimant: Claimant,
}

impl TransportHandle {
    /// Wraps an acquired buffer for downstream hand-off.
    ///
    /// Swaps the buffer's `{Codec}` claim for `{Downstream}` in one pool
    /// critical section, so the buffer is never observable as free during
    /// the exchange.
    pub fn wrap(buffer: PoolBuffer) -> Self {
        let (shared, id) = buffer.into_parts();
        shared.exchange_claim(id, Claimant::Codec, Claimant::Downstream);
        Self {
            shared,
            id,
            claimant: Claimant::Downstream,
        }
    }

    /// Tabs an additional subsystem onto the same buffer, returning a
    /// second handle owning that claim.
    ///
    /// Used when a buffer is shared between the downstream path and the
    /// display sink: the buffer stays out of the free set until both
    /// handles are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `claimant` already holds the buffer.
    pub fn tab(&self, claimant: Claimant) -> Self {
        self.shared.claim(self.id, claimant);
        Self {
            shared: Arc::clone(&self.shared),
            id: self.id,
            claimant,
        }
    }

    /// The wrapped buffer's id.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The subsystem this handle claims the buffer for.
    pub fn claimant(&self) -> Claimant {
        self.claimant
    }

    /// The buffer's bytes.
    pub fn payload(&self) -> &[u8] {
        // Safety: this handle holds a claim on `id`; write access cannot
        // exist once the codec claim has been exchanged away.
        unsafe { self.shared.payload(self.id) }
    }

    /// Whether this buffer came from `pool`.
    ///
    /// Lets a downstream element that also writes into `pool` short-circuit
    /// to zero-copy: drop the handle to give the buffer straight back
    /// instead of copying it out.
    pub fn is_owned_by(&self, pool: &BufferPool) -> bool {
        Arc::ptr_eq(&self.shared, pool.shared())
    }
}

impl Drop for TransportHandle {
    /// Clears this handle's claimant bit; if the claimant set becomes
    /// empty the buffer re-enters the free set and a blocked acquirer is
    /// woken. Dropping the last handle of the last pool reference tears
    /// the pool itself down.
    fn drop(&mut self) {
        self.shared.release(self.id, self.claimant);
    }
}
