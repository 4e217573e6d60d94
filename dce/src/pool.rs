// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity pool of hardware-backed buffers.
//!
//! A [`BufferPool`] owns a set of fixed-size, pre-allocated memory regions
//! that are reused across many encode/decode cycles. Each buffer carries a
//! *claimant set*, the logical subsystems currently holding it (codec,
//! downstream, display), and is eligible for [`acquire`](BufferPool::acquire)
//! only while that set is empty.
//!
//! # Key Types
//!
//! - [`BufferPool`]: cheaply cloneable pool handle (shared state behind `Arc`)
//! - [`PoolBuffer`]: exclusive write guard returned by `acquire`
//! - [`crate::TransportHandle`]: read-only claim token for downstream hand-off
//! - [`BufferAllocator`] / [`Region`]: seam for the opaque hardware allocator
//!
//! # Locking
//!
//! All claimant bookkeeping lives under one pool-wide mutex held only for
//! O(1) bitmask work. Payload access never takes the lock, and no codec or
//! I/O call ever executes while it is held. A release that empties a
//! claimant set notifies waiters inside the same critical section that
//! clears the bit, so a waking acquirer can never miss the free buffer.

pub mod transport;

use std::cell::UnsafeCell;
use std::sync::{Arc, Condvar, Mutex};

use crate::{Error, Result};

/// A logical subsystem that can hold a reference to a pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Claimant {
    /// The upstream feeder that fills input buffers.
    Producer = 1 << 0,
    /// The codec engine processing the buffer.
    Codec = 1 << 1,
    /// A downstream element the buffer was pushed to.
    Downstream = 1 << 2,
    /// A display/video sink rendering directly from the buffer.
    Display = 1 << 3,
}

impl Claimant {
    fn bit(self) -> u8 {
        self as u8
    }
}

/// Set of claimants currently holding one buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ClaimantSet(u8);

impl ClaimantSet {
    pub(crate) fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn contains(self, claimant: Claimant) -> bool {
        self.0 & claimant.bit() != 0
    }

    pub(crate) fn insert(&mut self, claimant: Claimant) {
        self.0 |= claimant.bit();
    }

    pub(crate) fn remove(&mut self, claimant: Claimant) {
        self.0 &= !claimant.bit();
    }
}

/// Identifier of one buffer within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) usize);

impl BufferId {
    /// Index of the buffer within its pool, `0..capacity`.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One addressable, fixed-size memory region backing a pool buffer.
///
/// The returned slices must refer to the same stable allocation for the
/// lifetime of the region (the pool hands out pointers into it while
/// claims are held).
pub trait Region: Send {
    /// The region's bytes.
    fn as_slice(&self) -> &[u8];
    /// The region's bytes, mutably.
    fn as_mut_slice(&mut self) -> &mut [u8];
}

impl Region for Box<[u8]> {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }
}

/// Opaque allocator returning addressable, fixed-size regions.
///
/// Hardware pipelines plug in a DMA-able allocator (see
/// `engine::ContiguousAllocator`); everything else uses [`HeapAllocator`].
pub trait BufferAllocator: Send + Sync {
    /// Allocates one region of exactly `len` bytes.
    fn allocate(&self, len: usize) -> Result<Box<dyn Region>>;
}

/// Plain heap allocator, the default backing for tests and software paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Result<Box<dyn Region>> {
        if len == 0 {
            return Err(Error::AllocationFailed("zero-length buffer".into()));
        }
        Ok(Box::new(vec![0u8; len].into_boxed_slice()))
    }
}

struct Slot {
    region: UnsafeCell<Box<dyn Region>>,
}

struct PoolState {
    claims: Vec<ClaimantSet>,
    /// Whether `acquire` suspends on exhaustion or fails fast.
    blocking: bool,
}

pub(crate) struct PoolShared {
    buffer_size: usize,
    slots: Vec<Slot>,
    state: Mutex<PoolState>,
    freed: Condvar,
}

// Safety: a slot's region is only ever accessed through a claim token
// (`PoolBuffer` for writes while `{Codec}` is the sole claimant,
// `TransportHandle` for reads afterwards). `acquire` hands out the write
// token only when the claimant set is empty, so no aliasing mutable access
// can exist; the bookkeeping itself is guarded by `state`.
unsafe impl Send for PoolShared {}
unsafe impl Sync for PoolShared {}

impl PoolShared {
    /// Adds `claimant` to a buffer's set. Asserts against double-claiming.
    pub(crate) fn claim(&self, id: BufferId, claimant: Claimant) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let set = &mut state.claims[id.0];
        assert!(
            !set.contains(claimant),
            "buffer {} already claimed by {:?}",
            id.0,
            claimant
        );
        set.insert(claimant);
    }

    /// Removes `claimant` from a buffer's set and, if the set becomes
    /// empty, wakes waiters inside the same critical section.
    ///
    /// # Panics
    ///
    /// Panics if the claimant did not hold the buffer: a double release is
    /// a programming error, never a silent no-op.
    pub(crate) fn release(&self, id: BufferId, claimant: Claimant) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let set = &mut state.claims[id.0];
        assert!(
            set.contains(claimant),
            "double release of buffer {} by {:?}",
            id.0,
            claimant
        );
        set.remove(claimant);
        if set.is_empty() {
            // notify_all: acquirers and idle-waiters share this condvar.
            self.freed.notify_all();
        }
    }

    /// Swaps one claimant for another in a single critical section, so the
    /// buffer is never observed unclaimed in between.
    pub(crate) fn exchange_claim(&self, id: BufferId, from: Claimant, to: Claimant) {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let set = &mut state.claims[id.0];
        assert!(
            set.contains(from),
            "buffer {} not held by {:?} during claim exchange",
            id.0,
            from
        );
        assert!(
            !set.contains(to),
            "buffer {} already claimed by {:?}",
            id.0,
            to
        );
        set.remove(from);
        set.insert(to);
    }

    /// Payload of a claimed buffer.
    ///
    /// # Safety
    ///
    /// The caller must hold a claim on `id`. Shared access is sound for any
    /// claimant; mutable access additionally requires that `{Codec}` is the
    /// sole claimant (the `PoolBuffer` guard guarantees this by type).
    pub(crate) unsafe fn payload(&self, id: BufferId) -> &[u8] {
        unsafe { (*self.slots[id.0].region.get()).as_slice() }
    }

    /// Mutable payload of an exclusively claimed buffer; see [`Self::payload`].
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn payload_mut(&self, id: BufferId) -> &mut [u8] {
        unsafe { (*self.slots[id.0].region.get()).as_mut_slice() }
    }
}

/// Fixed-capacity set of shareable hardware buffers.
///
/// The pool handle is cheaply cloneable; the backing state is destroyed
/// only after every handle *and* every outstanding [`PoolBuffer`] /
/// [`crate::TransportHandle`] has been dropped, so a buffer still in
/// flight downstream keeps its pool alive.
///
/// # Examples
///
/// ```
/// use dce::BufferPool;
///
/// # fn main() -> Result<(), dce::Error> {
/// let pool = BufferPool::create(3, 4096)?;
/// let mut buffer = pool.acquire()?;
/// buffer.payload_mut()[0] = 0x47;
/// drop(buffer); // claim cleared, buffer free again
/// assert_eq!(pool.in_use(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Allocates `capacity` buffers of `buffer_size` bytes on the heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if `capacity` is zero or the
    /// allocator cannot satisfy the request.
    pub fn create(capacity: usize, buffer_size: usize) -> Result<Self> {
        Self::create_with_allocator(capacity, buffer_size, &HeapAllocator)
    }

    /// Allocates the pool through an explicit allocator (e.g. the vendor's
    /// contiguous DMA allocator).
    pub fn create_with_allocator(
        capacity: usize,
        buffer_size: usize,
        allocator: &dyn BufferAllocator,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::AllocationFailed("pool capacity is zero".into()));
        }
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                region: UnsafeCell::new(allocator.allocate(buffer_size)?),
            });
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                buffer_size,
                slots,
                state: Mutex::new(PoolState {
                    claims: vec![ClaimantSet::default(); capacity],
                    blocking: true,
                }),
                freed: Condvar::new(),
            }),
        })
    }

    /// Acquires a free buffer, claiming it for the codec.
    ///
    /// The scan and the claim happen atomically under the pool lock: there
    /// is no window where another acquirer could observe the returned
    /// buffer as free. If no buffer is free and the pool's blocking policy
    /// is enabled (the default), the caller suspends until a release
    /// occurs; with the policy disabled this behaves like
    /// [`try_acquire`](Self::try_acquire).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] when no buffer is free and the pool is
    /// in non-blocking mode (including when the policy is flipped while
    /// the caller is suspended; a policy change wakes all waiters).
    pub fn acquire(&self) -> Result<PoolBuffer> {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        loop {
            if let Some(index) = state.claims.iter().position(|set| set.is_empty()) {
                state.claims[index].insert(Claimant::Codec);
                return Ok(PoolBuffer {
                    shared: Arc::clone(&self.shared),
                    id: BufferId(index),
                    released: false,
                });
            }
            if !state.blocking {
                return Err(Error::Exhausted);
            }
            state = self
                .shared
                .freed
                .wait(state)
                .expect("pool mutex poisoned");
        }
    }

    /// Acquires a free buffer without ever suspending, regardless of the
    /// pool's blocking policy.
    pub fn try_acquire(&self) -> Result<PoolBuffer> {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        match state.claims.iter().position(|set| set.is_empty()) {
            Some(index) => {
                state.claims[index].insert(Claimant::Codec);
                Ok(PoolBuffer {
                    shared: Arc::clone(&self.shared),
                    id: BufferId(index),
                    released: false,
                })
            }
            None => Err(Error::Exhausted),
        }
    }

    /// Toggles blocking vs. fail-fast [`acquire`](Self::acquire) behavior.
    ///
    /// Disabling the policy wakes every suspended acquirer so it re-observes
    /// the policy and returns [`Error::Exhausted`]; this doubles as the
    /// guaranteed-wake source for pool waits on the forced-shutdown path.
    pub fn set_blocking_policy(&self, blocking: bool) {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        state.blocking = blocking;
        self.shared.freed.notify_all();
    }

    /// Blocks until every buffer's claimant set is empty.
    ///
    /// Used on the graceful drain path to hold the `Stopped` transition
    /// until all outstanding output buffers have been reclaimed. The wait
    /// observes the blocking policy: flipping the pool non-blocking (the
    /// forced-shutdown path) abandons the wait.
    pub fn wait_until_idle(&self) {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        while state.blocking && state.claims.iter().any(|set| !set.is_empty()) {
            state = self
                .shared
                .freed
                .wait(state)
                .expect("pool mutex poisoned");
        }
    }

    /// Number of buffers in the pool.
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Size in bytes of each buffer.
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Number of buffers with a non-empty claimant set.
    pub fn in_use(&self) -> usize {
        let state = self.shared.state.lock().expect("pool mutex poisoned");
        state.claims.iter().filter(|set| !set.is_empty()).count()
    }

    /// Number of buffers currently eligible for acquire.
    pub fn free_count(&self) -> usize {
        self.capacity() - self.in_use()
    }

    pub(crate) fn shared(&self) -> &Arc<PoolShared> {
        &self.shared
    }
}

/// Exclusive write guard over one acquired pool buffer.
///
/// Holds the `{Codec}` claim; the claim is cleared exactly once, either by
/// dropping the guard or by wrapping it into a
/// [`crate::TransportHandle`] for downstream hand-off.
pub struct PoolBuffer {
    shared: Arc<PoolShared>,
    id: BufferId,
    released: bool,
}

impl PoolBuffer {
    /// This buffer's id within its pool.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Byte capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.shared.buffer_size
    }

    /// The buffer's bytes.
    pub fn payload(&self) -> &[u8] {
        // Safety: this guard holds the sole claim on `id`.
        unsafe { self.shared.payload(self.id) }
    }

    /// The buffer's bytes, mutably.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // Safety: this guard holds the sole claim on `id`.
        unsafe { self.shared.payload_mut(self.id) }
    }

    pub(crate) fn into_parts(mut self) -> (Arc<PoolShared>, BufferId) {
        self.released = true;
        (Arc::clone(&self.shared), self.id)
    }
}

impl Drop for PoolBuffer {
    /// Clears the codec claim; if the claimant set becomes empty the buffer
    /// is returned to the free set and a blocked acquirer is woken.
    fn drop(&mut self) {
        if !self.released {
            self.shared.release(self.id, Claimant::Codec);
        }
    }
}
