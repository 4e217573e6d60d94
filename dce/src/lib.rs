// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! # DCE - DSP Codec Engine offload core
//!
//! Safe, idiomatic Rust building blocks for media elements that offload
//! audio/video/image encode and decode work to a DSP codec engine, moving
//! data through hardware-backed buffers.
//!
//! ## Overview
//!
//! The vendor codec engine is a closed shared library ([`dce_sys`] loads
//! it at runtime); the compression itself, DMA engines and hardware
//! allocation policy live behind it. What this crate supplies is the part
//! every offloading element needs and keeps getting wrong: the
//! buffer-pool and producer/consumer synchronization core between the
//! pipeline's chain thread and the worker thread that drives the codec,
//! with explicit drain and abort protocols so no thread ever blocks
//! forever across end-of-stream or teardown.
//!
//! ### Key Concepts
//!
//! - **Pool buffer**: one fixed-size, pre-allocated hardware-addressable
//!   region reused across many process cycles ([`BufferPool`])
//! - **Claimant**: a logical subsystem (codec, downstream, display)
//!   currently holding a pool buffer ([`Claimant`], [`TransportHandle`])
//! - **Window**: a fixed-size view into the staging ring handed to the
//!   worker for one process cycle ([`StagingRing`], [`Window`])
//! - **Drain**: the protocol that flushes all staged data before end of
//!   stream is reported
//! - **Rendezvous**: an N-party synchronization point used for the
//!   thread-start handshake and forced teardown wakeups ([`Rendezvous`])
//!
//! ## Architecture
//!
//! ```text
//! chain thread                     worker thread
//! ─────────────                    ─────────────
//! Session::enqueue ──► StagingRing ──► get_window
//!                                      BufferPool::acquire
//!                                      CodecProcessor::process
//!                                      TransportHandle::wrap ──► sink ──► downstream
//! ```
//!
//! ## Examples
//!
//! ### Encoding with a vendor codec
//!
//! ```no_run
//! use dce::{CodecParams, Session, SessionConfig};
//!
//! # fn main() -> Result<(), dce::Error> {
//! let api = dce::load_api("libdspce.so")?;
//! let engine = dce::Engine::open(api, "encode")?;
//!
//! let session = Session::spawn(
//!     SessionConfig::default(),
//!     Box::new(move || {
//!         let codec = engine.create_codec("h264enc", &CodecParams {
//!             bitrate: Some(4_000_000),
//!             width: Some(1280),
//!             height: Some(720),
//!             ..CodecParams::default()
//!         })?;
//!         Ok(Box::new(codec) as Box<_>)
//!     }),
//!     Box::new(|frame| {
//!         // Hand the frame downstream; dropping the handle returns the
//!         // buffer to the pool.
//!         println!("{} byte(s) at {:?}", frame.len, frame.timestamp);
//!         Ok(())
//!     }),
//! )?;
//!
//! session.enqueue(&[0u8; 8192], Some(0))?;
//! session.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`BufferPool`] and [`Session`] are `Send + Sync`; one chain thread
//!   feeds a session while its worker thread drives the codec
//! - [`Codec`] is `Send` but not `Sync` and lives on the worker thread
//! - Every suspension point (`acquire`, `get_window`, `meet`,
//!   backpressure waits) is paired with an always-reachable wake source
//!   invoked on every exit route, including EOS and error paths

mod config;
mod error;
mod rendezvous;

pub mod engine;
pub mod pool;
pub mod ring;
pub mod session;

pub use config::{
    DEFAULT_INPUT_WINDOW_COUNT, DEFAULT_OUTPUT_BUFFER_COUNT, DEFAULT_OUTPUT_BUFFER_SIZE,
    DEFAULT_QUEUE_DEPTH, SessionConfig,
};
pub use engine::{
    Codec, CodecParams, CodecProcessor, ContiguousAllocator, Engine, EngineApiHandle,
    ProcessOutcome, load_api,
};
pub use error::{Error, Result};
pub use pool::{
    BufferAllocator, BufferId, BufferPool, Claimant, HeapAllocator, PoolBuffer, Region,
    transport::TransportHandle,
};
pub use rendezvous::Rendezvous;
pub use ring::{StagingRing, Window};
pub use session::{
    FrameSink, OutputFrame, Session, WorkerState,
    queue::{QueueItem, QueuedSession},
};
