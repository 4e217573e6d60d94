// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Safe wrappers around the vendor codec engine.
//!
//! This module wraps the raw [`dce_sys`] function table with RAII types:
//! [`Engine`] (an open engine, closed when the last reference drops),
//! [`Codec`] (one codec instance, deleted on drop) and
//! [`ContiguousAllocator`] (the engine's DMA-able memory, pluggable into
//! [`crate::BufferPool`]).
//!
//! The [`CodecProcessor`] trait is the seam the session worker drives: the
//! vendor [`Codec`] implements it, and tests substitute in-process fakes so
//! the synchronization core is exercised without the vendor library.

use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pool::{BufferAllocator, Region};
use crate::{Error, Result};

/// Shared handle to one loaded vendor library.
pub type EngineApiHandle = Arc<dce_sys::Api>;

/// Loads the vendor codec-engine shared library and resolves its symbols.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), dce::Error> {
/// let api = dce::load_api("libdspce.so")?;
/// let engine = dce::Engine::open(api, "encode")?;
/// # Ok(())
/// # }
/// ```
pub fn load_api<P: AsRef<std::ffi::OsStr>>(path: P) -> Result<EngineApiHandle> {
    // Safety: the caller names the vendor library; loading it is the whole
    // point of this entry.
    let api = unsafe { dce_sys::Api::load(path)? };
    Ok(Arc::new(api))
}

/// Internal shared context for an open engine.
///
/// Separated from [`Engine`] so codecs and allocators can outlive the
/// element that opened the engine; the engine is closed when the last
/// reference is dropped.
pub(crate) struct EngineContext {
    pub(crate) api: EngineApiHandle,
    pub(crate) engine: dce_sys::Engine,
}

// Safety: the vendor guarantees thread-safety at the engine level (but NOT
// at the codec level). Multiple threads can share an EngineContext to
// create codecs or allocate memory.
unsafe impl Send for EngineContext {}
unsafe impl Sync for EngineContext {}

impl Drop for EngineContext {
    /// Closes the engine when the last reference is dropped.
    fn drop(&mut self) {
        if !self.engine.is_null()
            && let Err(err) = Error::from_status(unsafe { (self.api.engine_close)(self.engine) })
        {
            tracing::error!("Failed to close codec engine: {:?}", err);
        }
    }
}

/// An open codec engine.
///
/// Cheaply cloneable and thread-safe; [`Codec`]s created from it are not
/// thread-safe and belong to one thread at a time.
#[derive(Clone)]
pub struct Engine {
    context: Arc<EngineContext>,
}

impl Engine {
    /// Opens the named engine from the vendor configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine name is unknown to the vendor
    /// configuration or the engine fails to initialize.
    pub fn open(api: EngineApiHandle, name: &str) -> Result<Self> {
        let name = CString::new(name)?;
        let engine = unsafe { (api.engine_open)(name.as_ptr()) };
        if engine.is_null() {
            return Err(Error::Other(format!(
                "Failed to open codec engine \"{}\".",
                name.to_string_lossy()
            )));
        }
        Ok(Self {
            context: Arc::new(EngineContext { api, engine }),
        })
    }

    /// Creates a codec instance on this engine.
    ///
    /// `params` are serialized to the JSON parameter string the vendor
    /// `ce_codec_create` consumes.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec name is unknown, the parameters are
    /// rejected, or the engine is out of codec resources.
    pub fn create_codec(&self, name: &str, params: &CodecParams) -> Result<Codec> {
        let name = CString::new(name)?;
        let params = CString::new(params.to_json()?)?;
        let codec =
            unsafe { (self.context.api.codec_create)(self.context.engine, name.as_ptr(), params.as_ptr()) };
        if codec.is_null() {
            return Err(Error::Other(format!(
                "Failed to create codec \"{}\".",
                name.to_string_lossy()
            )));
        }
        Ok(Codec {
            context: Arc::clone(&self.context),
            codec,
        })
    }

    /// Returns an allocator handing out physically contiguous, DMA-able
    /// regions from the engine's memory.
    pub fn contiguous_allocator(&self) -> ContiguousAllocator {
        ContiguousAllocator {
            context: Arc::clone(&self.context),
        }
    }

    /// Forces immediate engine close, consuming `self`.
    ///
    /// # Errors
    ///
    /// Returns an error if codecs or allocators created from this engine
    /// are still alive, or if the vendor close call fails.
    pub fn destroy(self) -> Result<()> {
        let mut context = Arc::into_inner(self.context)
            .ok_or_else(|| Error::Other("Engine is still in use.".to_string()))?;
        let mut engine = std::ptr::null_mut();
        std::mem::swap(&mut context.engine, &mut engine);
        Error::from_status(unsafe { (context.api.engine_close)(engine) })
    }
}

/// Parameters handed to the vendor codec at creation time.
///
/// Serialized to JSON; fields the codec does not understand are ignored by
/// the engine, absent fields fall back to the vendor defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecParams {
    /// Target bitrate in bits per second (encoders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    /// Audio sample rate in Hz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Audio channel count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Video frame width in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Video frame height in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Codec-specific quality level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl CodecParams {
    /// The JSON parameter string consumed by the vendor.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Byte counts and status of one successful process cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Input bytes the codec consumed.
    pub bytes_consumed: usize,
    /// Output bytes the codec produced.
    pub bytes_produced: usize,
    /// The codec reported a recoverable bitstream error but made progress.
    pub bit_error: bool,
}

/// One process step of an opaque codec: consume one input region, fill one
/// output region.
///
/// Implemented by the vendor [`Codec`]; tests plug in in-process fakes.
pub trait CodecProcessor: Send {
    /// Fixed number of input bytes the codec consumes per cycle. The
    /// session worker sizes its staging-ring windows from this.
    fn input_window_size(&self) -> usize;

    /// Runs one process cycle.
    ///
    /// `input` may be shorter than [`Self::input_window_size`] only at end
    /// of stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodecFailure`] for a fatal codec status, including
    /// a bitstream error with zero consumed bytes (no forward progress).
    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<ProcessOutcome>;
}

/// One codec instance created on an [`Engine`].
///
/// # Thread Safety
///
/// `Codec` is `Send` but not `Sync`: one thread drives a codec at a time,
/// but it can be transferred between threads (the session worker creates
/// and drives it on the worker thread).
pub struct Codec {
    context: Arc<EngineContext>,
    codec: dce_sys::Codec,
}

// Safety: codec handles are not thread-safe (no Sync) but can be sent
// between threads.
unsafe impl Send for Codec {}

impl Codec {
    /// Explicitly deletes this codec, releasing engine resources immediately.
    ///
    /// Normally the codec is deleted automatically when dropped.
    pub fn destroy(mut self) -> Result<()> {
        self.destroy_inner()
    }

    fn destroy_inner(&mut self) -> Result<()> {
        if self.codec.is_null() {
            return Err(Error::InvalidArg);
        }
        let mut codec = std::ptr::null_mut();
        std::mem::swap(&mut self.codec, &mut codec);
        Error::from_status(unsafe { (self.context.api.codec_delete)(codec) })
    }
}

impl CodecProcessor for Codec {
    fn input_window_size(&self) -> usize {
        unsafe { (self.context.api.codec_input_size)(self.codec) }
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<ProcessOutcome> {
        let mut info = dce_sys::ProcessInfo::default();
        let status = unsafe {
            (self.context.api.codec_process)(
                self.codec,
                input.as_ptr(),
                input.len(),
                output.as_mut_ptr(),
                output.len(),
                &mut info,
            )
        };
        Error::from_status(status)?;

        let bit_error = status == dce_sys::CE_STATUS_BIT_ERROR;
        if bit_error && info.bytes_consumed == 0 {
            // Bit error without forward progress; retrying would spin on
            // the same window forever.
            return Err(Error::CodecFailure { status });
        }
        if info.bytes_produced > output.len() {
            return Err(Error::Other(format!(
                "Codec reported {} produced byte(s) into a {}-byte buffer.",
                info.bytes_produced,
                output.len()
            )));
        }
        Ok(ProcessOutcome {
            bytes_consumed: info.bytes_consumed,
            bytes_produced: info.bytes_produced,
            bit_error,
        })
    }
}

impl Drop for Codec {
    /// Automatically deletes the codec when dropped.
    fn drop(&mut self) {
        if !self.codec.is_null()
            && let Err(err) = self.destroy_inner()
        {
            tracing::error!("Failed to delete codec: {:?}", err);
        }
    }
}

/// Physically contiguous region allocated from the engine.
struct ContiguousRegion {
    context: Arc<EngineContext>,
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: the region is a plain memory range; the engine allocator is
// thread-safe at the engine level.
unsafe impl Send for ContiguousRegion {}

impl Region for ContiguousRegion {
    fn as_slice(&self) -> &[u8] {
        // Safety: `ptr` is a live allocation of `len` bytes owned by this
        // region.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as above, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for ContiguousRegion {
    fn drop(&mut self) {
        unsafe { (self.context.api.mem_free)(self.ptr.as_ptr(), self.len) };
    }
}

/// DMA page alignment for contiguous allocations.
const CONTIGUOUS_ALIGN: usize = 4096;

/// [`BufferAllocator`] backed by the engine's contiguous memory.
///
/// Pools created with this allocator hand the codec DMA-addressable
/// regions, so process cycles run without bounce copies.
///
/// # Examples
///
/// ```no_run
/// use dce::BufferPool;
///
/// # fn main() -> Result<(), dce::Error> {
/// # let api = dce::load_api("libdspce.so")?;
/// let engine = dce::Engine::open(api, "encode")?;
/// let allocator = engine.contiguous_allocator();
/// let pool = BufferPool::create_with_allocator(4, 512 * 1024, &allocator)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ContiguousAllocator {
    context: Arc<EngineContext>,
}

impl BufferAllocator for ContiguousAllocator {
    fn allocate(&self, len: usize) -> Result<Box<dyn Region>> {
        if len == 0 {
            return Err(Error::AllocationFailed("zero-length buffer".into()));
        }
        let ptr = unsafe { (self.context.api.mem_alloc)(len, CONTIGUOUS_ALIGN) };
        let Some(ptr) = NonNull::new(ptr) else {
            return Err(Error::AllocationFailed(format!(
                "contiguous allocation of {len} byte(s) failed"
            )));
        };
        Ok(Box::new(ContiguousRegion {
            context: Arc::clone(&self.context),
            ptr,
            len,
        }))
    }
}
