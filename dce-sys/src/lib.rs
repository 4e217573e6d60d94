// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! # dce-sys: Raw bindings to the vendor DSP codec-engine library
//!
//! This crate provides low-level, unsafe access to the closed vendor codec
//! engine. The engine ships as a shared library only (no public headers to
//! run a binding generator against), so the symbol table is declared by hand
//! from the vendor ABI reference and resolved at runtime with `libloading`.
//!
//! ## Overview
//!
//! `dce-sys` exposes:
//! - Opaque handle types (`Engine`, `Codec`)
//! - The `Status` code type and its well-known values
//! - The `ProcessInfo` out-parameter struct of `ce_codec_process`
//! - [`Api`], a function-pointer table bound to one loaded library
//!
//! **Most users should NOT use this crate directly.** Use the safe `dce`
//! wrapper crate instead, which provides RAII resource management,
//! `Result`-based error handling and the pipeline synchronization core.
//!
//! ## Safety
//!
//! Every function pointer in [`Api`] is `unsafe` to call and requires the
//! caller to uphold the engine's invariants:
//! - An engine must be opened before any codec is created on it
//! - Codec handles are NOT thread-safe; one thread drives a codec at a time
//! - Input/output regions passed to `ce_codec_process` must stay valid and
//!   disjoint for the duration of the call
//! - Null checks are the caller's responsibility

#![allow(clippy::missing_safety_doc)]

use std::os::raw::{c_char, c_void};

/// Opaque handle to an open codec engine.
pub type Engine = *mut c_void;

/// Opaque handle to one codec instance created on an engine.
pub type Codec = *mut c_void;

/// Status code returned by every fallible engine entry point.
///
/// Zero and positive values are non-fatal; negative values are fatal.
pub type Status = i32;

/// Operation completed.
pub const CE_STATUS_OK: Status = 0;
/// The codec detected a bitstream error. Only fatal when the engine also
/// reports zero consumed bytes (no forward progress possible).
pub const CE_STATUS_BIT_ERROR: Status = 1;
/// Generic fatal failure.
pub const CE_EFAIL: Status = -1;
/// A runtime allocation inside the engine failed.
pub const CE_ENOMEM: Status = -2;
/// An argument was rejected by the engine.
pub const CE_EINVAL: Status = -3;
/// The named engine or codec does not exist in the vendor configuration.
pub const CE_ENOTFOUND: Status = -4;

/// Byte counts reported back by `ce_codec_process`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInfo {
    /// Input bytes the codec consumed this cycle.
    pub bytes_consumed: usize,
    /// Output bytes the codec produced this cycle.
    pub bytes_produced: usize,
}

/// Function-pointer table resolved from one loaded vendor library.
///
/// The table copies raw function pointers out of the [`libloading::Symbol`]s
/// and keeps the [`libloading::Library`] alive for as long as the table
/// exists, so the pointers stay valid.
pub struct Api {
    _lib: libloading::Library,

    /// `ce_engine_open(name) -> Engine` (null on failure).
    pub engine_open: unsafe extern "C" fn(name: *const c_char) -> Engine,
    /// `ce_engine_close(engine) -> Status`.
    pub engine_close: unsafe extern "C" fn(engine: Engine) -> Status,
    /// `ce_codec_create(engine, name, params_json) -> Codec` (null on failure).
    pub codec_create:
        unsafe extern "C" fn(engine: Engine, name: *const c_char, params: *const c_char) -> Codec,
    /// `ce_codec_delete(codec) -> Status`.
    pub codec_delete: unsafe extern "C" fn(codec: Codec) -> Status,
    /// One process cycle: consume from `input`, produce into `output`.
    ///
    /// Byte counts come back through `info`. A negative return is fatal; see
    /// [`CE_STATUS_BIT_ERROR`] for the zero-progress rule.
    pub codec_process: unsafe extern "C" fn(
        codec: Codec,
        input: *const u8,
        input_len: usize,
        output: *mut u8,
        output_len: usize,
        info: *mut ProcessInfo,
    ) -> Status,
    /// Fixed input window size the codec consumes per process cycle.
    pub codec_input_size: unsafe extern "C" fn(codec: Codec) -> usize,
    /// Allocate a physically contiguous, DMA-addressable region.
    pub mem_alloc: unsafe extern "C" fn(len: usize, align: usize) -> *mut u8,
    /// Release a region obtained from `mem_alloc`.
    pub mem_free: unsafe extern "C" fn(ptr: *mut u8, len: usize),
}

impl Api {
    /// Loads the vendor library and resolves the full symbol table.
    ///
    /// # Safety
    ///
    /// Loading a shared library runs its initialization code; the caller must
    /// trust the library at `path` to actually be the vendor codec engine.
    pub unsafe fn load<P: AsRef<std::ffi::OsStr>>(path: P) -> Result<Self, libloading::Error> {
        unsafe {
            let lib = libloading::Library::new(path)?;

            // Function pointers are Copy; deref the symbols so the table does
            // not borrow `lib`, then move `lib` in alongside them.
            let engine_open = *lib.get(b"ce_engine_open\0")?;
            let engine_close = *lib.get(b"ce_engine_close\0")?;
            let codec_create = *lib.get(b"ce_codec_create\0")?;
            let codec_delete = *lib.get(b"ce_codec_delete\0")?;
            let codec_process = *lib.get(b"ce_codec_process\0")?;
            let codec_input_size = *lib.get(b"ce_codec_input_size\0")?;
            let mem_alloc = *lib.get(b"ce_mem_alloc\0")?;
            let mem_free = *lib.get(b"ce_mem_free\0")?;

            Ok(Self {
                _lib: lib,
                engine_open,
                engine_close,
                codec_create,
                codec_delete,
                codec_process,
                codec_input_size,
                mem_alloc,
                mem_free,
            })
        }
    }
}
