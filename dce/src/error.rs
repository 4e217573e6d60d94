// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for codec-engine and pipeline-core operations.
//!
//! This module defines the error type shared across the crate, mapping
//! vendor status codes to idiomatic Rust error variants and adding the
//! pipeline-core failures (pool exhaustion, ring overrun, abort).

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when driving the codec engine or the buffer core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The hardware allocator could not satisfy a pool creation request.
    ///
    /// Surfaced at session-start time; fatal for the element.
    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),

    /// A non-blocking acquire found no free buffer.
    ///
    /// Recoverable: the caller retries on its own schedule or switches the
    /// pool back to blocking acquires.
    #[error("Buffer pool exhausted")]
    Exhausted,

    /// A staging-ring push did not fit in the remaining capacity.
    ///
    /// Treated as a fatal stream error rather than silently dropping data.
    #[error("Staging ring overrun: {pending} byte(s) pending, chunk of {chunk} does not fit in capacity {capacity}")]
    Overrun {
        /// Bytes already staged.
        pending: usize,
        /// Size of the rejected chunk.
        chunk: usize,
        /// Total ring capacity.
        capacity: usize,
    },

    /// The consumer side of the staging ring aborted; the producer must not
    /// stage any more data.
    #[error("Consumer aborted")]
    ConsumerAborted,

    /// The session worker reached its `Aborted` state; every subsequent
    /// call on the session fails fast with this error.
    #[error("Session aborted")]
    Aborted,

    /// The codec returned a fatal status, or reported a bitstream error
    /// while making no forward progress.
    #[error("Codec failure (status {status})")]
    CodecFailure {
        /// Raw vendor status code.
        status: dce_sys::Status,
    },

    /// An unknown or unrecognized vendor status code.
    #[error("Unknown engine error: {0}")]
    Unknown(dce_sys::Status),

    /// The named engine or codec does not exist in the vendor configuration.
    #[error("Engine or codec not found")]
    NotFound,

    /// An argument was rejected by the engine.
    #[error("Invalid argument")]
    InvalidArg,

    /// A runtime allocation inside the engine failed.
    #[error("Engine out of memory")]
    EngineNoMem,

    /// A configuration knob was outside its validated range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A generic error for Rust-level failures not directly mapped to a
    /// vendor status code.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to serialize codec parameters for the engine.
    #[error("Codec parameters: {0}")]
    Params(#[from] serde_json::Error),

    /// Failed to convert a Rust string to a C-compatible null-terminated string.
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load or interact with the vendor dynamic library.
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl Error {
    /// Converts a vendor status code to a Rust [`Result`].
    ///
    /// Non-negative status values are success at this layer; the
    /// zero-progress bit-error rule is applied by the caller, which is the
    /// only place the consumed byte count is known.
    pub fn from_status(status: dce_sys::Status) -> Result<()> {
        if status >= dce_sys::CE_STATUS_OK {
            return Ok(());
        }
        match status {
            dce_sys::CE_EFAIL => Err(Error::CodecFailure { status }),
            dce_sys::CE_ENOMEM => Err(Error::EngineNoMem),
            dce_sys::CE_EINVAL => Err(Error::InvalidArg),
            dce_sys::CE_ENOTFOUND => Err(Error::NotFound),
            other => Err(Error::Unknown(other)),
        }
    }
}
