// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Session configuration knobs.
//!
//! Simple integer/boolean knobs with validated ranges, exposed to the
//! element layer as properties. Serde derives let elements load them from
//! JSON the same way codec parameters travel to the engine.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default number of output buffers in the pool.
pub const DEFAULT_OUTPUT_BUFFER_COUNT: usize = 3;
/// Default size of each output buffer in bytes.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 256 * 1024;
/// Default staging-ring capacity, in input windows.
pub const DEFAULT_INPUT_WINDOW_COUNT: usize = 4;
/// Default queue depth for [`crate::QueuedSession`].
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Tuning knobs for one codec session.
///
/// # Examples
///
/// ```
/// use dce::SessionConfig;
///
/// let config = SessionConfig {
///     output_buffer_count: 4,
///     ..SessionConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of output buffers in the pool, `2..=64`.
    pub output_buffer_count: usize,

    /// Size of each output buffer in bytes; must cover the codec's worst
    /// case output for one window.
    pub output_buffer_size: usize,

    /// Staging-ring capacity in input windows, `2..=256`.
    pub input_window_count: usize,

    /// Producer backpressure threshold in bytes: `enqueue` suspends while
    /// more than this is staged. Zero disables backpressure (enqueue only
    /// fails on a genuine overrun). Clamped to the ring capacity.
    pub backpressure_bytes: usize,

    /// Bounded depth of the decoupling queue, `1..=1024`. Only used by
    /// [`crate::QueuedSession`].
    pub queue_depth: usize,

    /// Tab a display claim onto every output buffer so a display sink can
    /// render from it zero-copy.
    pub display_claim: bool,

    /// Log every buffer movement at trace level.
    pub trace_buffers: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_buffer_count: DEFAULT_OUTPUT_BUFFER_COUNT,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            input_window_count: DEFAULT_INPUT_WINDOW_COUNT,
            backpressure_bytes: 0,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            display_claim: false,
            trace_buffers: false,
        }
    }
}

impl SessionConfig {
    /// Checks every knob against its validated range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending knob.
    pub fn validate(&self) -> Result<()> {
        if !(2..=64).contains(&self.output_buffer_count) {
            return Err(Error::InvalidConfig(format!(
                "output_buffer_count {} outside 2..=64",
                self.output_buffer_count
            )));
        }
        if self.output_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "output_buffer_size must be non-zero".into(),
            ));
        }
        if !(2..=256).contains(&self.input_window_count) {
            return Err(Error::InvalidConfig(format!(
                "input_window_count {} outside 2..=256",
                self.input_window_count
            )));
        }
        if !(1..=1024).contains(&self.queue_depth) {
            return Err(Error::InvalidConfig(format!(
                "queue_depth {} outside 1..=1024",
                self.queue_depth
            )));
        }
        Ok(())
    }
}
