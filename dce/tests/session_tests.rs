// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end session tests with in-process codecs.
//!
//! These exercise the whole core: the chain thread staging data into the
//! ring, the worker pulling windows, acquiring pool buffers, invoking the
//! (fake) codec, handing frames downstream and draining or aborting. The
//! codecs here implement [`CodecProcessor`] directly, so no vendor library
//! is needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dce::{
    CodecProcessor, Error, ProcessOutcome, QueuedSession, Session, SessionConfig, WorkerState,
};
use tracing::info;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn init_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
}

/// Inverts every input byte; consumes and produces one full window per
/// cycle (short windows at EOS included).
struct InvertingCodec {
    window: usize,
}

impl CodecProcessor for InvertingCodec {
    fn input_window_size(&self) -> usize {
        self.window
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> dce::Result<ProcessOutcome> {
        for (out, byte) in output.iter_mut().zip(input) {
            *out = !byte;
        }
        Ok(ProcessOutcome {
            bytes_consumed: input.len(),
            bytes_produced: input.len(),
            bit_error: false,
        })
    }
}

/// Fails with a fatal status after `good_cycles` successful cycles.
struct FailingCodec {
    window: usize,
    good_cycles: usize,
}

impl CodecProcessor for FailingCodec {
    fn input_window_size(&self) -> usize {
        self.window
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> dce::Result<ProcessOutcome> {
        if self.good_cycles == 0 {
            return Err(Error::CodecFailure { status: -1 });
        }
        self.good_cycles -= 1;
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        Ok(ProcessOutcome {
            bytes_consumed: len,
            bytes_produced: len,
            bit_error: false,
        })
    }
}

/// Slow passthrough, for exercising forced shutdown mid-stream.
struct SlowCodec {
    window: usize,
}

impl CodecProcessor for SlowCodec {
    fn input_window_size(&self) -> usize {
        self.window
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> dce::Result<ProcessOutcome> {
        std::thread::sleep(Duration::from_millis(20));
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        Ok(ProcessOutcome {
            bytes_consumed: len,
            bytes_produced: len,
            bit_error: false,
        })
    }
}

fn collecting_sink(collected: Arc<Mutex<Vec<u8>>>) -> dce::FrameSink {
    Box::new(move |frame| {
        collected
            .lock()
            .expect("sink mutex poisoned")
            .extend_from_slice(frame.data());
        Ok(())
    })
}

fn small_config() -> SessionConfig {
    SessionConfig {
        output_buffer_count: 3,
        output_buffer_size: 256,
        input_window_count: 4,
        backpressure_bytes: 128,
        ..SessionConfig::default()
    }
}

/// Full pipeline conservation: everything staged comes out the far end,
/// transformed, in order, and the session lands in `Stopped` with every
/// buffer reclaimed.
#[test]
fn pipeline_conserves_bytes_to_eos() {
    init_logging();
    let collected = Arc::new(Mutex::new(Vec::new()));
    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
        collecting_sink(Arc::clone(&collected)),
    )
    .unwrap();

    let input: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
    // Chunk sizes deliberately misaligned with the 64-byte window.
    for (i, chunk) in input.chunks(50).enumerate() {
        session.enqueue(chunk, Some(i as u64 * 1_000)).unwrap();
    }
    session.finish().unwrap();

    assert_eq!(session.state(), WorkerState::Stopped);
    assert_eq!(session.pool().in_use(), 0);

    let expected: Vec<u8> = input.iter().map(|byte| !byte).collect();
    let collected = collected.lock().unwrap();
    assert_eq!(*collected, expected);
    info!("pipeline moved {} byte(s)", collected.len());
}

/// EOS with nothing staged: the worker stops cleanly on the bare
/// sentinel.
#[test]
fn immediate_eos_stops_cleanly() {
    init_logging();
    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
        Box::new(|_| Ok(())),
    )
    .unwrap();

    session.finish().unwrap();
    assert_eq!(session.state(), WorkerState::Stopped);
}

/// Frame timestamps carry the timestamp latched with the window's first
/// bytes.
#[test]
fn frames_carry_timestamps() {
    init_logging();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
        Box::new({
            let stamps = Arc::clone(&stamps);
            move |frame| {
                stamps.lock().unwrap().push(frame.timestamp);
                Ok(())
            }
        }),
    )
    .unwrap();

    session.enqueue(&[0u8; 64], Some(12_345)).unwrap();
    session.finish().unwrap();

    assert_eq!(*stamps.lock().unwrap(), vec![Some(12_345)]);
}

/// A codec failure aborts the worker: the shared status flips, a
/// subsequent enqueue fails immediately instead of blocking, and no
/// thread is left suspended anywhere.
#[test]
fn codec_failure_aborts_and_fails_enqueue_fast() {
    init_logging();
    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(FailingCodec { window: 64, good_cycles: 1 }) as Box<_>)),
        Box::new(|_| Ok(())),
    )
    .unwrap();

    // First window processes, second hits the failure.
    let mut aborted = false;
    for _ in 0..200 {
        match session.enqueue(&[7u8; 64], None) {
            Ok(()) => std::thread::sleep(Duration::from_millis(5)),
            Err(err) => {
                assert!(matches!(err, Error::Aborted));
                aborted = true;
                break;
            }
        }
    }
    assert!(aborted, "enqueue never observed the abort");
    assert_eq!(session.state(), WorkerState::Aborted);

    // Fails fast from now on, and teardown surfaces the codec error.
    assert!(matches!(session.enqueue(&[0], None), Err(Error::Aborted)));
    let err = session.finish().unwrap_err();
    assert!(matches!(err, Error::CodecFailure { status: -1 }));
}

/// A codec that accepts a window but moves nothing is an abort, not an
/// infinite respin of the same bytes.
#[test]
fn zero_progress_aborts() {
    init_logging();
    struct StuckCodec;
    impl CodecProcessor for StuckCodec {
        fn input_window_size(&self) -> usize {
            32
        }

        fn process(&mut self, _input: &[u8], _output: &mut [u8]) -> dce::Result<ProcessOutcome> {
            Ok(ProcessOutcome::default())
        }
    }

    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(StuckCodec) as Box<_>)),
        Box::new(|_| Ok(())),
    )
    .unwrap();

    session.enqueue(&[1u8; 32], None).unwrap();
    assert!(session.finish().is_err());
    assert_eq!(session.state(), WorkerState::Aborted);
}

/// A failed codec open aborts before any data moves; the first enqueue
/// reports it instead of wedging on the startup handshake.
#[test]
fn failed_open_aborts_startup() {
    init_logging();
    let session = Session::spawn(
        small_config(),
        Box::new(|| Err(Error::Other("engine open failed".into()))),
        Box::new(|_| Ok(())),
    )
    .unwrap();

    assert!(matches!(session.enqueue(&[0], None), Err(Error::Aborted)));
    assert!(session.finish().is_err());
}

/// Forced shutdown mid-stream returns promptly, discards staged input and
/// leaves nothing blocked.
#[test]
fn forced_shutdown_is_prompt() {
    init_logging();
    let session = Session::spawn(
        SessionConfig {
            backpressure_bytes: 0,
            ..small_config()
        },
        Box::new(|| Ok(Box::new(SlowCodec { window: 32 }) as Box<_>)),
        Box::new(|_| Ok(())),
    )
    .unwrap();

    // Stage a few windows' worth, then pull the plug while the worker is
    // still grinding through them.
    session.enqueue(&[5u8; 96], Some(0)).unwrap();
    let start = std::time::Instant::now();
    session.request_shutdown();
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "forced shutdown took too long"
    );

    assert!(session.state().is_terminal());
    assert!(session.enqueue(&[0], None).is_err());
    assert_eq!(session.pool().in_use(), 0);
}

/// The sink sees a display handle exactly when the session is configured
/// for display claims, and the buffer stays out until both claims drop.
#[test]
fn display_claim_rides_along() {
    init_logging();
    let saw_display = Arc::new(AtomicUsize::new(0));
    let session = Session::spawn(
        SessionConfig {
            display_claim: true,
            ..small_config()
        },
        Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
        Box::new({
            let saw_display = Arc::clone(&saw_display);
            move |frame| {
                if frame.display.is_some() {
                    saw_display.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        }),
    )
    .unwrap();

    session.enqueue(&[0u8; 128], None).unwrap();
    session.finish().unwrap();
    assert_eq!(saw_display.load(Ordering::SeqCst), 2);
}

/// The queued variant decouples the chain thread and still conserves the
/// stream.
#[test]
fn queued_session_conserves_bytes() {
    init_logging();
    let collected = Arc::new(Mutex::new(Vec::new()));
    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
        collecting_sink(Arc::clone(&collected)),
    )
    .unwrap();
    let queued = QueuedSession::new(session).unwrap();

    let input: Vec<u8> = (0..256u32).map(|i| (i * 3) as u8).collect();
    for chunk in input.chunks(32) {
        queued.enqueue(chunk, None).unwrap();
    }
    queued.finish().unwrap();

    assert_eq!(queued.state(), WorkerState::Stopped);
    let expected: Vec<u8> = input.iter().map(|byte| !byte).collect();
    assert_eq!(*collected.lock().unwrap(), expected);
}

/// Out-of-range knobs are rejected before any thread is spawned.
#[test]
fn config_validation_rejects_bad_knobs() {
    let bad_counts = SessionConfig {
        output_buffer_count: 1,
        ..SessionConfig::default()
    };
    assert!(matches!(
        bad_counts.validate(),
        Err(Error::InvalidConfig(_))
    ));

    let bad_windows = SessionConfig {
        input_window_count: 0,
        ..SessionConfig::default()
    };
    assert!(bad_windows.validate().is_err());

    let bad_size = SessionConfig {
        output_buffer_size: 0,
        ..SessionConfig::default()
    };
    assert!(
        Session::spawn(
            bad_size,
            Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
            Box::new(|_| Ok(())),
        )
        .is_err()
    );

    assert!(SessionConfig::default().validate().is_ok());
}

/// A sink refusing a frame is a pipeline failure: the worker aborts and
/// the producer side finds out.
#[test]
fn sink_failure_aborts() {
    init_logging();
    let session = Session::spawn(
        small_config(),
        Box::new(|| Ok(Box::new(InvertingCodec { window: 64 }) as Box<_>)),
        Box::new(|_| Err(Error::Other("downstream refused".into()))),
    )
    .unwrap();

    session.enqueue(&[0u8; 64], None).unwrap();
    assert!(session.finish().is_err());
    assert_eq!(session.state(), WorkerState::Aborted);
}
