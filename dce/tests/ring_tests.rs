// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Staging ring tests.
//!
//! The property under test throughout: the concatenation of all windows,
//! in consumption order, equals the pushed byte sequence up to drain or
//! abort, with no bytes duplicated, reordered or skipped, including windows
//! spanning chunk boundaries and the wrap point of the ring.

use std::time::Duration;

use dce::{Error, StagingRing};

/// Deterministic test pattern.
fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Capacity 1024, window 256, two 300-byte chunks: the first window
/// leaves 44 bytes of chunk 1 pending; the second window spans the chunk
/// boundary correctly.
#[test]
fn window_spans_chunk_boundary() {
    let ring = StagingRing::new(1024, 256).unwrap();
    let chunk1 = pattern(300, 1);
    let chunk2 = pattern(300, 7);
    ring.push(&chunk1, Some(1_000)).unwrap();
    ring.push(&chunk2, Some(2_000)).unwrap();
    assert_eq!(ring.pending(), 600);

    let window = ring.get_window();
    assert_eq!(window.len(), 256);
    assert_eq!(&window[..], &chunk1[..256]);
    assert_eq!(window.timestamp(), Some(1_000));
    ring.data_consumed(window, 256);
    assert_eq!(ring.pending(), 344);

    // 44 bytes from chunk 1, then 212 from chunk 2.
    let window = ring.get_window();
    assert_eq!(window.len(), 256);
    assert_eq!(&window[..44], &chunk1[256..]);
    assert_eq!(&window[44..], &chunk2[..212]);
    ring.data_consumed(window, 256);
    assert_eq!(ring.pending(), 88);
}

/// An unconsumed suffix stays at the front of the ring and is served
/// again by the next window.
#[test]
fn partial_consumption_keeps_suffix() {
    let ring = StagingRing::new(64, 16).unwrap();
    let data = pattern(32, 3);
    ring.push(&data, None).unwrap();

    let window = ring.get_window();
    assert_eq!(&window[..], &data[..16]);
    ring.data_consumed(window, 10);

    let window = ring.get_window();
    assert_eq!(&window[..], &data[10..26]);
    ring.data_consumed(window, 16);
    assert_eq!(ring.pending(), 6);
}

/// Dropping a window without acknowledging it re-serves the same bytes.
#[test]
fn unacknowledged_window_is_reserved() {
    let ring = StagingRing::new(64, 16).unwrap();
    let data = pattern(16, 9);
    ring.push(&data, Some(42)).unwrap();

    let window = ring.get_window();
    assert_eq!(&window[..], &data[..]);
    drop(window);

    let window = ring.get_window();
    assert_eq!(&window[..], &data[..]);
    ring.data_consumed(window, 16);
}

/// Draining serves the residual short window, then the zero-length
/// end-of-data sentinel.
#[test]
fn drain_serves_residual_then_sentinel() {
    let ring = StagingRing::new(64, 16).unwrap();
    let data = pattern(20, 5);
    ring.push(&data, None).unwrap();
    ring.drain(false);

    let window = ring.get_window();
    assert_eq!(window.len(), 16);
    ring.data_consumed(window, 16);

    let window = ring.get_window();
    assert_eq!(window.len(), 4, "drain delivers the residual bytes");
    assert_eq!(&window[..], &data[16..]);
    ring.data_consumed(window, 4);

    let window = ring.get_window();
    assert!(window.is_end_of_data());
    ring.data_consumed(window, 0);

    // The sentinel repeats for as long as the consumer keeps asking.
    assert!(ring.get_window().is_end_of_data());
}

/// A chunk exceeding the free space is an overrun, and the ring is left
/// untouched by the failed push.
#[test]
fn oversized_push_overruns() {
    let ring = StagingRing::new(32, 16).unwrap();
    ring.push(&pattern(20, 1), None).unwrap();
    let err = ring.push(&pattern(20, 2), None).unwrap_err();
    assert!(matches!(
        err,
        Error::Overrun {
            pending: 20,
            chunk: 20,
            capacity: 32
        }
    ));
    assert_eq!(ring.pending(), 20);
}

/// Pushing after drain is rejected.
#[test]
fn push_after_drain_is_rejected() {
    let ring = StagingRing::new(32, 16).unwrap();
    ring.drain(false);
    assert!(ring.push(&[1, 2, 3], None).is_err());
}

/// A window size larger than the capacity is rejected at creation.
#[test]
fn invalid_geometry_is_rejected() {
    assert!(matches!(
        StagingRing::new(64, 128),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(StagingRing::new(0, 0), Err(Error::InvalidConfig(_))));
}

/// Byte-order conservation across many wraps: a threaded producer and
/// consumer move ten times the ring capacity through it and the output
/// equals the input.
#[test]
fn byte_order_is_conserved_across_wraps() {
    let ring = std::sync::Arc::new(StagingRing::new(64, 16).unwrap());
    let input = pattern(640, 11);

    let producer = std::thread::spawn({
        let ring = std::sync::Arc::clone(&ring);
        let input = input.clone();
        move || {
            // Chunk sizes deliberately misaligned with the window size.
            for chunk in input.chunks(10) {
                ring.wait_for_space(ring.capacity() - chunk.len()).unwrap();
                ring.push(chunk, None).unwrap();
            }
            ring.drain(false);
        }
    });

    let mut output = Vec::new();
    loop {
        let window = ring.get_window();
        if window.is_end_of_data() {
            break;
        }
        output.extend_from_slice(&window);
        let len = window.len();
        ring.data_consumed(window, len);
    }

    producer.join().unwrap();
    assert_eq!(output, input);
}

/// The consumer blocks on a partial window until drain tells it no more
/// data is coming.
#[test]
fn short_window_only_at_end_of_stream() {
    let ring = std::sync::Arc::new(StagingRing::new(1024, 256).unwrap());
    ring.push(&pattern(100, 2), None).unwrap();

    let consumer = std::thread::spawn({
        let ring = std::sync::Arc::clone(&ring);
        move || {
            let window = ring.get_window();
            let len = window.len();
            ring.data_consumed(window, len);
            len
        }
    });

    // Not draining: 100 pending bytes must not surface as a short window.
    std::thread::sleep(Duration::from_millis(100));
    assert!(!consumer.is_finished());

    ring.drain(false);
    assert_eq!(consumer.join().unwrap(), 100);
}

/// `consumer_aborted` permanently wakes a producer blocked on
/// backpressure.
#[test]
fn abort_wakes_blocked_producer() {
    let ring = std::sync::Arc::new(StagingRing::new(32, 16).unwrap());
    ring.push(&pattern(32, 4), None).unwrap();

    let producer = std::thread::spawn({
        let ring = std::sync::Arc::clone(&ring);
        move || ring.wait_for_space(0)
    });

    std::thread::sleep(Duration::from_millis(50));
    ring.consumer_aborted();

    assert!(matches!(
        producer.join().unwrap(),
        Err(Error::ConsumerAborted)
    ));
    // And pushes fail from now on.
    assert!(matches!(
        ring.push(&[0], None),
        Err(Error::ConsumerAborted)
    ));
}

/// The pending timestamp is latched by the first chunk and re-latched
/// after each window takes it.
#[test]
fn timestamp_latching() {
    let ring = StagingRing::new(64, 16).unwrap();
    ring.push(&pattern(16, 1), Some(100)).unwrap();
    ring.push(&pattern(16, 2), Some(200)).unwrap();

    let window = ring.get_window();
    assert_eq!(window.timestamp(), Some(100));
    ring.data_consumed(window, 16);

    // 100 was taken; nothing latched until the next push.
    let window = ring.get_window();
    assert_eq!(window.timestamp(), None);
    ring.data_consumed(window, 16);

    ring.push(&pattern(16, 3), Some(300)).unwrap();
    let window = ring.get_window();
    assert_eq!(window.timestamp(), Some(300));
    ring.data_consumed(window, 16);
}
