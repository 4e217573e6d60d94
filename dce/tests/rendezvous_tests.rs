// SPDX-FileCopyrightText: 2026 Contributors to the DCE project.
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous barrier tests, including the forced-release shutdown path
//! and the regression for the lost-wakeup class of bug: a `force` with
//! N−1 parties already waiting must release them all *and* let the Nth
//! party arrive later without blocking forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dce::Rendezvous;

/// Two parties meet and both proceed.
#[test]
fn two_party_meet() {
    let rendezvous = Arc::new(Rendezvous::new(2));
    let other = Arc::clone(&rendezvous);
    let handle = std::thread::spawn(move || other.meet());
    rendezvous.meet();
    handle.join().unwrap();
}

/// The same rendezvous is reusable across many rounds without
/// reconstruction.
#[test]
fn generations_are_reusable() {
    let rendezvous = Arc::new(Rendezvous::new(2));
    let rounds = Arc::new(AtomicU32::new(0));

    let handle = std::thread::spawn({
        let rendezvous = Arc::clone(&rendezvous);
        let rounds = Arc::clone(&rounds);
        move || {
            for _ in 0..5 {
                rendezvous.meet();
                rounds.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    for _ in 0..5 {
        rendezvous.meet();
    }
    handle.join().unwrap();
    assert_eq!(rounds.load(Ordering::SeqCst), 5);
}

/// `force` with N−1 parties waiting releases all of them, and the Nth
/// party arriving afterwards passes straight through the latched-open
/// barrier.
#[test]
fn force_releases_waiters_and_late_arrival() {
    let rendezvous = Arc::new(Rendezvous::new(3));

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let rendezvous = Arc::clone(&rendezvous);
            std::thread::spawn(move || rendezvous.meet())
        })
        .collect();

    // Let both waiters suspend, then force the barrier.
    std::thread::sleep(Duration::from_millis(50));
    rendezvous.force();
    for waiter in waiters {
        waiter.join().unwrap();
    }

    // The third party arrives late; the forced barrier must not hold it.
    let late = std::thread::spawn({
        let rendezvous = Arc::clone(&rendezvous);
        move || rendezvous.meet()
    });
    std::thread::sleep(Duration::from_millis(100));
    assert!(late.is_finished(), "late arrival blocked on a forced barrier");
    late.join().unwrap();
}

/// `reset` re-arms a forced barrier: meets block again until the full
/// party count arrives.
#[test]
fn reset_rearms_after_force() {
    let rendezvous = Arc::new(Rendezvous::new(2));
    rendezvous.force();
    rendezvous.meet(); // latched open, passes through
    rendezvous.reset();

    let waiter = std::thread::spawn({
        let rendezvous = Arc::clone(&rendezvous);
        move || rendezvous.meet()
    });

    std::thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished(), "reset barrier must block again");

    rendezvous.meet();
    waiter.join().unwrap();
    assert_eq!(rendezvous.parties(), 2);
}
