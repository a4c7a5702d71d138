//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, effects and batches work
//! together correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::error::ReactiveError;
use trellis_core::reactive::{Cleanup, Runtime};
use trellis_core::RuntimeConfig;

/// Test that writing an equal value changes nothing and notifies nobody.
#[test]
fn equal_write_does_not_notify() {
    let runtime = Runtime::new();
    let signal = runtime.signal(7);
    let runs = Arc::new(AtomicI32::new(0));

    let runs_clone = runs.clone();
    let signal_clone = signal.clone();
    let _effect = runtime.effect(move || {
        signal_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    signal.set(7);
    assert_eq!(signal.version(), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    signal.set(8);
    assert_eq!(signal.version(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that an effect follows only the branch it last read.
#[test]
fn dynamic_dependencies_follow_the_last_run() {
    let runtime = Runtime::new();
    let cond = runtime.signal(true);
    let a = runtime.signal(1);
    let b = runtime.signal(100);
    let runs = Arc::new(AtomicI32::new(0));
    let seen = Arc::new(AtomicI32::new(0));

    let (cond_clone, a_clone, b_clone) = (cond.clone(), a.clone(), b.clone());
    let (runs_clone, seen_clone) = (runs.clone(), seen.clone());
    let effect = runtime.effect(move || {
        let value = if cond_clone.get() { a_clone.get() } else { b_clone.get() };
        seen_clone.store(value, Ordering::SeqCst);
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(effect.dependency_count(), 2);

    // b is not read yet
    b.set(200);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    cond.set(false);
    assert_eq!(seen.load(Ordering::SeqCst), 200);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // a is no longer read
    a.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    b.set(300);
    assert_eq!(seen.load(Ordering::SeqCst), 300);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Test that several writes inside a batch notify once with the final value.
#[test]
fn batch_coalesces_writes() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    let signal_clone = signal.clone();
    let effect = runtime.effect(move || {
        seen_clone.lock().push(signal_clone.get());
    });

    runtime.batch(|| {
        signal.set(1);
        signal.set(2);
        signal.set(3);
        // Nothing is flushed yet
        assert_eq!(*seen.lock(), vec![0]);
    });

    assert_eq!(*seen.lock(), vec![0, 3]);
    assert_eq!(effect.run_count(), 2);
}

/// Test that nested batches flush once, when the outermost exits.
#[test]
fn nested_batches_flush_once() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    let signal_clone = signal.clone();
    let _effect = runtime.effect(move || {
        seen_clone.lock().push(signal_clone.get());
    });

    let result = runtime.batch(|| {
        signal.set(1);
        runtime.batch(|| {
            signal.set(2);
            signal.set(3);
        });
        assert!(runtime.is_batching());
        assert_eq!(*seen.lock(), vec![0]);
        signal.set(4);
        "done"
    });

    assert_eq!(result, "done");
    assert!(!runtime.is_batching());
    assert_eq!(*seen.lock(), vec![0, 4]);
}

/// Test that an effect reading two signals written in one batch runs once.
#[test]
fn batch_flushes_all_signals_in_one_pass() {
    let runtime = Runtime::new();
    let first = runtime.signal(1);
    let last = runtime.signal(1);
    let sums = Arc::new(Mutex::new(Vec::new()));

    let (first_clone, last_clone) = (first.clone(), last.clone());
    let sums_clone = sums.clone();
    let _effect = runtime.effect(move || {
        sums_clone.lock().push(first_clone.get() + last_clone.get());
    });

    runtime.batch(|| {
        first.set(10);
        last.set(20);
    });

    assert_eq!(*sums.lock(), vec![2, 30]);
}

/// Test that an effect writing another signal from the same batch gets the
/// same result as without the batch.
#[test]
fn batch_flush_lets_effects_write_other_pending_signals() {
    fn scaled_write(batched: bool) -> (i32, Vec<i32>) {
        let runtime = Runtime::new();
        let a = runtime.signal(0);
        let b = runtime.signal(0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (a_clone, b_clone) = (a.clone(), b.clone());
        let _scaler = runtime.effect(move || {
            let value = a_clone.get();
            if value > 0 {
                b_clone.set(value * 10);
            }
        });
        let (b_clone, seen_clone) = (b.clone(), seen.clone());
        let _reader = runtime.effect(move || {
            seen_clone.lock().push(b_clone.get());
        });

        if batched {
            runtime.batch(|| {
                b.set(5);
                a.set(2);
            });
        } else {
            b.set(5);
            a.set(2);
        }
        let seen = seen.lock().clone();
        (b.peek(), seen)
    }

    let (unbatched, _) = scaled_write(false);
    let (batched, seen) = scaled_write(true);
    assert_eq!(unbatched, 20);
    assert_eq!(batched, 20);
    // The reader never saw the intermediate 5, and its last run saw 20
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&20));
    assert!(!seen.contains(&5));
}

/// Test that a write made during a batch flush notifies its readers in a
/// nested pass, while a true cycle through two effects still stops.
#[test]
fn nested_notification_inside_a_flush() {
    let runtime = Runtime::new();
    let celsius = runtime.signal(1);
    let fahrenheit = runtime.signal(0);
    let label = runtime.signal(String::new());
    let labels = Arc::new(Mutex::new(Vec::new()));

    let (c, f) = (celsius.clone(), fahrenheit.clone());
    let _to_fahrenheit = runtime.effect(move || {
        f.set(c.get() * 9 / 5 + 32);
    });
    // Writes back into celsius, which is already on this chain
    let (c, f) = (celsius.clone(), fahrenheit.clone());
    let _to_celsius = runtime.effect(move || {
        c.set((f.get() - 32) * 5 / 9 + 1);
    });
    let (f, l) = (fahrenheit.clone(), label.clone());
    let _format = runtime.effect(move || {
        l.set(format!("{}F", f.get()));
    });
    let (l, labels_clone) = (label.clone(), labels.clone());
    let _print = runtime.effect(move || {
        labels_clone.lock().push(l.get());
    });

    runtime.batch(|| {
        celsius.set(100);
        label.set("pending".to_string());
    });

    // The write back from to_celsius was dropped as circular
    assert_eq!(celsius.peek(), 100);
    assert_eq!(fahrenheit.peek(), 212);
    assert_eq!(label.peek(), "212F");
    assert_eq!(*labels.lock(), vec!["33F".to_string(), "212F".to_string()]);
}

/// Test that computeds cache values between reads.
#[test]
fn computed_caches_expensive_computation() {
    let runtime = Runtime::new();
    let compute_count = Arc::new(AtomicI32::new(0));
    let count_clone = compute_count.clone();

    let signal = runtime.signal(5);
    let signal_clone = signal.clone();
    let squared = runtime.computed(move || {
        count_clone.fetch_add(1, Ordering::SeqCst);
        let v = signal_clone.get();
        v * v
    });

    assert_eq!(squared.get(), 25);
    assert_eq!(squared.get(), 25);
    assert_eq!(squared.get(), 25);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    // Writes alone do not recompute
    signal.set(6);
    signal.set(7);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    assert_eq!(squared.get(), 49);
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);
}

/// Test the diamond: both sides are fresh when the join recomputes, and it
/// recomputes once per write.
#[test]
fn diamond_recomputes_join_once_without_glitches() {
    let runtime = Runtime::new();
    let base = runtime.signal(1);

    let base_clone = base.clone();
    let double = runtime.computed(move || base_clone.get() * 2);
    let base_clone = base.clone();
    let triple = runtime.computed(move || base_clone.get() * 3);

    let sum_runs = Arc::new(AtomicI32::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));
    let (double_clone, triple_clone) = (double.clone(), triple.clone());
    let (runs_clone, observed_clone) = (sum_runs.clone(), observed.clone());
    let sum = runtime.computed(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let pair = (double_clone.get(), triple_clone.get());
        observed_clone.lock().push(pair);
        pair.0 + pair.1
    });

    let effect_seen = Arc::new(Mutex::new(Vec::new()));
    let effect_seen_clone = effect_seen.clone();
    let sum_clone = sum.clone();
    let _effect = runtime.effect(move || {
        effect_seen_clone.lock().push(sum_clone.get());
    });

    base.set(4);

    assert_eq!(sum.get(), 20);
    assert_eq!(sum_runs.load(Ordering::SeqCst), 2);
    assert_eq!(*observed.lock(), vec![(2, 3), (8, 12)]);
    assert_eq!(*effect_seen.lock(), vec![5, 20]);
}

/// Test the full pipeline: signal, computed, effect.
#[test]
fn signal_computed_effect_end_to_end() {
    let runtime = Runtime::new();
    let count = runtime.signal(1);

    let count_clone = count.clone();
    let doubled = runtime.computed(move || count_clone.get() * 2);

    let seen = Arc::new(AtomicI32::new(0));
    let seen_clone = seen.clone();
    let doubled_clone = doubled.clone();
    let effect = runtime.effect(move || {
        seen_clone.store(doubled_clone.get(), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    count.set(5);
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert_eq!(effect.run_count(), 2);
}

/// Test that an effect behind a computed whose value did not change is
/// skipped.
#[test]
fn unchanged_computed_does_not_rerun_effects() {
    let runtime = Runtime::new();
    let number = runtime.signal(2);

    let number_clone = number.clone();
    let is_even = runtime.computed(move || number_clone.get() % 2 == 0);

    let is_even_clone = is_even.clone();
    let effect = runtime.effect(move || {
        is_even_clone.get();
    });

    number.set(4);
    number.set(6);
    assert_eq!(effect.run_count(), 1);

    number.set(7);
    assert_eq!(effect.run_count(), 2);
}

/// Test that unsubscribing stops notifications.
#[test]
fn unsubscribe_stops_notifications() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);
    let received = Arc::new(AtomicI32::new(0));

    let received_clone = received.clone();
    let subscription = signal.subscribe(move |value| {
        received_clone.store(value, Ordering::SeqCst);
    });

    signal.set(3);
    assert_eq!(received.load(Ordering::SeqCst), 3);

    subscription.unsubscribe();
    signal.set(9);
    assert_eq!(received.load(Ordering::SeqCst), 3);
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that subscribers wait for a change while effects run immediately.
#[test]
fn subscribe_waits_but_effect_runs_immediately() {
    let runtime = Runtime::new();
    let signal = runtime.signal(1);
    let subscriber_calls = Arc::new(AtomicI32::new(0));
    let effect_calls = Arc::new(AtomicI32::new(0));

    let calls_clone = subscriber_calls.clone();
    let _subscription = signal.subscribe(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    let calls_clone = effect_calls.clone();
    let signal_clone = signal.clone();
    let _effect = runtime.effect(move || {
        signal_clone.get();
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(subscriber_calls.load(Ordering::SeqCst), 0);
    assert_eq!(effect_calls.load(Ordering::SeqCst), 1);

    signal.set(2);
    assert_eq!(subscriber_calls.load(Ordering::SeqCst), 1);
    assert_eq!(effect_calls.load(Ordering::SeqCst), 2);
}

/// Test that a failing effect does not stop its siblings or the writer.
#[test]
fn failing_effect_is_isolated() {
    let runtime = Runtime::with_config(RuntimeConfig {
        log_subscriber_errors: false,
        ..RuntimeConfig::default()
    });
    let signal = runtime.signal(0);
    let healthy_runs = Arc::new(AtomicI32::new(0));

    let signal_clone = signal.clone();
    let failing = runtime.effect(move || {
        if signal_clone.get() > 0 {
            panic!("effect blew up");
        }
    });
    let signal_clone = signal.clone();
    let runs_clone = healthy_runs.clone();
    let _healthy = runtime.effect(move || {
        signal_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    signal.set(1);
    assert_eq!(healthy_runs.load(Ordering::SeqCst), 2);
    assert!(failing.is_active());

    // The failing effect is still subscribed
    signal.set(2);
    assert_eq!(failing.run_count(), 3);
    assert_eq!(healthy_runs.load(Ordering::SeqCst), 3);
}

/// Test that an effect returning an error is treated like a failure.
#[test]
fn effect_error_result_is_isolated() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);

    let signal_clone = signal.clone();
    let effect = runtime.effect(move || -> Result<(), String> {
        if signal_clone.get() % 2 == 1 {
            return Err("odd value".to_string());
        }
        Ok(())
    });

    signal.set(1);
    signal.set(2);
    assert_eq!(effect.run_count(), 3);
    assert!(effect.is_active());
}

/// Test that a write to a signal during its own notification is dropped.
#[test]
fn circular_write_is_dropped() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);

    let signal_clone = signal.clone();
    let effect = runtime.effect(move || {
        let value = signal_clone.get();
        if value < 100 {
            signal_clone.set(value + 1);
        }
    });
    // The first run is not inside a notification, so its write lands
    assert_eq!(signal.peek(), 1);
    assert_eq!(effect.run_count(), 1);

    signal.set(5);
    assert_eq!(signal.peek(), 5);
    assert_eq!(effect.run_count(), 2);

    // Still subscribed afterwards
    signal.set(50);
    assert_eq!(effect.run_count(), 3);
}

/// Test that cleanups run exactly once before each re-run and on stop.
#[test]
fn cleanup_runs_before_rerun_and_on_stop() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);
    let cleanups = Arc::new(AtomicI32::new(0));

    let signal_clone = signal.clone();
    let cleanups_clone = cleanups.clone();
    let effect = runtime.effect(move || {
        signal_clone.get();
        let cleanups = cleanups_clone.clone();
        Cleanup::new(move || {
            cleanups.fetch_add(1, Ordering::SeqCst);
        })
    });
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);

    signal.set(1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    signal.set(2);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);

    effect.stop();
    assert_eq!(cleanups.load(Ordering::SeqCst), 3);

    effect.stop();
    signal.set(3);
    assert_eq!(cleanups.load(Ordering::SeqCst), 3);
}

/// Test that an effect writing a signal runs before effects reading it, so
/// readers never see a half-updated state.
#[test]
fn writer_effects_run_before_their_readers() {
    let runtime = Runtime::new();
    let a = runtime.signal(0);
    let b = runtime.signal(0);
    let observed = Arc::new(Mutex::new(Vec::new()));

    // Registered first, so registration order alone would run it first
    let (a_clone, b_clone) = (a.clone(), b.clone());
    let observed_clone = observed.clone();
    let reader = runtime.effect(move || {
        observed_clone.lock().push((a_clone.get(), b_clone.get()));
    });

    let (a_clone, b_clone) = (a.clone(), b.clone());
    let _writer = runtime.effect(move || {
        b_clone.set(a_clone.get() * 10);
    });

    a.set(1);

    assert_eq!(*observed.lock(), vec![(0, 0), (1, 10)]);
    assert_eq!(reader.run_count(), 2);
}

/// Test that an effect writing its own dependency runs once per external
/// write instead of looping.
#[test]
fn self_triggering_effect_runs_once_per_trigger() {
    let runtime = Runtime::new();
    let trigger = runtime.signal(0);
    let echo = runtime.signal(0);

    let (trigger_clone, echo_clone) = (trigger.clone(), echo.clone());
    let effect = runtime.effect(move || {
        let value = trigger_clone.get();
        let echoed = echo_clone.get();
        echo_clone.set(echoed + value);
    });

    for i in 1..=3 {
        trigger.set(i);
        assert_eq!(effect.run_count(), 1 + i as usize);
    }
    assert_eq!(echo.peek(), 1 + 2 + 3);
}

/// Test that untracked reads create no dependency.
#[test]
fn untracked_reads_do_not_subscribe() {
    let runtime = Runtime::new();
    let tracked = runtime.signal(0);
    let ignored = runtime.signal(0);

    let (tracked_clone, ignored_clone) = (tracked.clone(), ignored.clone());
    let runtime_clone = runtime.clone();
    let effect = runtime.effect(move || {
        tracked_clone.get();
        runtime_clone.untrack(|| ignored_clone.get());
        // peek never tracks
        ignored_clone.peek();
    });
    assert_eq!(effect.dependency_count(), 1);

    ignored.set(1);
    assert_eq!(effect.run_count(), 1);

    tracked.set(1);
    assert_eq!(effect.run_count(), 2);
}

/// Test that a failing computed keeps its dependencies and recovers.
#[test]
fn failing_computed_recovers_after_fix() {
    let runtime = Runtime::new();
    let broken = runtime.signal(false);
    let base = runtime.signal(2);

    let (broken_clone, base_clone) = (broken.clone(), base.clone());
    let doubled = runtime.computed(move || {
        if broken_clone.get() {
            panic!("cannot compute");
        }
        base_clone.get() * 2
    });
    assert_eq!(doubled.get(), 4);

    broken.set(true);
    let err = doubled.try_get().unwrap_err();
    assert!(matches!(err, ReactiveError::ComputeEvaluation { .. }));
    assert!(err.to_string().contains("cannot compute"));

    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| doubled.get()));
    assert!(panicked.is_err());

    broken.set(false);
    base.set(5);
    assert_eq!(doubled.try_get(), Ok(10));
}

/// Test that disposing the runtime stops every effect.
#[test]
fn dispose_stops_all_effects() {
    let runtime = Runtime::new();
    let signal = runtime.signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    for _ in 0..3 {
        let signal_clone = signal.clone();
        let runs_clone = runs.clone();
        runtime.effect(move || {
            signal_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(runtime.effect_count(), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    runtime.dispose();
    assert_eq!(runtime.effect_count(), 0);

    signal.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}
