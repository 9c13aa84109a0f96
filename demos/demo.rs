//! Comprehensive harness demo showing happy and unhappy paths.
//!
//! Run with: cargo run --example demo

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gauntlet::{cases, Control, Defaults, Harness, LoopScheduler, Scheduler, Specification, Status};

// ============================================================================
// A fake device the cases exercise
// ============================================================================

#[derive(Default)]
struct Device {
    writes: AtomicU32,
    flaky_attempts: AtomicU32,
}

impl Device {
    fn write(&self, value: u32) {
        println!("  [device] write {value}");
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Succeeds on the third attempt.
    fn flaky_probe(&self) -> bool {
        let attempt = self.flaky_attempts.fetch_add(1, Ordering::SeqCst);
        println!("  [device] probe attempt {attempt}");
        attempt >= 2
    }
}

// ============================================================================
// Demo
// ============================================================================

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let device = Arc::new(Device::default());
    let scheduler = Arc::new(LoopScheduler::new());
    let harness = Harness::new(scheduler.clone());

    // An in-flight case: the body kicks off "asynchronous" work and
    // suspends; the posted callback resolves it before the deadline.
    let async_harness = harness.clone();
    let async_scheduler = Arc::clone(&scheduler);

    let write_device = Arc::clone(&device);
    let probe_device = Arc::clone(&device);
    let registry = cases! {
        "writes reach the device" => move || {
            write_device.write(7);
            write_device.write(11);
            assert_eq!(write_device.writes.load(Ordering::SeqCst), 2);
        },
        "flaky probe settles after retries" => counted move |attempt| {
            if probe_device.flaky_probe() {
                Control::done()
            } else {
                println!("  retrying (attempt {attempt})");
                Control::repeat_case()
            }
        },
        "asynchronous completion arrives in time" => control move || {
            let done = async_harness.clone();
            async_scheduler.post(Box::new(move || {
                println!("  [callback] work finished, signaling done");
                done.signal_done();
            }));
            Control::await_timeout(Duration::from_millis(200))
        },
        "not implemented yet" => pending,
    };

    println!("=== running {} cases ===", registry.len());
    harness
        .run(
            Specification::new(registry)
                .with_defaults(Defaults::verbose())
                .with_setup(|count| {
                    println!("> run starting with {count} cases");
                    Status::Continue
                })
                .with_teardown(|passed, failed, reason| {
                    println!("> run finished: {passed} passed, {failed} failed ({reason})");
                    Status::Continue
                })
                .on_completion(|report| println!("> completion hook: {report}")),
        )
        .expect("no other run is active");

    scheduler.run_until_idle();

    let report = harness.report().expect("the run has halted");
    println!("=== final report: {report} ===");
}
