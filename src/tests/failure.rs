//! Failure-path tests: raised failures, the bounded teardown escalation,
//! and handler absence.

use std::sync::Arc;

use super::common::{run_to_halt, Event, Probe};
use crate::{Case, Failure, Harness, LoopScheduler, Report, Specification, Status};

/// A failure raised from a case body, with an aborting failure handler:
/// the case gets one teardown, the run gets test teardown, and the cases
/// after it never execute.
#[test]
fn raised_failure_aborts_through_teardown() {
    let probe = Probe::new();
    let scheduler = Arc::new(LoopScheduler::new());
    let harness = Harness::new(scheduler.clone());

    let body_probe = probe.clone();
    let body_harness = harness.clone();
    let failing = Case::new("two", move || {
        body_probe.record(Event::Body("two".into()));
        body_harness.raise(Failure::Cases);
    });
    let registry = vec![probe.body_case("one"), failing, probe.body_case("three")];

    harness
        .run(Specification::new(registry).with_defaults(probe.aborting_defaults()))
        .expect("run should start");
    scheduler.run_until_idle();

    assert_eq!(
        harness.report(),
        Some(Report {
            passed: 1,
            failed: 1,
            reason: Failure::Cases
        })
    );
    assert_eq!(
        probe.events(),
        vec![
            Event::TestSetup(3),
            Event::CaseSetup("one".into(), 0),
            Event::Body("one".into()),
            Event::CaseTeardown("one".into(), 1, 0, Failure::None),
            Event::CaseSetup("two".into(), 1),
            Event::Body("two".into()),
            Event::CaseFailure("two".into(), Failure::Cases),
            Event::CaseTeardown("two".into(), 0, 1, Failure::Cases),
            Event::TestTeardown(1, 1, Failure::Cases),
        ]
    );
}

/// With a continuing failure handler the run survives the failed case and
/// executes the rest of the registry.
#[test]
fn continuing_handler_runs_the_registry_through() {
    let probe = Probe::new();
    let scheduler = Arc::new(LoopScheduler::new());
    let harness = Harness::new(scheduler.clone());

    let body_probe = probe.clone();
    let body_harness = harness.clone();
    let failing = Case::new("two", move || {
        body_probe.record(Event::Body("two".into()));
        body_harness.raise(Failure::Cases);
    });
    let registry = vec![probe.body_case("one"), failing, probe.body_case("three")];

    harness
        .run(Specification::new(registry).with_defaults(probe.defaults()))
        .expect("run should start");
    scheduler.run_until_idle();

    assert_eq!(
        harness.report(),
        Some(Report {
            passed: 2,
            failed: 1,
            reason: Failure::Cases
        })
    );
    assert_eq!(probe.count(|e| matches!(e, Event::Body(b) if b == "three")), 1);
    assert_eq!(
        probe.count(|e| matches!(e, Event::CaseTeardown(d, 0, 1, Failure::Cases) if d == "two")),
        1
    );
}

/// An empty case raises exactly one empty-case failure. Its setup and
/// teardown never run, and it consumes no attempted-case index.
#[test]
fn empty_case_is_skipped_with_one_failure() {
    let probe = Probe::new();
    let registry = vec![
        probe.body_case("one"),
        Case::pending("unwritten"),
        probe.body_case("three"),
    ];

    let report = run_to_halt(registry, probe.defaults());

    assert_eq!(
        report,
        Report {
            passed: 2,
            failed: 1,
            reason: Failure::Cases
        }
    );
    assert_eq!(
        probe.events(),
        vec![
            Event::TestSetup(3),
            Event::CaseSetup("one".into(), 0),
            Event::Body("one".into()),
            Event::CaseTeardown("one".into(), 1, 0, Failure::None),
            Event::CaseFailure("unwritten".into(), Failure::EmptyCase),
            // The skipped case consumed no index.
            Event::CaseSetup("three".into(), 1),
            Event::Body("three".into()),
            Event::CaseTeardown("three".into(), 1, 0, Failure::None),
            Event::TestTeardown(2, 1, Failure::Cases),
        ]
    );
}

/// A case setup that aborts skips the body and runs the case teardown
/// exactly once, with the setup reason.
#[test]
fn case_setup_abort_skips_body_and_tears_down_once() {
    let probe = Probe::new();
    let case = probe
        .body_case("guarded")
        .with_setup(|_, _| Status::Abort);

    let report = run_to_halt(vec![case], probe.defaults());

    assert_eq!(
        report,
        Report {
            passed: 0,
            failed: 1,
            reason: Failure::Cases
        }
    );
    assert_eq!(
        probe.events(),
        vec![
            Event::TestSetup(1),
            Event::CaseFailure("guarded".into(), Failure::Setup),
            Event::CaseTeardown("guarded".into(), 0, 1, Failure::Setup),
            Event::TestTeardown(0, 1, Failure::Cases),
        ]
    );
}

/// A case teardown that does not continue raises a teardown failure, and
/// that failure never re-attempts teardown.
#[test]
fn teardown_failure_is_raised_once() {
    let probe = Probe::new();
    let teardown_probe = probe.clone();
    let case = probe
        .body_case("leaky")
        .with_teardown(move |case, passed, failed, reason| {
            teardown_probe.record(Event::CaseTeardown(
                case.description().to_string(),
                passed,
                failed,
                reason,
            ));
            Status::Abort
        });

    let report = run_to_halt(vec![case], probe.defaults());

    assert_eq!(
        report,
        Report {
            passed: 0,
            failed: 1,
            reason: Failure::Cases
        }
    );
    assert_eq!(
        probe.events(),
        vec![
            Event::TestSetup(1),
            Event::CaseSetup("leaky".into(), 0),
            Event::Body("leaky".into()),
            Event::CaseTeardown("leaky".into(), 1, 0, Failure::None),
            Event::CaseFailure("leaky".into(), Failure::Teardown),
            Event::TestTeardown(0, 1, Failure::Cases),
        ]
    );
}

/// The escalation bound: an aborting failure whose cleanup teardown also
/// fails produces exactly two failure-handler calls and one teardown call,
/// then the run halts with the teardown reason.
#[test]
fn failing_escalation_teardown_is_bounded() {
    let probe = Probe::new();
    let scheduler = Arc::new(LoopScheduler::new());
    let harness = Harness::new(scheduler.clone());

    let body_probe = probe.clone();
    let body_harness = harness.clone();
    let teardown_probe = probe.clone();
    let case = Case::new("cursed", move || {
        body_probe.record(Event::Body("cursed".into()));
        body_harness.raise(Failure::Cases);
    })
    .with_teardown(move |case, passed, failed, reason| {
        teardown_probe.record(Event::CaseTeardown(
            case.description().to_string(),
            passed,
            failed,
            reason,
        ));
        Status::Abort
    });

    harness
        .run(Specification::new(vec![case]).with_defaults(probe.aborting_defaults()))
        .expect("run should start");
    scheduler.run_until_idle();

    assert_eq!(
        harness.report(),
        Some(Report {
            passed: 0,
            failed: 1,
            reason: Failure::Teardown
        })
    );
    assert_eq!(
        probe.events(),
        vec![
            Event::TestSetup(1),
            Event::CaseSetup("cursed".into(), 0),
            Event::Body("cursed".into()),
            Event::CaseFailure("cursed".into(), Failure::Cases),
            Event::CaseTeardown("cursed".into(), 0, 1, Failure::Cases),
            Event::CaseFailure("cursed".into(), Failure::Teardown),
            Event::TestTeardown(0, 1, Failure::Teardown),
        ]
    );
}

/// With the failure handler suppressed, any failure is non-recoverable:
/// the run aborts with no failure-handler call at all.
#[test]
fn absent_failure_handler_aborts() {
    let probe = Probe::new();
    let scheduler = Arc::new(LoopScheduler::new());
    let harness = Harness::new(scheduler.clone());

    let body_probe = probe.clone();
    let body_harness = harness.clone();
    let case = Case::new("silent", move || {
        body_probe.record(Event::Body("silent".into()));
        body_harness.raise(Failure::Cases);
    })
    .ignore_failure();

    harness
        .run(Specification::new(vec![case]).with_defaults(probe.defaults()))
        .expect("run should start");
    scheduler.run_until_idle();

    assert_eq!(
        harness.report(),
        Some(Report {
            passed: 0,
            failed: 1,
            reason: Failure::Cases
        })
    );
    assert_eq!(probe.count(|e| matches!(e, Event::CaseFailure(..))), 0);
    assert_eq!(
        probe.count(|e| matches!(e, Event::CaseTeardown(d, 0, 1, Failure::Cases) if d == "silent")),
        1
    );
}
