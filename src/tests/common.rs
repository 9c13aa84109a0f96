//! Shared probe and helpers for harness tests.
//!
//! The [`Probe`] hands out handler tables whose every slot records an
//! [`Event`] before continuing, so tests can assert on the exact order of
//! handler invocations a run produced.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    Case, Defaults, Failure, Harness, LoopScheduler, Report, Specification, Status,
};

/// One recorded handler (or body) invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Test setup with the case count.
    TestSetup(usize),
    /// Test teardown with final counts and the aggregated reason.
    TestTeardown(usize, usize, Failure),
    /// Case setup with the case description and attempted-case index.
    CaseSetup(String, usize),
    /// Case teardown with cumulative case counts and reason.
    CaseTeardown(String, usize, usize, Failure),
    /// Case failure with the raised reason.
    CaseFailure(String, Failure),
    /// A case body invocation.
    Body(String),
}

/// Records every handler invocation of a run.
#[derive(Clone, Default)]
pub struct Probe {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// A handler table recording every slot and continuing everywhere,
    /// including on failures.
    pub fn defaults(&self) -> Defaults {
        Defaults::silent()
            .on_test_setup({
                let probe = self.clone();
                move |count| {
                    probe.record(Event::TestSetup(count));
                    Status::Continue
                }
            })
            .on_test_teardown({
                let probe = self.clone();
                move |passed, failed, reason| {
                    probe.record(Event::TestTeardown(passed, failed, reason));
                    Status::Continue
                }
            })
            .on_case_setup({
                let probe = self.clone();
                move |case, index| {
                    probe.record(Event::CaseSetup(case.description().to_string(), index));
                    Status::Continue
                }
            })
            .on_case_teardown({
                let probe = self.clone();
                move |case, passed, failed, reason| {
                    probe.record(Event::CaseTeardown(
                        case.description().to_string(),
                        passed,
                        failed,
                        reason,
                    ));
                    Status::Continue
                }
            })
            .on_case_failure({
                let probe = self.clone();
                move |case, reason| {
                    probe.record(Event::CaseFailure(case.description().to_string(), reason));
                    Status::Continue
                }
            })
    }

    /// Same table, but the failure handler aborts — the behavior the
    /// harness also applies when no failure handler is present at all.
    pub fn aborting_defaults(&self) -> Defaults {
        self.defaults().on_case_failure({
            let probe = self.clone();
            move |case, reason| {
                probe.record(Event::CaseFailure(case.description().to_string(), reason));
                Status::Abort
            }
        })
    }

    /// A plain case whose body records a [`Event::Body`] entry.
    pub fn body_case(&self, description: &'static str) -> Case {
        let probe = self.clone();
        Case::new(description, move || {
            probe.record(Event::Body(description.to_string()))
        })
    }
}

/// Drive a fresh harness over the registry until the scheduler drains,
/// returning the final report.
pub fn run_to_halt(cases: Vec<Case>, defaults: Defaults) -> Report {
    let scheduler = Arc::new(LoopScheduler::new());
    let harness = Harness::new(scheduler.clone());
    harness
        .run(Specification::new(cases).with_defaults(defaults))
        .expect("run should start");
    scheduler.run_until_idle();
    harness.report().expect("run should have halted")
}
