//! The harness orchestrator: run state, the step function, asynchronous
//! completion, and failure escalation.
//!
//! The orchestrator owns every piece of run-scoped and case-scoped mutable
//! state and advances through the registry one case-attempt per scheduling
//! turn:
//!
//! ```text
//! Idle -> TestSetup -> {CaseSetup -> CaseBody -> [InFlight] -> CaseTeardown}* -> TestTeardown -> Halted
//! ```
//!
//! `Halted` is terminal for a run: nothing is scheduled past it. Any
//! transition may short-circuit to it through [`Failure`] escalation.
//!
//! Every entry point — [`Harness::run`], the posted step turn, the two
//! completion stimuli, [`Harness::raise`] — executes inside one critical
//! section (a re-entrant mutex over the run state), so no two entry points
//! interleave even when one arrives from a timer-like context. The section
//! is re-entrant on purpose: a case body or handler may call
//! [`Harness::raise`] synchronously, the way an assertion hook would. Early
//! completion of an in-flight case is different — the timeout is armed only
//! after the body returns, so a body announces completion by posting a
//! callback that invokes [`Harness::signal_done`].

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::case::{Case, CaseBody, Control, Repeat};
use crate::handlers::{Defaults, Failure, Override, Status, TestSetupFn, TestTeardownFn};
use crate::scheduler::{CallbackHandle, Scheduler};

// ============================================================================
// Run Identity and Report
// ============================================================================

/// Unique identifier for one run, used to correlate log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The final reported triple, delivered to test-level teardown and to the
/// completion hook right before the run halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Cases that committed as passed.
    pub passed: usize,
    /// Cases that committed as failed.
    pub failed: usize,
    /// Aggregated failure reason, [`Failure::None`] for a clean run.
    pub reason: Failure,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} passed, {} failed ({})",
            self.passed, self.failed, self.reason
        )
    }
}

// ============================================================================
// Phase and Error
// ============================================================================

/// The lifecycle phase of the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No run has been started yet.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The run halted. Terminal: no further transitions occur until a new
    /// run resets the state.
    Halted,
}

/// Errors returned by harness entry points.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// A run is already in progress; exactly one run may be active at a
    /// time.
    #[error("a run is already in progress")]
    AlreadyRunning,
}

// ============================================================================
// Specification
// ============================================================================

/// One-shot hook invoked with the final [`Report`] when the run halts.
pub type CompletionFn = Box<dyn FnOnce(Report) + Send>;

/// Everything a run needs: the ordered case registry, the default handler
/// table, test-level handler overrides, and an optional completion hook.
pub struct Specification {
    cases: Vec<Case>,
    defaults: Defaults,
    setup: Override<TestSetupFn>,
    teardown: Override<TestTeardownFn>,
    completion: Option<CompletionFn>,
}

impl Specification {
    /// Create a specification over an ordered case registry with the
    /// verbose default handler table.
    pub fn new(cases: impl IntoIterator<Item = Case>) -> Self {
        Self {
            cases: cases.into_iter().collect(),
            defaults: Defaults::verbose(),
            setup: Override::Default,
            teardown: Override::Default,
            completion: None,
        }
    }

    /// Replace the default handler table.
    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Override the test-setup handler.
    pub fn with_setup(
        mut self,
        handler: impl Fn(usize) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.setup = Override::Custom(Arc::new(handler));
        self
    }

    /// Override the test-teardown handler.
    pub fn with_teardown(
        mut self,
        handler: impl Fn(usize, usize, Failure) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.teardown = Override::Custom(Arc::new(handler));
        self
    }

    /// Register a one-shot hook fired with the final report at halt.
    pub fn on_completion(mut self, hook: impl FnOnce(Report) + Send + 'static) -> Self {
        self.completion = Some(Box::new(hook));
        self
    }

    /// Number of cases in the registry.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether the registry holds no cases.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl std::fmt::Debug for Specification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specification")
            .field("cases", &self.cases.len())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Run State
// ============================================================================

/// The resolved handler set in effect. Test slots resolve once per run,
/// case slots once per step turn from the current case's overrides.
#[derive(Clone, Default)]
struct ActiveHandlers {
    test_setup: Option<TestSetupFn>,
    test_teardown: Option<TestTeardownFn>,
    case_setup: Option<crate::handlers::CaseSetupFn>,
    case_teardown: Option<crate::handlers::CaseTeardownFn>,
    case_failure: Option<crate::handlers::CaseFailureFn>,
}

struct RunState {
    phase: Phase,
    run_id: Option<RunId>,
    cases: Arc<[Case]>,
    defaults: Defaults,
    active: ActiveHandlers,

    /// Cursor into the registry.
    index: usize,
    /// Externally visible index of the case being attempted. Advances only
    /// on no-repeat commits of attempted cases, so repeats keep reporting
    /// the same index and empty cases consume none.
    index_of_case: usize,

    test_passed: usize,
    test_failed: usize,

    case_passed: usize,
    case_failed: usize,
    /// Snapshot of `case_failed` taken right before each body invocation;
    /// detects failures raised by that invocation alone.
    case_failed_before: usize,
    /// Body invocations for the current case, counting repeats.
    case_repeat_count: usize,
    /// Directive returned by the latest body invocation.
    case_control: Control,

    /// The at-most-one outstanding timeout.
    timeout_handle: Option<CallbackHandle>,

    report: Option<Report>,
    completion: Option<CompletionFn>,
}

impl RunState {
    fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            run_id: None,
            cases: Arc::from(Vec::new()),
            defaults: Defaults::silent(),
            active: ActiveHandlers::default(),
            index: 0,
            index_of_case: 0,
            test_passed: 0,
            test_failed: 0,
            case_passed: 0,
            case_failed: 0,
            case_failed_before: 0,
            case_repeat_count: 0,
            case_control: Control::done(),
            timeout_handle: None,
            report: None,
            completion: None,
        }
    }

    fn fresh(run_id: RunId, spec: Specification) -> Self {
        let mut state = Self::idle();
        state.phase = Phase::Running;
        state.run_id = Some(run_id);
        state.active.test_setup = spec.setup.resolve(spec.defaults.test_setup.as_ref());
        state.active.test_teardown = spec.teardown.resolve(spec.defaults.test_teardown.as_ref());
        state.cases = spec.cases.into();
        state.defaults = spec.defaults;
        state.completion = spec.completion;
        state
    }
}

type StateCell = RefCell<RunState>;

// ============================================================================
// Harness
// ============================================================================

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    /// The critical section. Re-entrant so that bodies and handlers may
    /// call back into the harness on the same logical thread; the inner
    /// `RefCell` is never borrowed across a user-code invocation.
    state: ReentrantMutex<StateCell>,
}

/// The harness orchestrator. Cheap to clone; all clones share one run state.
#[derive(Clone)]
pub struct Harness {
    inner: Arc<Inner>,
}

impl Harness {
    /// Create a harness driven by the given scheduler.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                state: ReentrantMutex::new(RefCell::new(RunState::idle())),
            }),
        }
    }

    /// Start a run.
    ///
    /// Resets all run state, invokes the test-setup handler synchronously
    /// with the case count, and posts the first step turn. If test setup
    /// does not continue, test teardown is invoked with `(0, 0, Setup)` and
    /// the run halts before any case executes.
    ///
    /// Returns [`HarnessError::AlreadyRunning`] while another run is
    /// active. A new run after halt is accepted and starts from scratch.
    pub fn run(&self, spec: Specification) -> Result<(), HarnessError> {
        let guard = self.inner.state.lock();
        let cell = &*guard;
        if cell.borrow().phase == Phase::Running {
            return Err(HarnessError::AlreadyRunning);
        }

        let run_id = RunId::new();
        let case_count = spec.len();
        cell.replace(RunState::fresh(run_id, spec));
        tracing::info!(run = %run_id, cases = case_count, "starting run");

        let setup = cell.borrow().active.test_setup.clone();
        if let Some(setup) = setup {
            if setup(case_count) != Status::Continue {
                tracing::warn!(run = %run_id, "test setup did not continue");
                let teardown = cell.borrow().active.test_teardown.clone();
                if let Some(teardown) = teardown {
                    teardown(0, 0, Failure::Setup);
                }
                self.halt(
                    cell,
                    Report {
                        passed: 0,
                        failed: 0,
                        reason: Failure::Setup,
                    },
                );
                return Ok(());
            }
        }

        self.post_step();
        Ok(())
    }

    /// Raise a failure against the current case.
    ///
    /// This is the assertion hook: a case body (or a handler) calls it
    /// synchronously when it detects a failure. The failure is counted,
    /// routed through the case-failure handler, and escalated per the
    /// bounded teardown protocol. A no-op when no run is active or no case
    /// is current.
    pub fn raise(&self, reason: Failure) {
        let guard = self.inner.state.lock();
        let cell = &*guard;
        {
            let state = cell.borrow();
            if state.phase != Phase::Running || state.index >= state.cases.len() {
                return;
            }
        }
        self.raise_failure(cell, reason);
    }

    /// External done signal: resolves the in-flight case early.
    ///
    /// Cancels the pending timeout and advances. Idempotent: a no-op when
    /// no timeout is outstanding (never scheduled, already fired, or
    /// already resolved). The timeout is armed only after the case body
    /// returns, so a body wanting to announce its own completion must post
    /// this through the scheduler rather than call it inline.
    pub fn signal_done(&self) {
        let guard = self.inner.state.lock();
        let cell = &*guard;
        let handle = {
            let mut state = cell.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            state.timeout_handle.take()
        };
        if let Some(handle) = handle {
            self.inner.scheduler.cancel(handle);
            tracing::debug!("in-flight case resolved by done signal");
            self.advance(cell, true);
        }
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().borrow().phase
    }

    /// Whether a run is in progress.
    pub fn is_busy(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// The final report, available once the run has halted.
    pub fn report(&self) -> Option<Report> {
        self.inner.state.lock().borrow().report
    }

    /// The identifier of the current (or last) run.
    pub fn run_id(&self) -> Option<RunId> {
        self.inner.state.lock().borrow().run_id
    }

    // ------------------------------------------------------------------
    // Internals. Every method below runs with the critical section held;
    // the state cell is never borrowed across a user-code invocation, and
    // every user-code return is followed by a halt check because any
    // handler may have raised and aborted the run re-entrantly.
    // ------------------------------------------------------------------

    fn post_step(&self) {
        let harness = self.clone();
        self.inner
            .scheduler
            .post(Box::new(move || harness.step_turn()));
    }

    fn halted(&self, cell: &StateCell) -> bool {
        cell.borrow().phase == Phase::Halted
    }

    /// One step turn: advance by at most one case-body invocation.
    fn step_turn(&self) {
        let guard = self.inner.state.lock();
        let cell = &*guard;

        let (cases, index) = {
            let state = cell.borrow();
            if state.phase != Phase::Running {
                // A stale turn posted before the run halted.
                return;
            }
            (Arc::clone(&state.cases), state.index)
        };
        if index >= cases.len() {
            self.exhausted(cell);
            return;
        }
        let case = &cases[index];

        // Resolve this case's handler slots against the defaults.
        {
            let mut state = cell.borrow_mut();
            let setup = case
                .setup_override()
                .resolve(state.defaults.case_setup.as_ref());
            let teardown = case
                .teardown_override()
                .resolve(state.defaults.case_teardown.as_ref());
            let failure = case
                .failure_override()
                .resolve(state.defaults.case_failure.as_ref());
            state.active.case_setup = setup;
            state.active.case_teardown = teardown;
            state.active.case_failure = failure;
        }

        let Some(body) = case.body().cloned() else {
            // An empty case raises exactly one failure and is advanced
            // past; only the failure handler observes it.
            self.raise_failure(cell, Failure::EmptyCase);
            if self.halted(cell) {
                return;
            }
            self.advance(cell, false);
            return;
        };

        let (first_attempt, previous_repeat, shown_index) = {
            let state = cell.borrow();
            (
                state.case_passed == 0 && state.case_failed == 0,
                state.case_control.repeat(),
                state.index_of_case,
            )
        };
        if first_attempt || previous_repeat == Repeat::All {
            let setup = cell.borrow().active.case_setup.clone();
            if let Some(setup) = setup {
                let status = setup(case, shown_index);
                if self.halted(cell) {
                    return;
                }
                if status != Status::Continue {
                    self.raise_failure(cell, Failure::Setup);
                    if self.halted(cell) {
                        return;
                    }
                    // Body skipped; reconcile with the previous directive.
                    self.advance(cell, true);
                    return;
                }
            }
        }

        let repeat_count = {
            let mut state = cell.borrow_mut();
            state.case_failed_before = state.case_failed;
            state.case_repeat_count
        };

        tracing::debug!(
            case = case.description(),
            attempt = repeat_count,
            "invoking case body"
        );
        let control = match body {
            CaseBody::Plain(action) => {
                action();
                Control::done()
            }
            CaseBody::Controlled(action) => action(),
            CaseBody::Counted(action) => action(repeat_count),
        };
        if self.halted(cell) {
            return;
        }
        {
            let mut state = cell.borrow_mut();
            state.case_control = control;
            state.case_repeat_count += 1;
        }

        if let Some(timeout) = control.timeout() {
            // At most one timeout may be outstanding.
            let stale = cell.borrow_mut().timeout_handle.take();
            if let Some(stale) = stale {
                self.inner.scheduler.cancel(stale);
            }
            let harness = self.clone();
            let handle = self
                .inner
                .scheduler
                .post_after(Box::new(move || harness.timeout_fired()), timeout);
            cell.borrow_mut().timeout_handle = Some(handle);
            tracing::debug!(case = case.description(), ?timeout, "case in flight");
        } else {
            self.advance(cell, true);
        }
    }

    /// Timer stimulus for an in-flight case. Idempotent against a handle
    /// already cleared by the done signal.
    fn timeout_fired(&self) {
        let guard = self.inner.state.lock();
        let cell = &*guard;
        let outstanding = {
            let mut state = cell.borrow_mut();
            if state.phase != Phase::Running {
                return;
            }
            state.timeout_handle.take().is_some()
        };
        if outstanding {
            self.raise_failure(cell, Failure::Timeout);
            if self.halted(cell) {
                return;
            }
            self.advance(cell, true);
        }
    }

    /// Transition after a case attempt: pass accounting, teardown, repeat
    /// reconciliation, and the next step post.
    fn advance(&self, cell: &StateCell, run_teardown: bool) {
        {
            let mut state = cell.borrow_mut();
            if state.case_failed_before == state.case_failed {
                state.case_passed += 1;
            }
        }

        let teardown = {
            let state = cell.borrow();
            if run_teardown && state.case_control.repeat() != Repeat::CaseOnly {
                state.active.case_teardown.clone()
            } else {
                None
            }
        };
        if let Some(teardown) = teardown {
            let (case, passed, failed, reason) = {
                let state = cell.borrow();
                let reason = if state.case_failed > 0 {
                    Failure::Cases
                } else {
                    Failure::None
                };
                (
                    state.cases[state.index].clone(),
                    state.case_passed,
                    state.case_failed,
                    reason,
                )
            };
            let status = teardown(&case, passed, failed, reason);
            if self.halted(cell) {
                return;
            }
            if status != Status::Continue {
                self.raise_failure(cell, Failure::Teardown);
                if self.halted(cell) {
                    return;
                }
            }
        }

        {
            let mut state = cell.borrow_mut();
            let state = &mut *state;
            if state.case_control.repeat() == Repeat::NoRepeat {
                if state.case_failed > 0 {
                    state.test_failed += 1;
                } else {
                    state.test_passed += 1;
                }
                // The attempted-case index advances only here, and only
                // for cases whose setup/body cycle ran.
                let attempted = !state.cases[state.index].is_empty();
                if attempted {
                    state.index_of_case += 1;
                }
                state.case_control = Control::done();
                state.index += 1;
                state.case_passed = 0;
                state.case_failed = 0;
                state.case_failed_before = 0;
                state.case_repeat_count = 0;
            }
        }

        self.post_step();
    }

    /// The registry is exhausted: report and halt.
    fn exhausted(&self, cell: &StateCell) {
        let (teardown, passed, failed) = {
            let state = cell.borrow();
            (
                state.active.test_teardown.clone(),
                state.test_passed,
                state.test_failed,
            )
        };
        let reason = if failed > 0 {
            Failure::Cases
        } else {
            Failure::None
        };
        if let Some(teardown) = teardown {
            teardown(passed, failed, reason);
        }
        self.halt(
            cell,
            Report {
                passed,
                failed,
                reason,
            },
        );
    }

    /// Central failure sink. The teardown escalation is explicitly bounded:
    /// one case-teardown attempt, one re-raise on its failure, and the
    /// active teardown slot is cleared by the attempt either way.
    fn raise_failure(&self, cell: &StateCell, reason: Failure) {
        let case = {
            let mut state = cell.borrow_mut();
            state.case_failed += 1;
            state.cases[state.index].clone()
        };
        tracing::warn!(case = case.description(), %reason, "failure raised");

        // No failure handler means the failure is non-recoverable.
        let handler = cell.borrow().active.case_failure.clone();
        let status = match handler {
            Some(handler) => handler(&case, reason),
            None => Status::Abort,
        };
        if self.halted(cell) {
            return;
        }

        if status != Status::Continue || reason == Failure::Setup {
            // A teardown failure never re-attempts teardown.
            if reason != Failure::Teardown {
                let teardown = cell.borrow_mut().active.case_teardown.take();
                if let Some(teardown) = teardown {
                    let (passed, failed) = {
                        let state = cell.borrow();
                        (state.case_passed, state.case_failed)
                    };
                    let teardown_status = teardown(&case, passed, failed, reason);
                    if self.halted(cell) {
                        return;
                    }
                    if teardown_status != Status::Continue {
                        cell.borrow_mut().case_failed += 1;
                        let handler = cell.borrow().active.case_failure.clone();
                        let escalated = match handler {
                            Some(handler) => handler(&case, Failure::Teardown),
                            None => Status::Abort,
                        };
                        if self.halted(cell) {
                            return;
                        }
                        if escalated != Status::Continue {
                            self.abort(cell, Failure::Teardown);
                            return;
                        }
                    }
                }
            }
        }

        if status != Status::Continue {
            self.abort(cell, reason);
        }
    }

    /// Non-recoverable escalation: commit the case as failed, run test
    /// teardown with current counts, and halt.
    fn abort(&self, cell: &StateCell, reason: Failure) {
        let (teardown, passed, failed) = {
            let mut state = cell.borrow_mut();
            state.test_failed += 1;
            (
                state.active.test_teardown.clone(),
                state.test_passed,
                state.test_failed,
            )
        };
        if let Some(teardown) = teardown {
            teardown(passed, failed, reason);
        }
        self.halt(
            cell,
            Report {
                passed,
                failed,
                reason,
            },
        );
    }

    /// Enter the terminal state: cancel any outstanding timeout, record the
    /// report, and fire the completion hook. Nothing is scheduled past this
    /// point; stale posted turns observe the phase and return. Idempotent,
    /// since a handler invoked on the way here may itself have aborted.
    fn halt(&self, cell: &StateCell, report: Report) {
        let completion = {
            let mut state = cell.borrow_mut();
            if state.phase == Phase::Halted {
                return;
            }
            if let Some(handle) = state.timeout_handle.take() {
                self.inner.scheduler.cancel(handle);
            }
            state.phase = Phase::Halted;
            state.report = Some(report);
            tracing::info!(
                run = ?state.run_id,
                passed = report.passed,
                failed = report.failed,
                reason = %report.reason,
                "run halted"
            );
            state.completion.take()
        };
        if let Some(completion) = completion {
            completion(report);
        }
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        f.debug_struct("Harness")
            .field("phase", &state.phase)
            .field("run_id", &state.run_id)
            .field("cases", &state.cases.len())
            .field("index", &state.index)
            .finish_non_exhaustive()
    }
}
