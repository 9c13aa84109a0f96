//! Case registry types: bodies, repeat policies, and control directives.
//!
//! A `Case` is one unit in the ordered registry the harness walks. Its body
//! is exactly one of three kinds, chosen at construction time and dispatched
//! by matching on the tag:
//!
//! - [`CaseBody::Plain`]: a no-argument action with no directive
//! - [`CaseBody::Controlled`]: an action returning a [`Control`] directive
//! - [`CaseBody::Counted`]: an action parameterized by the repeat counter,
//!   returning a [`Control`] directive
//!
//! A case with no body at all is *empty* and produces exactly one
//! empty-case failure when reached.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::handlers::{CaseFailureFn, CaseSetupFn, CaseTeardownFn, Override};

// ============================================================================
// Repeat Policy
// ============================================================================

/// Repeat policy carried by a control directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Repeat {
    /// Commit the case outcome and advance to the next case.
    #[default]
    NoRepeat,
    /// Re-invoke only the case body; setup and teardown are suppressed
    /// until the policy changes.
    CaseOnly,
    /// Re-invoke the full case cycle — setup, body, and teardown — on
    /// every scheduling turn until the policy changes.
    All,
}

// ============================================================================
// Control Directive
// ============================================================================

/// The control directive a case body returns.
///
/// Combines a [`Repeat`] policy with an optional timeout. `None` is the
/// "completes synchronously" sentinel and is distinct from every valid
/// duration, including zero: a zero timeout schedules a completion that
/// fires on the next turn, while `None` advances within the same turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Control {
    repeat: Repeat,
    timeout: Option<Duration>,
}

impl Control {
    /// Create a directive from its parts.
    pub const fn new(repeat: Repeat, timeout: Option<Duration>) -> Self {
        Self { repeat, timeout }
    }

    /// The default directive: no repeat, no timeout.
    pub const fn done() -> Self {
        Self::new(Repeat::NoRepeat, None)
    }

    /// Repeat the full case cycle on the next turn.
    pub const fn repeat_all() -> Self {
        Self::new(Repeat::All, None)
    }

    /// Repeat only the case body on the next turn.
    pub const fn repeat_case() -> Self {
        Self::new(Repeat::CaseOnly, None)
    }

    /// Suspend the case until an external done signal or this timeout.
    pub const fn await_timeout(timeout: Duration) -> Self {
        Self::new(Repeat::NoRepeat, Some(timeout))
    }

    /// Replace the repeat policy.
    pub const fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    /// Replace the timeout.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The repeat policy.
    pub const fn repeat(&self) -> Repeat {
        self.repeat
    }

    /// The timeout, or `None` for synchronous completion.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

// ============================================================================
// Case Body
// ============================================================================

/// A plain no-argument case action.
pub type PlainFn = Arc<dyn Fn() + Send + Sync>;

/// A case action returning a control directive.
pub type ControlFn = Arc<dyn Fn() -> Control + Send + Sync>;

/// A case action parameterized by the repeat counter, returning a control
/// directive. The counter counts body invocations, not passes.
pub type CountedFn = Arc<dyn Fn(usize) -> Control + Send + Sync>;

/// The body of a case — exactly one of three kinds.
#[derive(Clone)]
pub enum CaseBody {
    /// A plain action; yields the default directive (no repeat, no timeout).
    Plain(PlainFn),
    /// An action returning a fresh directive per invocation.
    Controlled(ControlFn),
    /// An action observing the repeat counter, returning a fresh directive.
    Counted(CountedFn),
}

impl std::fmt::Debug for CaseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain"),
            Self::Controlled(_) => f.write_str("Controlled"),
            Self::Counted(_) => f.write_str("Counted"),
        }
    }
}

// ============================================================================
// Case
// ============================================================================

/// One test unit in the registry.
///
/// Carries a description (its identity in reports and logs), an optional
/// body, and optional overrides for the case-scoped handler slots. Overrides
/// default to [`Override::Default`], resolving to the configured default
/// table at run time.
#[derive(Clone)]
pub struct Case {
    description: Cow<'static, str>,
    body: Option<CaseBody>,
    setup: Override<CaseSetupFn>,
    teardown: Override<CaseTeardownFn>,
    failure: Override<CaseFailureFn>,
}

impl Case {
    fn with_body(description: impl Into<Cow<'static, str>>, body: Option<CaseBody>) -> Self {
        Self {
            description: description.into(),
            body,
            setup: Override::Default,
            teardown: Override::Default,
            failure: Override::Default,
        }
    }

    /// Create a case with a plain action body.
    pub fn new(
        description: impl Into<Cow<'static, str>>,
        body: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::with_body(description, Some(CaseBody::Plain(Arc::new(body))))
    }

    /// Create a case whose body returns a control directive.
    pub fn controlled(
        description: impl Into<Cow<'static, str>>,
        body: impl Fn() -> Control + Send + Sync + 'static,
    ) -> Self {
        Self::with_body(description, Some(CaseBody::Controlled(Arc::new(body))))
    }

    /// Create a case whose body observes the repeat counter.
    pub fn counted(
        description: impl Into<Cow<'static, str>>,
        body: impl Fn(usize) -> Control + Send + Sync + 'static,
    ) -> Self {
        Self::with_body(description, Some(CaseBody::Counted(Arc::new(body))))
    }

    /// Create a case with no body. Reaching it raises exactly one
    /// empty-case failure.
    pub fn pending(description: impl Into<Cow<'static, str>>) -> Self {
        Self::with_body(description, None)
    }

    /// Override the case-setup handler.
    pub fn with_setup(
        mut self,
        handler: impl Fn(&Case, usize) -> crate::Status + Send + Sync + 'static,
    ) -> Self {
        self.setup = Override::Custom(Arc::new(handler));
        self
    }

    /// Override the case-teardown handler.
    pub fn with_teardown(
        mut self,
        handler: impl Fn(&Case, usize, usize, crate::Failure) -> crate::Status
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.teardown = Override::Custom(Arc::new(handler));
        self
    }

    /// Override the case-failure handler.
    pub fn with_failure(
        mut self,
        handler: impl Fn(&Case, crate::Failure) -> crate::Status + Send + Sync + 'static,
    ) -> Self {
        self.failure = Override::Custom(Arc::new(handler));
        self
    }

    /// Suppress the default case-setup handler for this case.
    pub fn ignore_setup(mut self) -> Self {
        self.setup = Override::Ignore;
        self
    }

    /// Suppress the default case-teardown handler for this case.
    pub fn ignore_teardown(mut self) -> Self {
        self.teardown = Override::Ignore;
        self
    }

    /// Suppress the default case-failure handler for this case. With no
    /// failure handler, any failure aborts the run.
    pub fn ignore_failure(mut self) -> Self {
        self.failure = Override::Ignore;
        self
    }

    /// The case description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The case body, if any.
    pub fn body(&self) -> Option<&CaseBody> {
        self.body.as_ref()
    }

    /// Whether the case has no body of any kind.
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// The setup handler override.
    pub(crate) fn setup_override(&self) -> &Override<CaseSetupFn> {
        &self.setup
    }

    /// The teardown handler override.
    pub(crate) fn teardown_override(&self) -> &Override<CaseTeardownFn> {
        &self.teardown
    }

    /// The failure handler override.
    pub(crate) fn failure_override(&self) -> &Override<CaseFailureFn> {
        &self.failure
    }
}

impl std::fmt::Debug for Case {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Case")
            .field("description", &self.description)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}
