//! Handler slots, statuses, failure reasons, and the default handler table.
//!
//! Five handler slots exist, two at test scope and three at case scope:
//!
//! | Slot          | Signature                          |
//! |---------------|------------------------------------|
//! | test setup    | `(case_count) -> Status`           |
//! | test teardown | `(passed, failed, reason) -> Status` |
//! | case setup    | `(&Case, index) -> Status`         |
//! | case teardown | `(&Case, passed, failed, reason) -> Status` |
//! | case failure  | `(&Case, reason) -> Status`        |
//!
//! Each slot resolves per case through [`Override`] against the configured
//! [`Defaults`]. An absent handler behaves as [`Status::Continue`], except
//! the failure slot where absence escalates as [`Status::Abort`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::case::Case;

// ============================================================================
// Status and Failure Reason
// ============================================================================

/// A handler's return signal.
///
/// Anything other than `Continue` is treated uniformly as an abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Status {
    /// Proceed normally.
    #[default]
    Continue,
    /// Stop: escalate through the failure protocol.
    Abort,
}

/// Why a failure was raised. Threaded through every handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Failure {
    /// No failure occurred.
    #[default]
    None,
    /// A setup handler did not continue.
    Setup,
    /// A teardown handler did not continue.
    Teardown,
    /// A case timed out before its done signal arrived.
    Timeout,
    /// The case had no body of any kind.
    EmptyCase,
    /// Aggregate: at least one case failure occurred.
    Cases,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Setup => "setup failed",
            Self::Teardown => "teardown failed",
            Self::Timeout => "timed out",
            Self::EmptyCase => "empty case",
            Self::Cases => "cases failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Handler Slots
// ============================================================================

/// Test-setup handler: receives the case count.
pub type TestSetupFn = Arc<dyn Fn(usize) -> Status + Send + Sync>;

/// Test-teardown handler: receives final passed/failed counts and the
/// aggregated reason. Its return value is observational; the harness halts
/// regardless.
pub type TestTeardownFn = Arc<dyn Fn(usize, usize, Failure) -> Status + Send + Sync>;

/// Case-setup handler: receives the case and its externally visible index.
pub type CaseSetupFn = Arc<dyn Fn(&Case, usize) -> Status + Send + Sync>;

/// Case-teardown handler: receives the case, cumulative pass/fail counts
/// for the case, and the reason.
pub type CaseTeardownFn = Arc<dyn Fn(&Case, usize, usize, Failure) -> Status + Send + Sync>;

/// Case-failure handler: receives the case and the failure reason.
pub type CaseFailureFn = Arc<dyn Fn(&Case, Failure) -> Status + Send + Sync>;

// ============================================================================
// Override
// ============================================================================

/// A per-case (or per-specification) handler override for one slot.
#[derive(Clone, Default)]
pub enum Override<H> {
    /// Use the configured default for this slot.
    #[default]
    Default,
    /// Use no handler at all, even if a default is configured.
    Ignore,
    /// Use this handler instead of the default.
    Custom(H),
}

impl<H: Clone> Override<H> {
    /// Resolve against the configured default for the slot.
    pub fn resolve(&self, default: Option<&H>) -> Option<H> {
        match self {
            Self::Default => default.cloned(),
            Self::Ignore => None,
            Self::Custom(handler) => Some(handler.clone()),
        }
    }
}

impl<H> std::fmt::Debug for Override<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Ignore => f.write_str("Ignore"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

// ============================================================================
// Default Handler Table
// ============================================================================

/// The configured default handler table, one optional handler per slot.
#[derive(Clone, Default)]
pub struct Defaults {
    pub(crate) test_setup: Option<TestSetupFn>,
    pub(crate) test_teardown: Option<TestTeardownFn>,
    pub(crate) case_setup: Option<CaseSetupFn>,
    pub(crate) case_teardown: Option<CaseTeardownFn>,
    pub(crate) case_failure: Option<CaseFailureFn>,
}

impl Defaults {
    /// An empty table: no handler in any slot.
    ///
    /// Note that with no failure handler, any raised failure aborts the run.
    pub fn silent() -> Self {
        Self::default()
    }

    /// A table that logs every hook through `tracing` and always continues.
    pub fn verbose() -> Self {
        Self::silent()
            .on_test_setup(|count| {
                tracing::info!(cases = count, "test setup");
                Status::Continue
            })
            .on_test_teardown(|passed, failed, reason| {
                tracing::info!(passed, failed, reason = %reason, "test teardown");
                Status::Continue
            })
            .on_case_setup(|case, index| {
                tracing::info!(case = case.description(), index, "case setup");
                Status::Continue
            })
            .on_case_teardown(|case, passed, failed, reason| {
                tracing::info!(
                    case = case.description(),
                    passed,
                    failed,
                    reason = %reason,
                    "case teardown"
                );
                Status::Continue
            })
            .on_case_failure(|case, reason| {
                tracing::warn!(case = case.description(), reason = %reason, "case failure");
                Status::Continue
            })
    }

    /// Set the default test-setup handler.
    pub fn on_test_setup(mut self, handler: impl Fn(usize) -> Status + Send + Sync + 'static) -> Self {
        self.test_setup = Some(Arc::new(handler));
        self
    }

    /// Set the default test-teardown handler.
    pub fn on_test_teardown(
        mut self,
        handler: impl Fn(usize, usize, Failure) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.test_teardown = Some(Arc::new(handler));
        self
    }

    /// Set the default case-setup handler.
    pub fn on_case_setup(
        mut self,
        handler: impl Fn(&Case, usize) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.case_setup = Some(Arc::new(handler));
        self
    }

    /// Set the default case-teardown handler.
    pub fn on_case_teardown(
        mut self,
        handler: impl Fn(&Case, usize, usize, Failure) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.case_teardown = Some(Arc::new(handler));
        self
    }

    /// Set the default case-failure handler.
    pub fn on_case_failure(
        mut self,
        handler: impl Fn(&Case, Failure) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.case_failure = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for Defaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Defaults")
            .field("test_setup", &self.test_setup.is_some())
            .field("test_teardown", &self.test_teardown.is_some())
            .field("case_setup", &self.case_setup.is_some())
            .field("case_teardown", &self.case_teardown.is_some())
            .field("case_failure", &self.case_failure.is_some())
            .finish()
    }
}
