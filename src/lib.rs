#![deny(missing_docs)]

//! Gauntlet — a sequential test-case harness for cooperative schedulers.
//!
//! # Design Goals
//!
//! Gauntlet is built for constrained, single-threaded environments where
//! tests run atop a cooperative event loop instead of an OS process model:
//!
//! - **One case at a time**: an ordered registry is driven to completion,
//!   one body invocation per scheduling turn
//! - **Overridable hooks**: setup/teardown/failure handlers resolve per
//!   case against a configured default table
//! - **Bounded escalation**: every failure funnels through a single policy
//!   point with an explicitly bounded teardown retry
//!
//! # Core Concepts
//!
//! - [`Case`]: one test unit — a body (one of three kinds) plus optional
//!   handler overrides
//! - [`Control`]: the repeat policy and optional timeout a body returns
//! - [`Scheduler`]: the external single-threaded event loop; [`LoopScheduler`]
//!   is the in-crate virtual-time implementation
//! - [`Harness`]: the orchestrator owning all run state
//!
//! The harness critical section is re-entrant: a body or handler may call
//! [`Harness::raise`] synchronously, the way an assertion hook would. Early
//! completion of an in-flight case is the exception — its timeout arms only
//! after the body returns, so completion is announced by posting a callback
//! that invokes [`Harness::signal_done`].

// Modules
pub mod case;
pub mod handlers;
pub mod harness;
mod macros;
pub mod scheduler;

// Re-exports for convenience
pub use case::{Case, CaseBody, Control, ControlFn, CountedFn, PlainFn, Repeat};
pub use handlers::{
    CaseFailureFn, CaseSetupFn, CaseTeardownFn, Defaults, Failure, Override, Status, TestSetupFn,
    TestTeardownFn,
};
pub use harness::{Harness, HarnessError, Phase, Report, RunId, Specification};
pub use scheduler::{Callback, CallbackHandle, LoopScheduler, Scheduler};

#[cfg(test)]
mod tests;
