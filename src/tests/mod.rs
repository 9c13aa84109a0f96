//! Tests for the harness state machine.
//!
//! ## Test Organization
//!
//! - `common`: the event-recording probe and registry-driving helpers
//! - `basic`: clean runs, ordering, run guards, and the completion hook
//! - `repeat`: repeat-policy reconciliation and the attempted-case index
//! - `timeout`: in-flight cases, the done signal, and timeout races
//! - `failure`: the escalation protocol and its bounds
//!
//! All tests drive a [`Harness`](crate::Harness) over the virtual-time
//! [`LoopScheduler`](crate::LoopScheduler) and assert on the exact handler
//! invocation sequence recorded by the probe.

mod common;

mod failure;
