//! Cooperative cancellation of a run.
//!
//! A [`CancellationToken`] is created by the caller, optionally wired to
//! Ctrl-C with [`CancellationToken::cancel_on_interrupt`], and passed into
//! the execution controller. The controller registers one callback per
//! submitted attempt and drops the registration once that attempt's wait
//! completes.

mod token;

pub use token::{CancelRegistration, CancellationToken};
