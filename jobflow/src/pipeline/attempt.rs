//! Attempt accounting for preemptible-first execution.
//!
//! A run may submit up to `preemptible + standard` times. The first
//! `preemptible` submissions ask for revocable compute; the rest do not.

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// How many submissions of each kind a run may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttemptBudget {
    /// Attempts on preemptible compute, used first.
    pub preemptible: u32,
    /// Attempts on standard compute.
    pub standard: u32,
}

impl AttemptBudget {
    /// Creates a budget.
    #[must_use]
    pub const fn new(preemptible: u32, standard: u32) -> Self {
        Self {
            preemptible,
            standard,
        }
    }

    /// Reads the budget from a run configuration.
    #[must_use]
    pub const fn from_config(config: &RunConfig) -> Self {
        Self::new(config.pvm_attempts, config.attempts)
    }

    /// Total submissions allowed.
    #[must_use]
    pub const fn total(self) -> u32 {
        self.preemptible.saturating_add(self.standard)
    }

    /// Whether nothing may be submitted.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.total() == 0
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    /// Submit again.
    Retry,
    /// Stop; the error is not retriable.
    Fail,
    /// Stop; the budget is spent.
    Exhausted,
}

/// Tracks the current attempt of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    budget: AttemptBudget,
    /// Current attempt number (1-based).
    pub attempt: u32,
}

impl AttemptState {
    /// Starts at attempt 1.
    #[must_use]
    pub const fn new(budget: AttemptBudget) -> Self {
        Self { budget, attempt: 1 }
    }

    /// Whether the current attempt runs on preemptible compute.
    #[must_use]
    pub const fn is_preemptible(&self) -> bool {
        self.attempt <= self.budget.preemptible
    }

    /// Decides what follows a failure, advancing the attempt on retry.
    pub fn after_failure(&mut self, retriable: bool) -> AttemptDecision {
        if !retriable {
            return AttemptDecision::Fail;
        }
        if self.attempt < self.budget.total() {
            self.attempt += 1;
            AttemptDecision::Retry
        } else {
            AttemptDecision::Exhausted
        }
    }

    /// The budget being spent.
    #[must_use]
    pub const fn budget(&self) -> AttemptBudget {
        self.budget
    }
}
