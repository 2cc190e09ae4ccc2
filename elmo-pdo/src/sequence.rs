//! Outcome accumulator for composite operations.

use tracing::debug;

use crate::config::CompositePolicy;
use crate::error::{BusError, SequenceError, StepFailure};

/// Records the outcome of each step of a composite operation.
///
/// Under [`CompositePolicy::BestEffort`] every step runs and all failures are kept,
/// the equivalent of OR-ing the step status codes. Under [`CompositePolicy::Strict`]
/// steps after the first failure are skipped.
#[derive(Debug)]
pub struct Sequence {
    operation: &'static str,
    policy: CompositePolicy,
    executed: Vec<&'static str>,
    failures: Vec<StepFailure>,
}

impl Sequence {
    pub fn new(operation: &'static str, policy: CompositePolicy) -> Self {
        Self {
            operation,
            policy,
            executed: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Runs `f` unless the policy says to stop, and records its outcome.
    pub fn step<F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        F: FnOnce() -> Result<(), BusError>,
    {
        if self.policy == CompositePolicy::Strict && !self.failures.is_empty() {
            debug!(operation = self.operation, step = name, "skipped after earlier failure");
            return self;
        }

        self.executed.push(name);
        if let Err(error) = f() {
            debug!(operation = self.operation, step = name, %error, "step failed");
            self.failures.push(StepFailure { step: name, error });
        }
        self
    }

    /// Like [`Sequence::step`] for a nested composite; each of its failures is kept.
    pub fn nested<F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        F: FnOnce() -> Result<(), SequenceError>,
    {
        if self.policy == CompositePolicy::Strict && !self.failures.is_empty() {
            return self;
        }

        self.executed.push(name);
        if let Err(nested) = f() {
            self.failures.extend(nested.failures);
        }
        self
    }

    /// Steps that ran, in order.
    pub fn executed(&self) -> &[&'static str] {
        &self.executed
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn finish(self) -> Result<(), SequenceError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(SequenceError {
                operation: self.operation,
                failures: self.failures,
            })
        }
    }
}
