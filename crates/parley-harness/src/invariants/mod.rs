//! Engine invariants checked after every simulated step.
//!
//! A check sees only an [`EngineSnapshot`] (ledger keys and statuses, typing
//! scope, timer count, and per-entry histories carried across steps), never
//! the engine itself, so the same checks run against live sessions and
//! recorded traces.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = EngineSnapshot::capture(0, &engine);
//! registry.check_all(&SystemSnapshot::single(snapshot))?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    IdentityUniqueness, PositionStability, StatusMonotonicity, TypingScopedToConversation,
};
pub use snapshot::{EngineSnapshot, EntrySnapshot, SystemSnapshot};

/// Outcome of one invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Invariant that failed.
    pub invariant: &'static str,
    /// What the snapshot showed.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property every snapshot must satisfy.
pub trait Invariant: Send + Sync {
    /// Short name used in violation reports.
    fn name(&self) -> &'static str;

    /// Check `state`, reporting the first offending entry.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Set of invariants run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger identity, status, position, and typing-scope checks.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(IdentityUniqueness);
        registry.add(StatusMonotonicity);
        registry.add(PositionStability);
        registry.add(TypingScopedToConversation);
        registry
    }

    /// Register another check.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.checks.push(Box::new(invariant));
    }

    /// Names of the registered checks, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|check| check.name())
    }

    /// Run every check and collect all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.checks.iter().filter_map(|check| check.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every check and panic with all violations, labelled with
    /// `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let Err(violations) = self.check_all(state) else { return };
        let report: Vec<String> = violations.iter().map(Violation::to_string).collect();
        panic!("invariants broken after {context}:\n  {}", report.join("\n  "));
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns true if no checks are registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
