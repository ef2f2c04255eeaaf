//! Invariant checking framework.
//!
//! Invariants are properties of client state that must hold at every
//! observation point, no matter which operations ran or in what order the
//! broker answered them. Simulation drivers capture a [`SystemSnapshot`]
//! after each step and run it through an [`InvariantRegistry`]; a failed
//! check names the invariant and the offending state.
//!
//! The checks themselves live in [`checks`]; this module provides the
//! trait, the violation type, and the registry.

pub mod checks;
pub mod snapshot;

pub use checks::{
    ActiveConversationRead, MessageIdUnique, OptimisticIdUnique, StatusCoherence,
    TypingExcludesSelf,
};
pub use snapshot::{ClientSnapshot, ConversationSnapshot, MessageFacts, SystemSnapshot};

/// Result of a single invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A violated invariant, with enough context to locate the bad state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the invariant that failed.
    pub invariant: &'static str,
    /// What was wrong, including the ids involved.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of client state checkable against a snapshot.
pub trait Invariant: Send + Sync {
    /// Stable name used in violation reports.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`Violation`] describing the first offending state found.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// A set of invariants checked together.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the standard invariant set.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(StatusCoherence);
        registry.add(OptimisticIdUnique);
        registry.add(MessageIdUnique);
        registry.add(ActiveConversationRead);
        registry.add(TypingExcludesSelf);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns the full list of violations when any check fails.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = self
            .invariants
            .iter()
            .filter_map(|invariant| invariant.check(state).err())
            .collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants and panic on any violation.
    ///
    /// `context` identifies the observation point (operation index, phase
    /// name) in the panic message.
    ///
    /// # Panics
    ///
    /// Panics when any invariant is violated.
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        let violations = self.check_all(state).err().unwrap_or_default();
        assert!(
            violations.is_empty(),
            "{} invariant violation(s) at {context}: {}",
            violations.len(),
            violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
        );
    }

    /// Number of registered invariants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// True when no invariants are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 5);
        assert!(!registry.is_empty());
    }

    #[test]
    fn empty_snapshot_passes_all() {
        let registry = InvariantRegistry::standard();
        let snapshot = SystemSnapshot::empty();
        assert!(registry.check_all(&snapshot).is_ok());
    }

    #[test]
    fn check_all_collects_every_violation() {
        struct AlwaysFails(&'static str);
        impl Invariant for AlwaysFails {
            fn name(&self) -> &'static str {
                self.0
            }
            fn check(&self, _state: &SystemSnapshot) -> InvariantResult {
                Err(Violation { invariant: self.0, message: "boom".to_string() })
            }
        }

        let mut registry = InvariantRegistry::new();
        registry.add(AlwaysFails("first"));
        registry.add(AlwaysFails("second"));

        let violations = registry.check_all(&SystemSnapshot::empty()).unwrap_err();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].invariant, "first");
        assert_eq!(violations[1].invariant, "second");
    }

    #[test]
    #[should_panic(expected = "invariant violation(s) at step 3")]
    fn assert_all_panics_with_context() {
        struct AlwaysFails;
        impl Invariant for AlwaysFails {
            fn name(&self) -> &'static str {
                "always-fails"
            }
            fn check(&self, _state: &SystemSnapshot) -> InvariantResult {
                Err(Violation { invariant: "always-fails", message: "boom".to_string() })
            }
        }

        let mut registry = InvariantRegistry::new();
        registry.add(AlwaysFails);
        registry.assert_all(&SystemSnapshot::empty(), "step 3");
    }
}
