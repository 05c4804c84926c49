//! Engine configuration.

/// When snapshot loads during persist lock the rows they read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PessimisticValidation {
    /// Always select the snapshot `for update`.
    Always,
    /// Never lock while validating.
    Never,
    /// Lock only when the database cannot report batch update counts.
    Auto,
}

/// Configuration for an [`crate::Environment`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of OR'ed key conditions in one snapshot query.
    pub max_batch_conditions: usize,

    /// Whether query batches may be combined into one round trip when the
    /// database supports multiple result sets.
    pub use_multiple_result_sets: bool,

    /// Seconds to wait for row locks when the database supports
    /// `for update wait N` (`None` blocks without a bound).
    pub lock_wait_seconds: Option<u32>,

    /// Row locking policy for the load-and-validate phase.
    pub pessimistic_validation: PessimisticValidation,

    /// Whether persist calls hand audit information to the auditor.
    pub audit_enabled: bool,

    /// Initial autocommit mode of new contexts.
    pub autocommit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_conditions: 500,
            use_multiple_result_sets: true,
            lock_wait_seconds: Some(10),
            pessimistic_validation: PessimisticValidation::Auto,
            audit_enabled: true,
            autocommit: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of key conditions per snapshot query.
    #[must_use]
    pub const fn max_batch_conditions(mut self, value: usize) -> Self {
        self.max_batch_conditions = value;
        self
    }

    /// Sets whether query batches may use multiple result sets.
    #[must_use]
    pub const fn use_multiple_result_sets(mut self, value: bool) -> Self {
        self.use_multiple_result_sets = value;
        self
    }

    /// Sets the row lock wait.
    #[must_use]
    pub const fn lock_wait_seconds(mut self, value: Option<u32>) -> Self {
        self.lock_wait_seconds = value;
        self
    }

    /// Sets the validation locking policy.
    #[must_use]
    pub const fn pessimistic_validation(mut self, value: PessimisticValidation) -> Self {
        self.pessimistic_validation = value;
        self
    }

    /// Sets whether auditing is enabled.
    #[must_use]
    pub const fn audit_enabled(mut self, value: bool) -> Self {
        self.audit_enabled = value;
        self
    }

    /// Sets the initial autocommit mode of new contexts.
    #[must_use]
    pub const fn autocommit(mut self, value: bool) -> Self {
        self.autocommit = value;
        self
    }
}
