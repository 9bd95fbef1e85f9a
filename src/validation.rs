use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// Field-keyed validation failures. At most one message per field.
pub type ValidationErrors = BTreeMap<String, String>;

/// Request validation accumulator.
///
/// Create one per request with [`Validator::new`], run every check, then
/// inspect [`Validator::valid`]. Checks never short-circuit so the caller
/// sees every failing field at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when no errors have been recorded
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` under `field`, replacing any earlier message
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.insert(field.to_string(), message.to_string());
    }

    /// Record `message` under `field` only when `ok` is false
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }
}

/// True when `value` appears in `permitted`
pub fn permitted<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.iter().any(|candidate| candidate == value)
}

/// True when every element is distinct (case-sensitive for strings)
pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|value| seen.insert(value))
}
