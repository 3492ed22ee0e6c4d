//! Validation adapter over the `validator` rule engine.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Serialize;
use validator::{Validate, ValidationErrorsKind};

/// Field name → message. Empty means every rule passed.
///
/// Nested sections are flattened: a failing `name` inside the body section is
/// reported under `"name"`. The message is the rule engine's own rendering,
/// which is the rule's custom `message` when one is set.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Adds a message, appending to any message already held for `field`.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        match self.0.entry(field.into()) {
            btree_map::Entry::Occupied(mut held) => {
                let held = held.get_mut();
                held.push_str("; ");
                held.push_str(&message.into());
            }
            btree_map::Entry::Vacant(slot) => {
                slot.insert(message.into());
            }
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    fn collect(&mut self, errors: &validator::ValidationErrors) {
        for (field, kind) in errors.errors() {
            match kind {
                ValidationErrorsKind::Field(failures) => {
                    for failure in failures {
                        self.insert(field.to_string(), failure.to_string());
                    }
                }
                ValidationErrorsKind::Struct(nested) => self.collect(nested),
                ValidationErrorsKind::List(items) => {
                    for nested in items.values() {
                        self.collect(nested);
                    }
                }
            }
        }
    }
}

impl From<&validator::ValidationErrors> for ValidationErrors {
    fn from(errors: &validator::ValidationErrors) -> Self {
        let mut flat = Self::new();
        flat.collect(errors);
        flat
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Runs the rules of `instance`. Never fails: an invalid instance is data.
pub fn validate<S: Validate>(instance: &S) -> ValidationErrors {
    match instance.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => ValidationErrors::from(&errors),
    }
}
