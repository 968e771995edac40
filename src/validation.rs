//! Credential Validation
//!
//! Pure checks over raw form input, run before any store or hasher call.

use crate::models::RegisterInput;

use serde::ser::{Serialize, SerializeMap, Serializer};
use validator::Validate;

/// Ordered mapping from field name to a human-readable message.
///
/// An empty mapping means the input passed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    entries: Vec<(String, String)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field error, used for outcomes reported after validation
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    /// Set the message for `field`. Re-inserting keeps the original position.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        let message = message.into();
        match self.entries.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = message,
            None => self.entries.push((field, message)),
        }
    }

    fn insert_if_absent(&mut self, field: &str, message: impl Into<String>) {
        if !self.contains(field) {
            self.entries.push((field.to_string(), message.into()));
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, m)| m.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Field names in insertion order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, message) in &self.entries {
            map.serialize_entry(field, message)?;
        }
        map.end()
    }
}

/// Fields reported for a registration form, in display order
const REGISTER_FIELDS: [&str; 3] = ["name", "email", "password"];

/// Column widths of the `users` table
pub const NAME_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 255;

/// Validate a registration form.
///
/// Name and email are checked after trimming, so whitespace counts as
/// empty. Every check runs; the result lists each offending field once. A
/// confirmation mismatch is reported on `password` unless that field is
/// already missing.
pub fn validate_registration(input: &RegisterInput) -> ValidationErrors {
    let input = input.normalized();
    let mut errors = ValidationErrors::new();

    let report = input.validate().err();
    let field_errors = report.as_ref().map(|r| r.field_errors()).unwrap_or_default();

    for field in REGISTER_FIELDS {
        let message = field_errors
            .get(field)
            .and_then(|e| first_message(e))
            .or_else(|| too_long(&input, field));
        if let Some(message) = message {
            errors.insert(field, message);
        }
    }

    if let Some(message) = field_errors
        .get("password_confirmation")
        .and_then(|e| first_message(e))
    {
        errors.insert_if_absent("password", message);
    }

    errors
}

fn too_long(input: &RegisterInput, field: &str) -> Option<String> {
    let (value, max, label) = match field {
        "name" => (&input.name, NAME_MAX_LEN, "Name"),
        "email" => (&input.email, EMAIL_MAX_LEN, "Email"),
        _ => return None,
    };
    (value.chars().count() > max)
        .then(|| format!("{label} may not be greater than {max} characters."))
}

fn first_message(errors: &[validator::ValidationError]) -> Option<String> {
    errors
        .first()
        .map(|e| match &e.message {
            Some(message) => message.to_string(),
            None => e.code.to_string(),
        })
}
