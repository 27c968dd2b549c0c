//! Tri-state field update.

use chrono::{DateTime, Utc};

use crate::error::ErrorCode;

/// A column update that distinguishes "leave alone" from "set to NULL".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    /// Resolve against the current value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Unchanged => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Unchanged => Patch::Unchanged,
            Patch::Clear => Patch::Clear,
            Patch::Set(v) => Patch::Set(f(v)),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

impl From<String> for Patch<String> {
    fn from(value: String) -> Self {
        Patch::Set(value)
    }
}

impl From<&str> for Patch<String> {
    fn from(value: &str) -> Self {
        Patch::Set(value.to_string())
    }
}

impl From<ErrorCode> for Patch<ErrorCode> {
    fn from(value: ErrorCode) -> Self {
        Patch::Set(value)
    }
}

impl From<DateTime<Utc>> for Patch<DateTime<Utc>> {
    fn from(value: DateTime<Utc>) -> Self {
        Patch::Set(value)
    }
}
