//! Query text and unit-of-work outcome types

/// Opaque value object wrapping literal query text with positional
/// placeholders. The core performs no parsing; placeholder counts come from
/// the store driver's prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    text: String,
}

impl Query {
    /// Wrap literal query text
    pub fn new(text: impl Into<String>) -> Self {
        Query { text: text.into() }
    }

    /// The wrapped query text
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Result of a unit-of-work closure.
///
/// `Commit(value)` asks the session to commit and carries the closure's
/// result out of the transaction; `Rollback` asks for an explicit rollback.
/// A closure that fails with an error instead always triggers a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Commit the transaction and yield the value
    Commit(T),
    /// Roll the transaction back
    Rollback,
}

impl<T> Outcome<T> {
    /// Shorthand for `Outcome::Commit(value)`
    pub fn commit(value: T) -> Self {
        Outcome::Commit(value)
    }

    /// Check whether this outcome requests a rollback
    pub fn is_rollback(&self) -> bool {
        matches!(self, Outcome::Rollback)
    }

    /// The committed value, if any
    pub fn into_committed(self) -> Option<T> {
        match self {
            Outcome::Commit(value) => Some(value),
            Outcome::Rollback => None,
        }
    }
}
