//! Result of a single-record conditional write.

/// Outcome of an atomic "update one record if it matches" call.
///
/// `NoMatch` is ambiguous on its own: the record may be absent, already in the
/// target state, or in a state that forbids the transition. Callers re-read
/// and classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The condition matched and the update was applied; carries the record
    /// as it is after the write.
    Applied(T),
    /// Nothing matched the condition.
    NoMatch,
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            Self::Applied(value) => WriteOutcome::Applied(f(value)),
            Self::NoMatch => WriteOutcome::NoMatch,
        }
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::NoMatch => None,
        }
    }
}

impl<T> From<Option<T>> for WriteOutcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Applied(value),
            None => Self::NoMatch,
        }
    }
}
