//! Entity trait: identity that survives state changes.

/// A record addressed by a stable key.
///
/// Stores use the key to locate the single record a conditional write
/// applies to.
pub trait Entity {
    /// Strongly-typed entity key.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity key.
    fn id(&self) -> &Self::Id;
}
