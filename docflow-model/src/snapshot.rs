use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable deep copy of a value, handed to hooks for read-only access
/// to pre-mutation state.
///
/// The copy is taken once, at construction. Later mutation of the source, or
/// of any value a hook returns, is never visible through the snapshot. Clones
/// share the same frozen copy.
pub struct PureSnapshot<T>(Arc<T>);

impl<T: Clone> PureSnapshot<T> {
    /// Takes a deep copy of `value`.
    pub fn of(value: &T) -> Self {
        Self(Arc::new(value.clone()))
    }

    /// Returns an owned, mutable copy of the frozen value.
    pub fn to_owned_value(&self) -> T {
        T::clone(&self.0)
    }
}

impl<T> PureSnapshot<T> {
    /// Freezes an owned value without copying it again.
    pub fn freeze(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl<T> Clone for PureSnapshot<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for PureSnapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> AsRef<T> for PureSnapshot<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for PureSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PureSnapshot").field(&self.0).finish()
    }
}

impl<T: PartialEq> PartialEq<T> for PureSnapshot<T> {
    fn eq(&self, other: &T) -> bool {
        *self.0 == *other
    }
}

impl<T: PartialEq> PartialEq for PureSnapshot<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl<T: Serialize> Serialize for PureSnapshot<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
