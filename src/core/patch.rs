//! Three-state attribute patches
//!
//! Every option struct in the crate (global, appender, logger) is a set of
//! [`Patch`] fields. Applying a patch to a local override slot:
//!
//! - [`Patch::Keep`] leaves the slot alone (local or inherited value stays),
//! - [`Patch::Clear`] removes the local override, so the value falls back to
//!   the parent logger or to the hard default,
//! - [`Patch::Set`] stores a new local value.
//!
//! When deserialized (see [`crate::core::config`]), an absent key is `Keep`,
//! `null` is `Clear` and any other value is `Set`.

use serde::{Deserialize, Deserializer};

#[derive(Debug, PartialEq, Eq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    /// Apply this patch to a local override slot.
    pub fn apply(self, target: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *target = None,
            Patch::Set(value) => *target = Some(value),
        }
    }

    #[inline]
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T: Clone> Clone for Patch<T> {
    fn clone(&self) -> Self {
        match self {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(value) => Patch::Set(value.clone()),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}
