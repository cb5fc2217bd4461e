use thiserror::Error;

/// Failures reported by [`FreezableMap`](crate::FreezableMap).
///
/// `Frozen` and `Unhashable` are state violations: the operation is not
/// permitted in the map's current state and nothing was changed.
/// `MissingHash` indicates a bug in this crate, not a caller mistake.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A mutation was attempted while the map is frozen.
    #[error("frozen map cannot be changed; thaw to proceed")]
    Frozen,

    /// A hash was requested while the map is thawed.
    #[error("thawed map does not hash; freeze to proceed")]
    Unhashable,

    /// `remove` was called with a key that is not present.
    #[error("key not found")]
    KeyNotFound,

    /// The map is frozen but carries no cached hash.
    #[error("map is frozen but has no cached hash; this is a bug")]
    MissingHash,
}

impl Error {
    /// True for errors caused by calling an operation in the wrong state.
    pub fn is_state_violation(&self) -> bool {
        matches!(self, Error::Frozen | Error::Unhashable)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
