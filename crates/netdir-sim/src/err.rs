//! Declare error type for netdir-sim

use thiserror::Error;

/// An error returned while building or querying a [`crate::NetworkSnapshot`].
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The inbound relay records were inconsistent (negative bandwidth,
    /// duplicate fingerprint, a `via` entry referring to an unknown index,
    /// and so on).
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A role-weight multiplier table entry was missing for one of the
    /// eleven (role, flag-subset) keys.
    #[error("missing role-weight multiplier for {0:?}")]
    MissingMultiplier(crate::weight::MultiplierKey),
}
