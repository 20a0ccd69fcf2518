//! Declare error type for advantage-engine

use thiserror::Error;
use tor_error::{ErrorKind, HasKind, InternalError};

/// An error returned while constructing a [`crate::path_selection::PathSelection`]
/// or running an engine over one.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Every eligible entry is related (family/subnet/AS) to every eligible
    /// exit, so no valid (entry, exit) pair exists at all.
    #[error("every eligible entry is related to every eligible exit")]
    EmptyEntryMass,

    /// The geo-clustered variant pruned away every eligible entry cluster.
    #[error("no reachable entry cluster remains after latitude-based pruning")]
    NoReachableEntry,

    /// The bandwidth-redistribution variant was given a target fraction
    /// outside `[0, 1]`.
    #[error("bandwidth redistribution target fraction {0} is outside [0, 1]")]
    InvalidBandwidthFraction(f64),

    /// A probability computed by an engine was not finite. Construction-time
    /// inputs must be rejected before this point; reaching it indicates a
    /// programming error upstream.
    #[error("non-finite probability encountered: {0}")]
    NonFiniteProbability(#[from] InternalError),

    /// An index handed to the optimiser or greedy selector was out of
    /// range for the network snapshot it was computed against. Always a
    /// programming error, never a recoverable condition.
    #[error("index out of range: {0}")]
    OutOfRangeIndex(#[from] OutOfRangeIndexInner),
}

/// Wrapper so `#[from]` can attach to a plain `InternalError` for the
/// out-of-range-index case too, while keeping a distinguishable variant.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct OutOfRangeIndexInner(#[from] pub InternalError);

impl HasKind for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NonFiniteProbability(_) | Error::OutOfRangeIndex(_) => {
                ErrorKind::Internal
            }
            Error::EmptyEntryMass | Error::NoReachableEntry | Error::InvalidBandwidthFraction(_) => {
                ErrorKind::InvalidConfig
            }
        }
    }
}
