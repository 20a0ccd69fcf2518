//! Declare error type for cost-model

use thiserror::Error;

/// An error returned while parsing or applying programmable cost functions.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The PCF source expression could not be parsed.
    #[error("PCF parse error at byte {pos}: {message}")]
    PcfParseError {
        /// Byte offset into the source expression at which parsing failed.
        pos: usize,
        /// Human-readable description of the problem.
        message: String,
    },
}
