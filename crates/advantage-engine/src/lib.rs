//! Anonymity-advantage engine: path-selection probability models, and
//! worst-case/precise advantage accumulators, for a fixed two-sender/
//! two-recipient onion-routing scenario.
//!
//! [`facade::AnonymityFacade`] is the intended entry point; the other
//! public modules are exposed for callers that want direct access to the
//! sweeps, the probability models, or the accumulator types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod err;
pub mod facade;
mod matrix;
pub mod path_selection;
pub mod precise;
mod workpool;
pub mod worst_case;

pub use err::Error;
pub use facade::{AnonymityFacade, CornerGrid};
pub use matrix::TriMatrix;
pub use precise::{Observations, PreciseGuarantees};
pub use worst_case::{NotionTensors, Tensors, WorstCaseEngine};
