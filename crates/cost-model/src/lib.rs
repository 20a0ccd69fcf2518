//! Programmable relay cost functions, the materialized [`CostMap`], and
//! the [`Adversary`] that pairs a cost map with a budget.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod adversary;
mod cost_map;
pub mod err;
mod pcf;

pub use adversary::Adversary;
pub use cost_map::CostMap;
pub use err::Error;
pub use pcf::Pcf;
