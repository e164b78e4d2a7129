//! Strategy engine: odds normalisation, cross-source matching, edge scoring
//! and the fee estimate.

pub mod edge;
pub mod fees;
pub mod matcher;
pub mod normalize;
