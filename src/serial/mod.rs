pub mod filter;
pub mod rules;

pub use filter::{best_candidate, SerialCandidate, SerialFilter};
