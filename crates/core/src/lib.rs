//! Core library for rust-trajectory-kernels.
//!
//! Pure Rust implementations with no Python dependencies.
//! Provides periodic boxes with the minimum image convention, validated
//! trajectories, unwrapping, neighbor-pair enumeration (brute force, cell
//! list and k-d tree) and radial distribution functions.

pub mod error;
pub mod neighbors;
pub mod periodic;
pub mod rdf;
pub mod trajectory;
pub mod util;
pub mod wrapping;

pub use error::{KernelError, Result};
pub use neighbors::{find_pairs, pair_sets_match, sort_pairs, NeighborStrategy, PairRecord};
pub use periodic::PeriodicBox;
pub use trajectory::Trajectory;
