//! Path kernel: grid storage, A* search and the 16-bit step encoding of its results.
//!
//! # Invariants
//! - Each search owns its accounting grids; nothing is shared between searches.
//! - Open-set order is `(cost + estimate, cost, linear index)`, so results are reproducible.
//! - Every emitted record describes a move between adjacent cells.

pub mod buffer;
pub mod grid;
pub mod search;
pub mod step;

pub use buffer::GrowBuffer;
pub use grid::{AccountingGrid, CollisionGrid, Grid};
pub use search::{
    Endpoint, Route, Search, SearchError, SearchOutcome, SearchState, find_path, heuristic,
    move_cost,
};
pub use step::{Heading, Reach, Step, StepError, encode_step, path_bytes, trace};

pub fn crate_info() -> &'static str {
    "voxpath-kernel v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("kernel"));
    }
}
