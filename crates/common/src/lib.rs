//! Shared types: world volume and the linear addressing every grid is built on.
//!
//! # Invariants
//! - A coordinate and its linear index are interchangeable through [`Volume`].
//! - Every grid over a volume uses the same layout (x fastest, then y, then z).

mod volume;

pub use volume::{Coord, GridError, MAX_CELLS, Volume};

pub fn crate_info() -> &'static str {
    "voxpath-common v0.1.0"
}
