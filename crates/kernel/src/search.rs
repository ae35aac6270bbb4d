use core::cmp::Ordering;
use core::fmt;
use std::collections::BinaryHeap;

use glam::IVec3;
use voxpath_common::{Coord, GridError, Volume};

use crate::buffer::GrowBuffer;
use crate::grid::{AccountingGrid, CollisionGrid};
use crate::step::{StepError, encode_step};

/// Cost of a horizontal step along one axis.
pub const ORTHOGONAL_COST: u32 = 5;
/// Cost of a horizontal diagonal step.
pub const DIAGONAL_COST: u32 = 7;
/// Cost per unit of vertical displacement.
pub const CLIMB_COST: u32 = 5;

// Ledger cells hold `cost << BACK_BITS | move`, where `move` indexes MOVES.
const BACK_BITS: u32 = 5;
const BACK_MASK: u32 = (1 << BACK_BITS) - 1;
const NO_PARENT: u32 = BACK_MASK;
const UNREACHED: u32 = u32::MAX;

// Frontier cells hold `priority + 1` while open. A heap entry whose priority disagrees
// with its frontier cell is superseded or closed.
const UNSEEN: u32 = 0;
const CLOSED: u32 = u32::MAX;

const HORIZONTAL: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Every move a walker can take: one of eight horizontal directions, combined with
/// dropping one level, staying level, or rising one level.
pub const MOVES: [IVec3; 24] = build_moves();

const fn build_moves() -> [IVec3; 24] {
    let mut out = [IVec3::ZERO; 24];
    let mut i = 0;
    while i < 24 {
        let (x, y) = HORIZONTAL[i % 8];
        out[i] = IVec3::new(x, y, (i / 8) as i32 - 1);
        i += 1;
    }
    out
}

/// Cost of a single move under the 5/7 scale.
pub fn move_cost(delta: IVec3) -> u32 {
    let horizontal = match (delta.x != 0, delta.y != 0) {
        (true, true) => DIAGONAL_COST,
        (false, false) => 0,
        _ => ORTHOGONAL_COST,
    };
    horizontal + CLIMB_COST * delta.z.unsigned_abs()
}

/// Octile estimate on the horizontal plane plus a proportional vertical term.
/// Never exceeds the true remaining cost.
pub fn heuristic(from: Coord, to: Coord) -> u32 {
    let d = (to - from).abs();
    let (dx, dy) = (d.x as u32, d.y as u32);
    let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
    DIAGONAL_COST * lo + ORTHOGONAL_COST * (hi - lo) + CLIMB_COST * d.z as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Start => f.write_str("start"),
            Endpoint::Destination => f.write_str("destination"),
        }
    }
}

/// Reasons a search could not be carried out. A search that runs and finds nothing is not
/// an error; it ends in [`SearchOutcome::Exhausted`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    OutOfBounds(#[from] GridError),
    #[error("{endpoint} cell {coord} is blocked")]
    BlockedEndpoint { endpoint: Endpoint, coord: Coord },
    #[error(transparent)]
    InvalidStep(#[from] StepError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Initialized,
    Searching,
    Found,
    Exhausted,
}

impl SearchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SearchState::Found | SearchState::Exhausted)
    }
}

/// A computed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// One encoded record per transition, start to destination.
    pub steps: Vec<u16>,
    /// Total cost under the 5/7 cost model.
    pub cost: u32,
    /// Cells expanded while searching.
    pub expanded: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(Route),
    Exhausted { expanded: u32 },
}

#[derive(Debug)]
struct OpenNode {
    f: u32,
    g: u32,
    index: u32,
}

impl OpenNode {
    fn key(&self) -> (u32, u32, u32) {
        (self.f, self.g, self.index)
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap behave like a min-heap.
        other.key().cmp(&self.key())
    }
}

/// A single A* search over one job's collision grid.
///
/// Accounting grids are allocated here and dropped with the search.
pub struct Search<'a> {
    collision: &'a CollisionGrid,
    volume: Volume,
    start: Coord,
    dest: Coord,
    start_index: usize,
    dest_index: usize,
    ledger: AccountingGrid,
    frontier: AccountingGrid,
    open: BinaryHeap<OpenNode>,
    state: SearchState,
    expanded: u32,
}

impl<'a> Search<'a> {
    /// Validate the endpoints against `collision` and prepare the accounting grids.
    pub fn new(
        collision: &'a CollisionGrid,
        start: Coord,
        dest: Coord,
    ) -> Result<Self, SearchError> {
        let volume = collision.volume();
        let start_index = volume.index_of(start)?;
        let dest_index = volume.index_of(dest)?;
        if collision.get(start_index)? != 0 {
            return Err(SearchError::BlockedEndpoint {
                endpoint: Endpoint::Start,
                coord: start,
            });
        }
        if collision.get(dest_index)? != 0 {
            return Err(SearchError::BlockedEndpoint {
                endpoint: Endpoint::Destination,
                coord: dest,
            });
        }
        Ok(Self {
            collision,
            volume,
            start,
            dest,
            start_index,
            dest_index,
            ledger: AccountingGrid::filled(volume, UNREACHED),
            frontier: AccountingGrid::filled(volume, UNSEEN),
            open: BinaryHeap::new(),
            state: SearchState::Initialized,
            expanded: 0,
        })
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn expanded(&self) -> u32 {
        self.expanded
    }

    /// Do one unit of work: seed the start cell, or finalize one open cell.
    pub fn advance(&mut self) -> Result<SearchState, SearchError> {
        match self.state {
            SearchState::Initialized => self.seed()?,
            SearchState::Searching => self.expand_next()?,
            SearchState::Found | SearchState::Exhausted => {}
        }
        Ok(self.state)
    }

    /// Drive the search to a terminal state.
    pub fn run(mut self) -> Result<SearchOutcome, SearchError> {
        let _span =
            tracing::debug_span!("search", start = %self.start, dest = %self.dest).entered();
        loop {
            match self.advance()? {
                SearchState::Found => {
                    let route = self.route()?;
                    tracing::debug!(
                        cost = route.cost,
                        steps = route.steps.len(),
                        expanded = route.expanded,
                        "path found"
                    );
                    return Ok(SearchOutcome::Found(route));
                }
                SearchState::Exhausted => {
                    tracing::debug!(expanded = self.expanded, "open set exhausted");
                    return Ok(SearchOutcome::Exhausted {
                        expanded: self.expanded,
                    });
                }
                SearchState::Initialized | SearchState::Searching => {}
            }
        }
    }

    fn seed(&mut self) -> Result<(), SearchError> {
        self.ledger.set(self.start_index, NO_PARENT)?;
        if self.start_index == self.dest_index {
            self.frontier.set(self.start_index, CLOSED)?;
            self.state = SearchState::Found;
            return Ok(());
        }
        let f = heuristic(self.start, self.dest);
        self.frontier.set(self.start_index, f + 1)?;
        self.open.push(OpenNode {
            f,
            g: 0,
            index: self.start_index as u32,
        });
        self.state = SearchState::Searching;
        Ok(())
    }

    fn expand_next(&mut self) -> Result<(), SearchError> {
        let node = loop {
            let Some(node) = self.open.pop() else {
                self.state = SearchState::Exhausted;
                return Ok(());
            };
            if self.frontier.get(node.index as usize)? == node.f + 1 {
                break node;
            }
        };

        let index = node.index as usize;
        self.frontier.set(index, CLOSED)?;
        if index == self.dest_index {
            self.state = SearchState::Found;
            return Ok(());
        }
        self.expanded += 1;

        let here = self.volume.coord_of(index)?;
        for (code, &delta) in MOVES.iter().enumerate() {
            let next = here + delta;
            if !self.volume.contains(next) {
                continue;
            }
            let next_index = self.volume.index_of(next)?;
            let slot = self.frontier.get(next_index)?;
            if slot == CLOSED || self.collision.get(next_index)? != 0 {
                continue;
            }
            let g = node.g + move_cost(delta);
            let f = g + heuristic(next, self.dest);
            if slot != UNSEEN && f + 1 >= slot {
                continue;
            }
            self.ledger.set(next_index, (g << BACK_BITS) | code as u32)?;
            self.frontier.set(next_index, f + 1)?;
            self.open.push(OpenNode {
                f,
                g,
                index: next_index as u32,
            });
        }
        Ok(())
    }

    fn route(&self) -> Result<Route, SearchError> {
        let mut cells = vec![self.dest];
        let mut index = self.dest_index;
        loop {
            let code = self.ledger.get(index)? & BACK_MASK;
            if code == NO_PARENT {
                break;
            }
            let prev = self.volume.coord_of(index)? - MOVES[code as usize];
            index = self.volume.index_of(prev)?;
            cells.push(prev);
        }
        cells.reverse();

        let mut steps = GrowBuffer::new();
        for pair in cells.windows(2) {
            steps.push(encode_step(pair[0], pair[1])?);
        }
        Ok(Route {
            steps: steps.trim(),
            cost: self.ledger.get(self.dest_index)? >> BACK_BITS,
            expanded: self.expanded,
        })
    }
}

/// Search `collision` for a route from `start` to `dest`.
pub fn find_path(
    collision: &CollisionGrid,
    start: Coord,
    dest: Coord,
) -> Result<SearchOutcome, SearchError> {
    Search::new(collision, start, dest)?.run()
}
