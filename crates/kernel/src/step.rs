//! 16-bit step records.
//!
//! ```text
//! bit  0     horizontal distance class (0 orthogonal, 1 diagonal)
//! bits 1-2   heading (north, east, south, west)
//! bit  3     vertical direction (0 down, 1 up)
//! bits 4-9   vertical distance, 0..=63
//! bits 10-15 reserved, zero
//! ```
//!
//! North is -y, east is +x. A diagonal record names the diagonal clockwise of its heading,
//! so diagonal north is north-east and diagonal west is north-west.
//! Every record moves one cell horizontally; a purely vertical displacement has no record.

use glam::IVec3;
use voxpath_common::Coord;

/// Largest vertical distance one record can carry.
pub const MAX_CLIMB: i32 = 63;

const REACH_BIT: u16 = 1;
const HEADING_SHIFT: u16 = 1;
const UP_BIT: u16 = 1 << 3;
const CLIMB_SHIFT: u16 = 4;
const CLIMB_MASK: u16 = 0x3f;
const RESERVED_MASK: u16 = 0xfc00;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("cells {from} and {to} are not adjacent")]
    InvalidStep { from: Coord, to: Coord },
    #[error("step record {0:#06x} has reserved bits set")]
    ReservedBits(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Heading {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Heading {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Heading::North,
            1 => Heading::East,
            2 => Heading::South,
            _ => Heading::West,
        }
    }
}

/// Horizontal distance class of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reach {
    Orthogonal,
    Diagonal,
}

/// A decoded step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Step {
    pub reach: Reach,
    pub heading: Heading,
    /// Signed vertical displacement, -63..=63.
    pub climb: i32,
}

impl Step {
    /// Classify the move from `from` to `to`.
    pub fn between(from: Coord, to: Coord) -> Result<Self, StepError> {
        let d = to - from;
        let invalid = || StepError::InvalidStep { from, to };
        if d.z.abs() > MAX_CLIMB {
            return Err(invalid());
        }
        let (reach, heading) = match (d.x, d.y) {
            (0, -1) => (Reach::Orthogonal, Heading::North),
            (1, 0) => (Reach::Orthogonal, Heading::East),
            (0, 1) => (Reach::Orthogonal, Heading::South),
            (-1, 0) => (Reach::Orthogonal, Heading::West),
            (1, -1) => (Reach::Diagonal, Heading::North),
            (1, 1) => (Reach::Diagonal, Heading::East),
            (-1, 1) => (Reach::Diagonal, Heading::South),
            (-1, -1) => (Reach::Diagonal, Heading::West),
            _ => return Err(invalid()),
        };
        Ok(Self {
            reach,
            heading,
            climb: d.z,
        })
    }

    /// Displacement this step applies to a coordinate.
    pub fn delta(&self) -> IVec3 {
        let (x, y) = match (self.reach, self.heading) {
            (Reach::Orthogonal, Heading::North) => (0, -1),
            (Reach::Orthogonal, Heading::East) => (1, 0),
            (Reach::Orthogonal, Heading::South) => (0, 1),
            (Reach::Orthogonal, Heading::West) => (-1, 0),
            (Reach::Diagonal, Heading::North) => (1, -1),
            (Reach::Diagonal, Heading::East) => (1, 1),
            (Reach::Diagonal, Heading::South) => (-1, 1),
            (Reach::Diagonal, Heading::West) => (-1, -1),
        };
        IVec3::new(x, y, self.climb)
    }

    pub fn encode(&self) -> u16 {
        let mut bits = (self.heading as u16) << HEADING_SHIFT;
        if self.reach == Reach::Diagonal {
            bits |= REACH_BIT;
        }
        if self.climb > 0 {
            bits |= UP_BIT;
        }
        bits | ((self.climb.unsigned_abs() as u16 & CLIMB_MASK) << CLIMB_SHIFT)
    }

    pub fn decode(record: u16) -> Result<Self, StepError> {
        if record & RESERVED_MASK != 0 {
            return Err(StepError::ReservedBits(record));
        }
        let reach = if record & REACH_BIT != 0 {
            Reach::Diagonal
        } else {
            Reach::Orthogonal
        };
        let distance = ((record >> CLIMB_SHIFT) & CLIMB_MASK) as i32;
        let climb = if record & UP_BIT != 0 {
            distance
        } else {
            -distance
        };
        Ok(Self {
            reach,
            heading: Heading::from_bits(record >> HEADING_SHIFT),
            climb,
        })
    }
}

/// Encode the move from `from` to the adjacent cell `to`.
pub fn encode_step(from: Coord, to: Coord) -> Result<u16, StepError> {
    Step::between(from, to).map(|s| s.encode())
}

/// Replay `records` from `start`, returning every visited cell including `start`.
pub fn trace(start: Coord, records: &[u16]) -> Result<Vec<Coord>, StepError> {
    let mut cells = Vec::with_capacity(records.len() + 1);
    let mut at = start;
    cells.push(at);
    for &record in records {
        at += Step::decode(record)?.delta();
        cells.push(at);
    }
    Ok(cells)
}

/// View encoded records as raw bytes in native byte order, for handing across a boundary.
pub fn path_bytes(records: &[u16]) -> &[u8] {
    bytemuck::cast_slice(records)
}
