//! Cell coordinates, lattice geometry and distances.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `sqrt(3) / 2`, the row spacing of a unit-pitch hexagonal lattice.
pub const SQRT3_BY_2: f64 = 0.866_025_403_784_438_6;

/// Integer coordinate of a cell on the module grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellCoord {
    /// Index along the first grid axis.
    pub i: u16,
    /// Index along the second grid axis.
    pub j: u16,
}

impl CellCoord {
    /// Creates a new cell coordinate.
    #[inline]
    #[must_use]
    pub fn new(i: u16, j: u16) -> Self {
        Self { i, j }
    }
}

/// Plane Euclidean distance between `(x1, y1)` and `(x2, y2)`.
///
/// NaN inputs propagate to the result.
#[inline]
#[must_use]
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let dx = x1 - x2;
    let dy = y1 - y2;
    (dx * dx + dy * dy).sqrt()
}

const HEX_OFFSETS: [(i32, i32); 6] = [(1, 0), (0, 1), (-1, 1), (-1, 0), (0, -1), (1, -1)];
const SQUARE_OFFSETS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Cell layout of a module, which fixes both adjacency and cell positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Lattice {
    /// Hexagonal cells; the second axis runs at 60 degrees to the first.
    /// Every cell has six neighbours.
    #[default]
    Hexagonal,
    /// Square cells with four edge-sharing neighbours.
    Square,
}

impl Lattice {
    /// Index offsets `(di, dj)` of the neighbours of a cell.
    #[must_use]
    pub fn offsets(self) -> &'static [(i32, i32)] {
        match self {
            Self::Hexagonal => &HEX_OFFSETS,
            Self::Square => &SQUARE_OFFSETS,
        }
    }

    /// Physical centre of cell `(i, j)` for the given cell pitch.
    #[must_use]
    pub fn position(self, i: u16, j: u16, pitch: f64) -> (f64, f64) {
        let fi = f64::from(i);
        let fj = f64::from(j);
        match self {
            Self::Hexagonal => ((fi + 0.5 * fj) * pitch, fj * SQRT3_BY_2 * pitch),
            Self::Square => (fi * pitch, fj * pitch),
        }
    }

    /// Maps a physical position back to fractional lattice indices.
    ///
    /// Inverse of [`Lattice::position`] for cell centres.
    #[must_use]
    pub fn to_lattice(self, x: f64, y: f64, pitch: f64) -> (f64, f64) {
        match self {
            Self::Hexagonal => {
                let fj = y / (SQRT3_BY_2 * pitch);
                (x / pitch - 0.5 * fj, fj)
            }
            Self::Square => (x / pitch, y / pitch),
        }
    }
}
