//! Connected-component grouping of above-cutoff cells.
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use std::ops::Range;

use cellclust_core::grid::CellGrid;

/// A maximal connected group of above-cutoff cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Supercluster {
    /// Id, equal to the position in the table.
    pub id: u32,
    /// Member range in [`SuperclusterTable::members`].
    pub members: Range<usize>,
    /// Summed member energy.
    pub energy: f64,
    /// Growth stopped at the cell cap.
    pub truncated: bool,
}

impl Supercluster {
    /// Number of member cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the supercluster has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Superclusters of one pass with their members stored back to back.
#[derive(Debug, Default)]
pub struct SuperclusterTable {
    entries: Vec<Supercluster>,
    members: Vec<usize>,
}

impl SuperclusterTable {
    /// Creates a table sized for `cells` member cells.
    #[must_use]
    pub fn with_capacity(cells: usize) -> Self {
        Self {
            entries: Vec::new(),
            members: Vec::with_capacity(cells),
        }
    }

    /// Removes all entries, keeping allocations.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.members.clear();
    }

    /// Number of superclusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a supercluster by id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Supercluster> {
        self.entries.get(id as usize)
    }

    /// Iterates over the superclusters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Supercluster> {
        self.entries.iter()
    }

    /// Member cells of a supercluster in growth order.
    #[must_use]
    pub fn members(&self, supercluster: &Supercluster) -> &[usize] {
        &self.members[supercluster.members.clone()]
    }
}

/// Counts returned by [`build_superclusters`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BuildOutcome {
    /// Superclusters created.
    pub superclusters: usize,
    /// Superclusters that hit the cell cap.
    pub truncated: usize,
    /// Cells assigned to any supercluster.
    pub cells: usize,
}

/// Effective cutoff: `cutoff`, raised to `ave * adaptive_fraction` if larger.
#[must_use]
pub fn effective_cutoff(cutoff: f64, ave: f64, adaptive_fraction: f64) -> f64 {
    cutoff.max(ave * adaptive_fraction)
}

/// Groups the ranked cells into superclusters.
///
/// Walks `ranked` from the highest energy down. Every cell above `cutoff`
/// that no supercluster holds yet starts a new one, grown breadth-first over
/// neighbouring unassigned cells above `cutoff`. A supercluster stops
/// growing at `max_cells`; cells it left behind are reached later in the
/// ranking and start superclusters of their own.
///
/// Supercluster ids are written to the grid and the table is rebuilt.
pub fn build_superclusters(
    grid: &mut CellGrid,
    ranked: &[usize],
    cutoff: f64,
    max_cells: usize,
    table: &mut SuperclusterTable,
) -> BuildOutcome {
    table.clear();
    let mut outcome = BuildOutcome::default();

    for &start in ranked {
        if grid.energy(start) <= cutoff {
            // Ranked by energy, nothing further down can pass.
            break;
        }
        if grid.supercluster_of(start) >= 0 {
            continue;
        }

        let id = table.entries.len() as u32;
        let first = table.members.len();
        grid.set_supercluster(start, id as i32);
        table.members.push(start);

        let mut truncated = false;
        let mut head = first;
        'grow: while head < table.members.len() {
            let current = table.members[head];
            head += 1;
            for neighbour in grid.neighbours(current) {
                if grid.supercluster_of(neighbour) >= 0 || grid.energy(neighbour) <= cutoff {
                    continue;
                }
                if table.members.len() - first >= max_cells {
                    truncated = true;
                    break 'grow;
                }
                // Labelled on discovery so a cell is queued once.
                grid.set_supercluster(neighbour, id as i32);
                table.members.push(neighbour);
            }
        }

        let members = first..table.members.len();
        let energy: f64 = table.members[members.clone()]
            .iter()
            .map(|&idx| grid.energy(idx))
            .sum();
        log::trace!(
            "supercluster {id}: {} cells, energy {energy:.3}",
            members.len()
        );
        if truncated {
            outcome.truncated += 1;
        }
        outcome.cells += members.len();
        table.entries.push(Supercluster {
            id,
            members,
            energy,
            truncated,
        });
    }

    outcome.superclusters = table.entries.len();
    outcome
}
