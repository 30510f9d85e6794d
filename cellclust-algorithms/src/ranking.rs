//! Energy ranking of grid cells.

use std::cmp::Ordering;

use cellclust_core::grid::CellGrid;

/// Orders two cells by decreasing energy, then by increasing flat index.
#[inline]
pub(crate) fn rank_cmp(energies: &[f64], a: usize, b: usize) -> Ordering {
    energies[b].total_cmp(&energies[a]).then(a.cmp(&b))
}

/// Collects every cell with positive energy into `order`, highest first.
///
/// Cells of equal energy keep row-major order, so the ranking (and every
/// step seeded from it) is reproducible. `order` is cleared first; its
/// allocation is reused.
pub fn order_cells(grid: &CellGrid, order: &mut Vec<usize>) {
    order.clear();
    let energies = grid.energies();
    order.extend(grid.active_indices().filter(|&idx| energies[idx] > 0.0));
    order.sort_unstable_by(|&a, &b| rank_cmp(energies, a, b));
}
