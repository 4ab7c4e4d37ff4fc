//! Visiting orders over a grid sub-region.

use crate::config::TraversalOrder;
use crate::tile::GridPos;

use super::SubRegion;

/// Restartable sequence of coordinates covering a sub-region exactly once.
#[derive(Clone, Debug)]
pub struct Traversal {
    order: TraversalOrder,
    positions: Vec<GridPos>,
    next: usize,
}

impl Traversal {
    pub fn new(order: TraversalOrder, region: SubRegion) -> Self {
        let local = match order {
            TraversalOrder::Row => row_major(region.height, region.width),
            TraversalOrder::Column => column_major(region.height, region.width),
            TraversalOrder::ChainedRow => chained_rows(region.height, region.width),
            TraversalOrder::ChainedColumn => chained_columns(region.height, region.width),
            TraversalOrder::Diagonal => diagonals(region.height, region.width),
        };
        let positions = local
            .into_iter()
            .map(|(r, c)| GridPos::new(region.start_row + r, region.start_col + c))
            .collect();
        Self {
            order,
            positions,
            next: 0,
        }
    }

    pub fn order(&self) -> TraversalOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Start again from the first coordinate.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Iterator for Traversal {
    type Item = GridPos;

    fn next(&mut self) -> Option<GridPos> {
        let pos = self.positions.get(self.next).copied()?;
        self.next += 1;
        Some(pos)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.positions.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Traversal {}

fn row_major(h: usize, w: usize) -> Vec<(usize, usize)> {
    (0..h).flat_map(|r| (0..w).map(move |c| (r, c))).collect()
}

fn column_major(h: usize, w: usize) -> Vec<(usize, usize)> {
    (0..w).flat_map(|c| (0..h).map(move |r| (r, c))).collect()
}

fn chained_rows(h: usize, w: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(h * w);
    for r in 0..h {
        if r % 2 == 0 {
            out.extend((0..w).map(|c| (r, c)));
        } else {
            out.extend((0..w).rev().map(|c| (r, c)));
        }
    }
    out
}

fn chained_columns(h: usize, w: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(h * w);
    for c in 0..w {
        if c % 2 == 0 {
            out.extend((0..h).map(|r| (r, c)));
        } else {
            out.extend((0..h).rev().map(|r| (r, c)));
        }
    }
    out
}

/// Anti-diagonals from the top-left corner; each diagonal runs north-east to
/// south-west, so west and north neighbours are always on an earlier one.
fn diagonals(h: usize, w: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(h * w);
    if h == 0 || w == 0 {
        return out;
    }
    for d in 0..(h + w - 1) {
        let r_lo = d.saturating_sub(w - 1);
        let r_hi = d.min(h - 1);
        out.extend((r_lo..=r_hi).map(|r| (r, d - r)));
    }
    out
}
