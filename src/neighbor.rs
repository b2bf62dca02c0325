// SPDX-License-Identifier: AGPL-3.0-only

//! Full neighbor lists with special-bond bits, and a binned builder.
//!
//! Each neighbor entry is a `u32`: the neighbor's atom index in the low
//! [`SBBITS`] bits and its bonded order (0 none, 1 = 1-2, 2 = 1-3, 3 = 1-4)
//! in the top two. Lists are *full*: every pair appears once from each side.
//!
//! The builder bins all atoms (local and ghost) into cubic cells of edge
//! `cell_size`, then gathers neighbors within `cell_size` for each local atom
//! from the 27 surrounding cells, one rayon task per atom.

use rayon::prelude::*;

use crate::error::EngineError;
use crate::potential::{sbmask, NEIGHMASK, SBBITS};

/// Pack a neighbor index and its special order into one entry.
///
/// # Panics
///
/// Debug-panics if `j` does not fit [`NEIGHMASK`] or `order > 3`.
#[inline]
#[must_use]
pub fn encode(j: u32, order: u8) -> u32 {
    debug_assert!(j <= NEIGHMASK, "atom index {j} exceeds neighbor mask");
    debug_assert!(order <= 3);
    j | (u32::from(order) << SBBITS)
}

/// Split an entry into `(atom index, special order)`.
#[inline]
#[must_use]
pub const fn decode(entry: u32) -> (usize, usize) {
    ((entry & NEIGHMASK) as usize, sbmask(entry))
}

/// Read-only view of per-atom neighbor ranges.
///
/// Index `ii` walks `ilist`; atom `ilist[ii]` has `count[ii]` neighbors
/// starting at `neighbors[offset[ii]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeighborList {
    ilist: Vec<u32>,
    offset: Vec<u32>,
    count: Vec<u32>,
    neighbors: Vec<u32>,
}

impl NeighborList {
    /// Assemble from raw arrays.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if the arrays disagree in
    /// length or a range runs past the end of `neighbors`.
    pub fn new(
        ilist: Vec<u32>,
        offset: Vec<u32>,
        count: Vec<u32>,
        neighbors: Vec<u32>,
    ) -> Result<Self, EngineError> {
        if offset.len() != ilist.len() || count.len() != ilist.len() {
            return Err(EngineError::InvalidInput(format!(
                "neighbor list arrays disagree: ilist {}, offset {}, count {}",
                ilist.len(),
                offset.len(),
                count.len()
            )));
        }
        for (ii, (&o, &c)) in offset.iter().zip(&count).enumerate() {
            if o as usize + c as usize > neighbors.len() {
                return Err(EngineError::InvalidInput(format!(
                    "neighbor range of entry {ii} ends at {}, list holds {}",
                    o as usize + c as usize,
                    neighbors.len()
                )));
            }
        }
        Ok(Self {
            ilist,
            offset,
            count,
            neighbors,
        })
    }

    /// Contiguous list where atom `ii` is local atom `ii`.
    #[must_use]
    pub fn from_lists(lists: &[Vec<u32>]) -> Self {
        let mut offset = Vec::with_capacity(lists.len());
        let mut count = Vec::with_capacity(lists.len());
        let mut neighbors = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        for list in lists {
            offset.push(neighbors.len() as u32);
            count.push(list.len() as u32);
            neighbors.extend_from_slice(list);
        }
        Self {
            ilist: (0..lists.len() as u32).collect(),
            offset,
            count,
            neighbors,
        }
    }

    /// Number of atoms with forces computed (`inum`).
    #[must_use]
    pub fn inum(&self) -> usize {
        self.ilist.len()
    }

    #[must_use]
    pub fn ilist(&self) -> &[u32] {
        &self.ilist
    }

    /// Packed neighbor entries of the `ii`-th listed atom.
    #[must_use]
    pub fn neighbors_of(&self, ii: usize) -> &[u32] {
        let start = self.offset[ii] as usize;
        &self.neighbors[start..start + self.count[ii] as usize]
    }

    #[must_use]
    pub fn offsets(&self) -> &[u32] {
        &self.offset
    }

    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.count
    }

    #[must_use]
    pub fn entries(&self) -> &[u32] {
        &self.neighbors
    }

    /// Longest neighbor range.
    #[must_use]
    pub fn max_count(&self) -> usize {
        self.count.iter().copied().max().unwrap_or(0) as usize
    }

    /// Restrict to the first `n` listed atoms.
    #[must_use]
    pub fn truncated(&self, n: usize) -> Self {
        let n = n.min(self.inum());
        Self {
            ilist: self.ilist[..n].to_vec(),
            offset: self.offset[..n].to_vec(),
            count: self.count[..n].to_vec(),
            neighbors: self.neighbors.clone(),
        }
    }

    /// Host bytes held by this list.
    #[must_use]
    pub fn host_bytes(&self) -> usize {
        std::mem::size_of::<u32>()
            * (self.ilist.capacity()
                + self.offset.capacity()
                + self.count.capacity()
                + self.neighbors.capacity())
    }
}

/// A bonded partner of one local atom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialPartner {
    /// Index into the position array (local or ghost).
    pub atom: u32,
    /// 1 = 1-2, 2 = 1-3, 3 = 1-4.
    pub order: u8,
}

/// Bonded topology needed to tag neighbors with special orders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    special: Vec<Vec<SpecialPartner>>,
}

impl Topology {
    /// No bonds between `nlocal` local atoms.
    #[must_use]
    pub fn new(nlocal: usize) -> Self {
        Self {
            special: vec![Vec::new(); nlocal],
        }
    }

    /// Record `j` as an `order` partner of local atom `i` (and the reverse
    /// when `j` is local too).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] for an order outside `1..=3`
    /// or an out-of-range local index.
    pub fn add_special(&mut self, i: usize, j: usize, order: u8) -> Result<&mut Self, EngineError> {
        if !(1..=3).contains(&order) {
            return Err(EngineError::InvalidInput(format!(
                "special order {order} not in 1..=3"
            )));
        }
        if i >= self.special.len() {
            return Err(EngineError::InvalidInput(format!(
                "local atom {i} out of range ({} local)",
                self.special.len()
            )));
        }
        self.special[i].push(SpecialPartner {
            atom: j as u32,
            order,
        });
        if let Some(back) = self.special.get_mut(j) {
            back.push(SpecialPartner {
                atom: i as u32,
                order,
            });
        }
        Ok(self)
    }

    #[must_use]
    pub fn nlocal(&self) -> usize {
        self.special.len()
    }

    /// Longest special list.
    #[must_use]
    pub fn max_special(&self) -> usize {
        self.special.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn order_of(&self, i: usize, j: u32) -> u8 {
        self.special
            .get(i)
            .and_then(|s| s.iter().find(|p| p.atom == j))
            .map_or(0, |p| p.order)
    }
}

/// Outcome of a neighbor build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NeighborBuild {
    Built(NeighborList),
    /// Some atom has more than `max_neighbors` neighbors.
    Overflow { required: usize },
}

/// Binned full-list builder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborBuilder {
    /// Cell edge and neighbor cutoff (force cutoff plus skin).
    pub cell_size: f64,
    pub max_neighbors: usize,
}

impl NeighborBuilder {
    /// Build lists for the first `inum` atoms of `positions`; all
    /// `positions` (locals first, then ghosts) are candidate neighbors.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] for a non-positive cell size,
    /// `inum` beyond the atom count, non-finite coordinates, or indices
    /// that overflow the neighbor mask.
    pub fn build(
        &self,
        positions: &[[f64; 3]],
        inum: usize,
        topology: &Topology,
    ) -> Result<NeighborBuild, EngineError> {
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(EngineError::InvalidInput(format!(
                "cell size must be positive, got {}",
                self.cell_size
            )));
        }
        if inum > positions.len() {
            return Err(EngineError::InvalidInput(format!(
                "inum {inum} exceeds atom count {}",
                positions.len()
            )));
        }
        if positions.len() > NEIGHMASK as usize {
            return Err(EngineError::InvalidInput(format!(
                "{} atoms exceed the neighbor index range",
                positions.len()
            )));
        }

        if let Some(i) = positions.iter().position(|x| x.iter().any(|v| !v.is_finite())) {
            return Err(EngineError::InvalidInput(format!(
                "atom {i} has a non-finite position"
            )));
        }

        let grid = CellGrid::new(positions, self.cell_size);
        let cutsq = self.cell_size * self.cell_size;

        let lists: Vec<Vec<u32>> = (0..inum)
            .into_par_iter()
            .map(|i| {
                let xi = positions[i];
                let mut list = Vec::new();
                grid.for_each_near(xi, |j| {
                    if j == i {
                        return;
                    }
                    let xj = positions[j];
                    let r2 = (xi[0] - xj[0]).powi(2)
                        + (xi[1] - xj[1]).powi(2)
                        + (xi[2] - xj[2]).powi(2);
                    if r2 < cutsq {
                        let j = j as u32;
                        list.push(encode(j, topology.order_of(i, j)));
                    }
                });
                list.sort_unstable_by_key(|&e| e & NEIGHMASK);
                list
            })
            .collect();

        let required = lists.iter().map(Vec::len).max().unwrap_or(0);
        if required > self.max_neighbors {
            log::warn!(
                "neighbor list overflow: {required} neighbors exceed capacity {}",
                self.max_neighbors
            );
            return Ok(NeighborBuild::Overflow { required });
        }
        log::debug!(
            "built neighbor lists for {inum} atoms, max {required} neighbors, {} cells",
            grid.cells.len()
        );
        Ok(NeighborBuild::Built(NeighborList::from_lists(&lists)))
    }
}

/// Atoms sorted into cubic cells over their bounding box, at most one
/// cell per atom.
struct CellGrid {
    lo: [f64; 3],
    inv: f64,
    dims: [usize; 3],
    cells: Vec<Vec<usize>>,
}

impl CellGrid {
    fn new(positions: &[[f64; 3]], cell_size: f64) -> Self {
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for x in positions {
            for d in 0..3 {
                lo[d] = lo[d].min(x[d]);
                hi[d] = hi[d].max(x[d]);
            }
        }
        if positions.is_empty() {
            lo = [0.0; 3];
            hi = [0.0; 3];
        }
        // Never more cells than atoms; a wider edge still covers the cutoff.
        let budget = positions.len().max(1) as f64;
        let count = |edge: f64| -> f64 {
            (0..3)
                .map(|d| ((hi[d] - lo[d]) / edge).floor() + 1.0)
                .product()
        };
        let mut edge = cell_size;
        while count(edge) > budget {
            edge *= 2.0;
        }
        let inv = 1.0 / edge;
        let dims = [0, 1, 2].map(|d| ((hi[d] - lo[d]) * inv).floor() as usize + 1);
        let mut grid = Self {
            lo,
            inv,
            dims,
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };
        for (idx, x) in positions.iter().enumerate() {
            let c = grid.cell_of(*x);
            let flat = grid.flat(c);
            grid.cells[flat].push(idx);
        }
        grid
    }

    fn cell_of(&self, x: [f64; 3]) -> [usize; 3] {
        [0, 1, 2].map(|d| (((x[d] - self.lo[d]) * self.inv) as usize).min(self.dims[d] - 1))
    }

    const fn flat(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    fn for_each_near(&self, x: [f64; 3], mut f: impl FnMut(usize)) {
        let c = self.cell_of(x);
        let range = |d: usize| c[d].saturating_sub(1)..=(c[d] + 1).min(self.dims[d] - 1);
        for cz in range(2) {
            for cy in range(1) {
                for cx in range(0) {
                    for &j in &self.cells[self.flat([cx, cy, cz])] {
                        f(j);
                    }
                }
            }
        }
    }
}
