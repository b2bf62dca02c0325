// SPDX-License-Identifier: AGPL-3.0-only

//! Pair-sum kernel: the per-atom neighbor loop shared by every device.
//!
//! The grid model is the one the WGSL shaders implement: thread-group `g`
//! owns atoms `[g·BX/T, (g+1)·BX/T)`, each served by `T` lanes that stride
//! over its neighbors. Lane partials are combined by a fixed binary tree
//! and lane 0 writes the atom's slot, so results depend only on the
//! neighbor order and `T`.
//!
//! The two kernel variants differ only in their [`CoeffSource`]:
//! [`SharedCoeffs`] copies the padded tables into group-local storage once
//! per group, [`GlobalCoeffs`] reads the engine's tables in place.

use rayon::prelude::*;

use crate::coeff::{CoeffTables, TABLES_PER_PAIR};
use crate::error::EngineError;
use crate::launch::{KernelVariant, LaunchPlan};
use crate::neighbor::{decode, NeighborList};
use crate::potential::{self, DsfParams, PairCoeffs};

// ═══════════════════════════════════════════════════════════════════
// Inputs and outputs
// ═══════════════════════════════════════════════════════════════════

/// Per-atom state for one step: locals first, then ghosts.
#[derive(Clone, Copy, Debug)]
pub struct StepInput<'a> {
    pub positions: &'a [[f64; 3]],
    /// Zero-based atom types.
    pub types: &'a [u32],
    pub charges: &'a [f64],
}

impl<'a> StepInput<'a> {
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if the arrays differ in length.
    pub fn new(
        positions: &'a [[f64; 3]],
        types: &'a [u32],
        charges: &'a [f64],
    ) -> Result<Self, EngineError> {
        if types.len() != positions.len() || charges.len() != positions.len() {
            return Err(EngineError::InvalidInput(format!(
                "step arrays disagree: {} positions, {} types, {} charges",
                positions.len(),
                types.len(),
                charges.len()
            )));
        }
        Ok(Self {
            positions,
            types,
            charges,
        })
    }

    /// Atoms (`nall`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Which optional accumulators to fill.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnergyFlags {
    pub energy: bool,
    pub virial: bool,
}

impl EnergyFlags {
    pub const FORCES_ONLY: Self = Self {
        energy: false,
        virial: false,
    };
    pub const ALL: Self = Self {
        energy: true,
        virial: true,
    };
}

/// Output slot of one atom.
///
/// Energies and virial are half-counted: the full list visits each pair
/// from both atoms, so summing slots gives system totals.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AtomAnswer {
    pub force: [f64; 3],
    pub e_vdwl: f64,
    pub e_coul: f64,
    /// `xx, yy, zz, xy, xz, yz`.
    pub virial: [f64; 6],
}

impl AtomAnswer {
    fn add(&mut self, other: &Self) {
        for d in 0..3 {
            self.force[d] += other.force[d];
        }
        self.e_vdwl += other.e_vdwl;
        self.e_coul += other.e_coul;
        for v in 0..6 {
            self.virial[v] += other.virial[v];
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Coefficient sources (the two kernel variants)
// ═══════════════════════════════════════════════════════════════════

/// Type-pair coefficient lookup used inside the neighbor loop.
pub trait CoeffSource {
    fn coeffs(&self, itype: usize, jtype: usize) -> PairCoeffs;
    /// `(factor_lj, factor_coul)` for special order `0..4`.
    fn special(&self, order: usize) -> (f64, f64);
    fn dsf(&self) -> &DsfParams;
}

/// General variant: reads the engine tables with stride `lj_types`.
pub struct GlobalCoeffs<'a> {
    tables: &'a CoeffTables,
}

impl<'a> GlobalCoeffs<'a> {
    #[must_use]
    pub const fn new(tables: &'a CoeffTables) -> Self {
        Self { tables }
    }
}

impl CoeffSource for GlobalCoeffs<'_> {
    #[inline]
    fn coeffs(&self, itype: usize, jtype: usize) -> PairCoeffs {
        self.tables.record(itype, jtype)
    }

    #[inline]
    fn special(&self, order: usize) -> (f64, f64) {
        (self.tables.sp_lj[order], self.tables.sp_lj[order + 4])
    }

    fn dsf(&self) -> &DsfParams {
        &self.tables.dsf
    }
}

/// Fast variant: a per-group copy of the padded tables.
pub struct SharedCoeffs {
    lj_types: usize,
    entries: Vec<[[f64; 4]; TABLES_PER_PAIR]>,
    sp_lj: [f64; 8],
    dsf: DsfParams,
}

impl SharedCoeffs {
    /// Fill group-local storage from the global tables.
    #[must_use]
    pub fn load(tables: &CoeffTables) -> Self {
        let n = tables.lj_types();
        let entries = (0..n * n).map(|k| tables.packed(k / n, k % n)).collect();
        Self {
            lj_types: n,
            entries,
            sp_lj: tables.sp_lj,
            dsf: tables.dsf,
        }
    }
}

impl CoeffSource for SharedCoeffs {
    #[inline]
    fn coeffs(&self, itype: usize, jtype: usize) -> PairCoeffs {
        PairCoeffs::from_packed(&self.entries[itype * self.lj_types + jtype])
    }

    #[inline]
    fn special(&self, order: usize) -> (f64, f64) {
        (self.sp_lj[order], self.sp_lj[order + 4])
    }

    fn dsf(&self) -> &DsfParams {
        &self.dsf
    }
}

// ═══════════════════════════════════════════════════════════════════
// Neighbor loop
// ═══════════════════════════════════════════════════════════════════

/// Partial sums of one lane over neighbors `lane, lane + T, ...`.
fn lane_sum<C: CoeffSource>(
    src: &C,
    input: &StepInput<'_>,
    i: usize,
    neighbors: &[u32],
    lane: usize,
    lanes: usize,
    flags: EnergyFlags,
) -> AtomAnswer {
    let xi = input.positions[i];
    let itype = input.types[i] as usize;
    let qi = input.charges[i];
    let dsf = src.dsf();
    let mut acc = AtomAnswer::default();

    for &entry in neighbors.iter().skip(lane).step_by(lanes) {
        let (j, order) = decode(entry);
        debug_assert_ne!(i, j, "self pair in neighbor list");
        let (factor_lj, factor_coul) = src.special(order);

        let xj = input.positions[j];
        let delx = xi[0] - xj[0];
        let dely = xi[1] - xj[1];
        let delz = xi[2] - xj[2];
        let r2 = delx * delx + dely * dely + delz * delz;

        let c = src.coeffs(itype, input.types[j] as usize);
        let t = potential::evaluate(r2, &c, qi * input.charges[j], factor_lj, factor_coul, dsf);
        let f = t.force_over_r;

        acc.force[0] += delx * f;
        acc.force[1] += dely * f;
        acc.force[2] += delz * f;
        if flags.energy {
            acc.e_vdwl += t.e_vdwl;
            acc.e_coul += t.e_coul;
        }
        if flags.virial {
            acc.virial[0] += delx * delx * f;
            acc.virial[1] += dely * dely * f;
            acc.virial[2] += delz * delz * f;
            acc.virial[3] += delx * dely * f;
            acc.virial[4] += delx * delz * f;
            acc.virial[5] += dely * delz * f;
        }
    }
    acc
}

/// Tree-reduce lane partials in place; the total ends in slot 0.
fn reduce_lanes(partials: &mut [AtomAnswer]) {
    let mut stride = partials.len() / 2;
    while stride > 0 {
        for l in 0..stride {
            let upper = partials[l + stride];
            partials[l].add(&upper);
        }
        stride /= 2;
    }
}

/// Run thread-group `group` of `plan`, writing its atoms into `out`.
///
/// `out` holds exactly the group's atoms, in `ilist` order.
pub fn run_group<C: CoeffSource>(
    src: &C,
    input: &StepInput<'_>,
    list: &NeighborList,
    flags: EnergyFlags,
    plan: &LaunchPlan,
    group: usize,
    out: &mut [AtomAnswer],
) {
    let lanes = plan.threads_per_atom;
    let mut partials = vec![AtomAnswer::default(); lanes];
    for (slot, ii) in out.iter_mut().zip(plan.atoms_of(group)) {
        let i = list.ilist()[ii] as usize;
        let neighbors = list.neighbors_of(ii);
        for (lane, p) in partials.iter_mut().enumerate() {
            *p = lane_sum(src, input, i, neighbors, lane, lanes, flags);
        }
        reduce_lanes(&mut partials);

        let mut ans = partials[0];
        ans.e_vdwl *= 0.5;
        ans.e_coul *= 0.5;
        for v in &mut ans.virial {
            *v *= 0.5;
        }
        *slot = ans;
    }
}

/// Execute the whole grid, one rayon task per thread-group.
#[must_use]
pub fn run_batch(
    tables: &CoeffTables,
    input: &StepInput<'_>,
    list: &NeighborList,
    flags: EnergyFlags,
    plan: &LaunchPlan,
) -> Vec<AtomAnswer> {
    let mut out = vec![AtomAnswer::default(); plan.inum];
    out.par_chunks_mut(plan.atoms_per_block)
        .enumerate()
        .for_each(|(group, chunk)| match plan.variant {
            KernelVariant::Fast => {
                let shared = SharedCoeffs::load(tables);
                run_group(&shared, input, list, flags, plan, group, chunk);
            }
            KernelVariant::General => {
                run_group(&GlobalCoeffs::new(tables), input, list, flags, plan, group, chunk);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeff::{GlobalParams, HostCoefficients, Layout};
    use crate::neighbor::encode;
    use crate::tolerances;

    fn lj_tables() -> CoeffTables {
        let mut h = HostCoefficients::new(1);
        h.set_cutoff(0, 0, 3.0).set_lj(0, 0, 1.0, 1.0, 3.0, false);
        CoeffTables::pack_global(&h, &GlobalParams::new(DsfParams::default())).unwrap()
    }

    #[test]
    fn two_atoms_obey_newton_third_law() {
        let tables = lj_tables();
        let positions = [[0.0, 0.0, 0.0], [1.2, 0.3, -0.1]];
        let input = StepInput::new(&positions, &[0, 0], &[0.0, 0.0]).unwrap();
        let list = NeighborList::from_lists(&[vec![1], vec![0]]);
        let plan = LaunchPlan::new(2, 64, 1, Layout::Global).unwrap();
        let out = run_batch(&tables, &input, &list, EnergyFlags::ALL, &plan);
        for d in 0..3 {
            assert!((out[0].force[d] + out[1].force[d]).abs() < tolerances::EXACT_F64);
        }
        // Half-counting: each atom carries half the pair energy.
        assert!((out[0].e_vdwl - out[1].e_vdwl).abs() < tolerances::EXACT_F64);
        let c = tables.record(0, 0);
        let r2: f64 = 1.2 * 1.2 + 0.3 * 0.3 + 0.1 * 0.1;
        let pair = potential::evaluate(r2, &c, 0.0, 1.0, 1.0, &DsfParams::default());
        assert!((out[0].e_vdwl + out[1].e_vdwl - pair.e_vdwl).abs() < tolerances::EXACT_F64);
    }

    #[test]
    fn flags_gate_energy_and_virial() {
        let tables = lj_tables();
        let positions = [[0.0, 0.0, 0.0], [1.1, 0.0, 0.0]];
        let input = StepInput::new(&positions, &[0, 0], &[0.0, 0.0]).unwrap();
        let list = NeighborList::from_lists(&[vec![1], vec![0]]);
        let plan = LaunchPlan::new(2, 64, 1, Layout::Global).unwrap();
        let out = run_batch(&tables, &input, &list, EnergyFlags::FORCES_ONLY, &plan);
        assert_eq!(out[0].e_vdwl, 0.0);
        assert_eq!(out[0].virial, [0.0; 6]);
        assert!(out[0].force[0] != 0.0);
    }

    #[test]
    fn lane_tree_reduction_sums_all_partials() {
        let mut partials: Vec<AtomAnswer> = (0..8)
            .map(|k| AtomAnswer {
                e_vdwl: f64::from(k),
                ..AtomAnswer::default()
            })
            .collect();
        reduce_lanes(&mut partials);
        assert_eq!(partials[0].e_vdwl, 28.0);
    }

    #[test]
    fn special_order_reaches_factors() {
        let tables = {
            let mut h = HostCoefficients::new(1);
            h.set_cutoff(0, 0, 3.0).set_lj(0, 0, 1.0, 1.0, 3.0, false);
            let g = GlobalParams::new(DsfParams::default())
                .with_special([1.0, 0.0, 0.0, 0.0], [1.0; 4]);
            CoeffTables::pack_global(&h, &g).unwrap()
        };
        let positions = [[0.0, 0.0, 0.0], [1.1, 0.0, 0.0]];
        let input = StepInput::new(&positions, &[0, 0], &[0.0, 0.0]).unwrap();
        let list = NeighborList::from_lists(&[vec![encode(1, 1)], vec![encode(0, 1)]]);
        let plan = LaunchPlan::new(2, 64, 2, Layout::Global).unwrap();
        let out = run_batch(&tables, &input, &list, EnergyFlags::ALL, &plan);
        assert_eq!(out[0], AtomAnswer::default());
    }

    #[test]
    fn step_input_rejects_mismatched_arrays() {
        let positions = [[0.0; 3]; 2];
        assert!(StepInput::new(&positions, &[0], &[0.0, 0.0]).is_err());
    }
}
