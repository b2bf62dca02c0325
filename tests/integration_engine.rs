// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: end-to-end pair scenarios through the engine.
//!
//! Two-atom systems checked against closed-form LJ, Morse, and DSF
//! Coulomb, plus special-bond scaling, overflow/retry, the positions
//! overload, work splitting, and teardown.

use morse_buck_lj_dsf::neighbor::encode;
use morse_buck_lj_dsf::potential::{dsf_reference, lj_offset};
use morse_buck_lj_dsf::{
    tolerances, DsfParams, EnergyFlags, EngineConfig, EngineError, GlobalParams,
    HostCoefficients, HostDevice, MorseBuckLjDsf, NeighborList, PairAnswers, StepInput,
    StepOutcome, Topology,
};

const R: f64 = 2.5;

fn pair_positions(r: f64) -> [[f64; 3]; 2] {
    [[0.0, 0.0, 0.0], [r, 0.0, 0.0]]
}

fn pair_list() -> NeighborList {
    NeighborList::from_lists(&[vec![1], vec![0]])
}

fn engine(coeffs: &HostCoefficients, global: &GlobalParams) -> MorseBuckLjDsf<HostDevice> {
    MorseBuckLjDsf::init(HostDevice::new(), coeffs, global, &EngineConfig::default())
        .expect("engine init")
}

fn run_pair(
    engine: &mut MorseBuckLjDsf<HostDevice>,
    r: f64,
    charges: [f64; 2],
    list: &NeighborList,
) -> PairAnswers {
    let positions = pair_positions(r);
    let input = StepInput::new(&positions, &[0, 0], &charges).expect("step input");
    engine
        .compute(&input, list, EnergyFlags::ALL)
        .expect("compute")
        .answers()
        .expect("no overflow")
}

fn no_coulomb() -> GlobalParams {
    GlobalParams::new(DsfParams::new(0.2, 10.0, 1.0))
}

#[test]
fn lennard_jones_pair_matches_closed_form() {
    let cut = 3.0;
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, cut).set_lj(0, 0, 1.0, 1.0, cut, true);
    let mut engine = engine(&coeffs, &no_coulomb());
    let ans = run_pair(&mut engine, R, [0.0, 0.0], &pair_list());

    let sr6 = R.powi(-6);
    let energy = 4.0 * (sr6 * sr6 - sr6) - lj_offset(1.0, 1.0, cut);
    let force = 24.0 * (2.0 * sr6 * sr6 - sr6) / R;

    assert!((ans.e_vdwl() - energy).abs() < tolerances::EXACT_F64);
    assert_eq!(ans.e_coul(), 0.0);
    // Force on atom 0 points along x0 - x1 = -R.
    assert!((ans.atoms[0].force[0] + force).abs() < tolerances::EXACT_F64);
    assert!((ans.atoms[1].force[0] - force).abs() < tolerances::EXACT_F64);
    assert_eq!(ans.atoms[0].force[1], 0.0);
}

#[test]
fn morse_pair_matches_closed_form() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 3.0).set_morse(0, 0, 1.0, 1.0, 2.0);
    let mut engine = engine(&coeffs, &no_coulomb());
    let ans = run_pair(&mut engine, R, [0.0, 0.0], &pair_list());

    let e1 = (-(R - 2.0)).exp();
    let energy = e1 * e1 - 2.0 * e1;
    let force = 2.0 * (e1 * e1 - e1);
    assert!((ans.e_vdwl() - energy).abs() < tolerances::EXACT_F64);
    assert!((ans.atoms[1].force[0] - force).abs() < tolerances::EXACT_F64);
}

#[test]
fn buckingham_pair_matches_closed_form() {
    let (a, rho, c) = (1000.0, 0.3, 10.0);
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 3.0).set_buck(0, 0, a, rho, c);
    let mut engine = engine(&coeffs, &no_coulomb());
    let ans = run_pair(&mut engine, R, [0.0, 0.0], &pair_list());

    let energy = a * (-R / rho).exp() - c / R.powi(6);
    let force = a / rho * (-R / rho).exp() - 6.0 * c / R.powi(7);
    assert!((ans.e_vdwl() - energy).abs() < tolerances::EXACT_F64);
    assert!((ans.atoms[1].force[0] - force).abs() < tolerances::EXACT_F64);
}

#[test]
fn dsf_coulomb_pair_matches_reference_and_vanishes_at_cutoff() {
    let cut = 10.0;
    let dsf = DsfParams::new(0.2, cut, 1.0);
    assert_eq!(dsf.cut_coulsq, 100.0);
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, cut);
    let mut engine = engine(&coeffs, &GlobalParams::new(dsf));

    let ans = run_pair(&mut engine, R, [1.0, 1.0], &pair_list());
    let (energy, force) = dsf_reference(R, 1.0, &dsf);
    assert!((ans.e_coul() - energy).abs() < tolerances::ERFC_POLY_REL * energy.abs());
    assert!((ans.atoms[1].force[0] - force).abs() < tolerances::ERFC_POLY_REL * force.abs());
    assert_eq!(ans.e_vdwl(), 0.0);

    let at_cut = run_pair(&mut engine, cut, [1.0, 1.0], &pair_list());
    assert_eq!(at_cut.e_coul(), 0.0);
    assert_eq!(at_cut.atoms[0].force, [0.0; 3]);

    let inside = run_pair(&mut engine, cut - 1e-9, [1.0, 1.0], &pair_list());
    assert!(inside.e_coul().abs() < tolerances::DSF_CUTOFF_RESIDUAL);
    assert!(inside.atoms[0].force[0].abs() < tolerances::DSF_CUTOFF_RESIDUAL);
}

#[test]
fn special_factor_zero_excludes_and_one_reproduces() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 10.0).set_lj(0, 0, 1.0, 1.0, 10.0, false);
    let dsf = DsfParams::new(0.2, 10.0, 1.0);
    let global = GlobalParams::new(dsf).with_special([1.0, 0.0, 1.0, 0.5], [1.0, 0.0, 1.0, 0.5]);
    let mut engine = engine(&coeffs, &global);

    let plain = run_pair(&mut engine, R, [1.0, -1.0], &pair_list());
    let tagged = |order| NeighborList::from_lists(&[vec![encode(1, order)], vec![encode(0, order)]]);

    let excluded = run_pair(&mut engine, R, [1.0, -1.0], &tagged(1));
    assert_eq!(excluded.e_vdwl(), 0.0);
    assert_eq!(excluded.e_coul(), 0.0);
    assert_eq!(excluded.atoms[0].force, [0.0; 3]);

    let kept = run_pair(&mut engine, R, [1.0, -1.0], &tagged(2));
    assert_eq!(kept, PairAnswers { kernel_time: kept.kernel_time, ..plain.clone() });

    let half = run_pair(&mut engine, R, [1.0, -1.0], &tagged(3));
    assert!((half.e_vdwl() - 0.5 * plain.e_vdwl()).abs() < tolerances::EXACT_F64);
    assert!((half.e_coul() - 0.5 * plain.e_coul()).abs() < tolerances::EXACT_F64);
}

#[test]
fn virial_of_pair_is_half_counted_per_atom() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 3.0).set_lj(0, 0, 1.0, 1.0, 3.0, false);
    let mut engine = engine(&coeffs, &no_coulomb());
    let ans = run_pair(&mut engine, R, [0.0, 0.0], &pair_list());

    let sr6 = R.powi(-6);
    let force_over_r = 24.0 * (2.0 * sr6 * sr6 - sr6) / (R * R);
    let w = ans.virial();
    assert!((w[0] - R * R * force_over_r).abs() < tolerances::EXACT_F64);
    assert_eq!(w[1..], [0.0; 5]);
    assert_eq!(ans.atoms[0].virial, ans.atoms[1].virial);
}

#[test]
fn overflow_needs_retry_until_capacity_grows() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 3.0).set_lj(0, 0, 1.0, 1.0, 3.0, false);
    let config = EngineConfig {
        max_neighbors: 1,
        ..EngineConfig::default()
    };
    let mut engine = MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &no_coulomb(), &config)
        .expect("engine init");

    let positions = [[0.0, 0.0, 0.0], [1.5, 0.0, 0.0], [0.0, 1.5, 0.0]];
    let input = StepInput::new(&positions, &[0; 3], &[0.0; 3]).expect("step input");
    let list = NeighborList::from_lists(&[vec![1, 2], vec![0, 2], vec![0, 1]]);

    let outcome = engine.compute(&input, &list, EnergyFlags::ALL).expect("compute");
    assert_eq!(outcome, StepOutcome::NeedsRetry { required: 2 });

    engine.reserve_neighbors(2);
    assert_eq!(engine.max_neighbors(), 2);
    let outcome = engine.compute(&input, &list, EnergyFlags::ALL).expect("compute");
    assert!(matches!(outcome, StepOutcome::Computed(_)));
}

fn lattice(n: usize, spacing: f64) -> Vec<[f64; 3]> {
    let mut out = Vec::new();
    for x in 0..n {
        for y in 0..n {
            for z in 0..n {
                let k = (x * 31 + y * 17 + z * 7) % 13;
                let jitter = (k as f64 / 13.0 - 0.5) * 0.2;
                out.push([
                    x as f64 * spacing + jitter,
                    y as f64 * spacing - jitter,
                    z as f64 * spacing + 0.5 * jitter,
                ]);
            }
        }
    }
    out
}

#[test]
fn positions_overload_matches_prebuilt_list() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 2.5).set_lj(0, 0, 1.0, 1.0, 2.5, true);
    let config = EngineConfig {
        cell_size: 2.5,
        ..EngineConfig::default()
    };
    let mut engine = MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &no_coulomb(), &config)
        .expect("engine init");

    let positions = lattice(4, 1.2);
    let n = positions.len();
    let types = vec![0; n];
    let charges = vec![0.0; n];
    let input = StepInput::new(&positions, &types, &charges).expect("step input");
    let topology = Topology::new(n);

    let built = engine
        .compute_with_build(0, &input, &topology, EnergyFlags::ALL)
        .expect("compute")
        .answers()
        .expect("no overflow");
    let list = engine.neighbor_list().expect("list built").clone();
    assert_eq!(list.inum(), n);

    let direct = engine
        .compute(&input, &list, EnergyFlags::ALL)
        .expect("compute")
        .answers()
        .expect("no overflow");
    assert_eq!(built.atoms, direct.atoms);

    // Newton's third law over a closed system.
    let mut total = [0.0; 3];
    for a in &built.atoms {
        for d in 0..3 {
            total[d] += a.force[d];
        }
    }
    assert!(total.iter().all(|f| f.abs() < 1e-9), "net force {total:?}");

    // ago > 0 reuses the list.
    let reused = engine
        .compute_with_build(3, &input, &topology, EnergyFlags::ALL)
        .expect("compute")
        .answers()
        .expect("no overflow");
    assert_eq!(engine.neighbor_list(), Some(&list));
    assert_eq!(reused.atoms, built.atoms);
}

#[test]
fn positions_overload_reports_build_overflow() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 2.5).set_lj(0, 0, 1.0, 1.0, 2.5, true);
    let config = EngineConfig {
        cell_size: 2.5,
        max_neighbors: 4,
        ..EngineConfig::default()
    };
    let mut engine = MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &no_coulomb(), &config)
        .expect("engine init");
    let positions = lattice(3, 1.0);
    let n = positions.len();
    let (types, charges) = (vec![0; n], vec![0.0; n]);
    let input = StepInput::new(&positions, &types, &charges).expect("step input");

    let outcome = engine
        .compute_with_build(0, &input, &Topology::new(n), EnergyFlags::ALL)
        .expect("compute");
    let StepOutcome::NeedsRetry { required } = outcome else {
        panic!("expected overflow, got {outcome:?}");
    };
    assert!(required > 4);
    assert!(engine.neighbor_list().is_none());

    engine.reserve_neighbors(required);
    let outcome = engine
        .compute_with_build(7, &input, &Topology::new(n), EnergyFlags::ALL)
        .expect("compute");
    assert!(matches!(outcome, StepOutcome::Computed(_)));
}

#[test]
fn special_topology_limit_is_enforced() {
    let coeffs = HostCoefficients::new(1);
    let config = EngineConfig {
        cell_size: 2.0,
        max_special: 1,
        ..EngineConfig::default()
    };
    let mut engine = MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &no_coulomb(), &config)
        .expect("engine init");
    let positions = [[0.0; 3], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
    let input = StepInput::new(&positions, &[0; 3], &[0.0; 3]).expect("step input");
    let mut topology = Topology::new(3);
    topology
        .add_special(0, 1, 1)
        .and_then(|t| t.add_special(0, 2, 2))
        .expect("valid bonds");
    let err = engine
        .compute_with_build(0, &input, &topology, EnergyFlags::ALL)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[test]
fn gpu_split_leaves_tail_for_host() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 3.0).set_lj(0, 0, 1.0, 1.0, 3.0, false);
    let config = EngineConfig {
        gpu_split: 0.5,
        ..EngineConfig::default()
    };
    let mut engine = MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &no_coulomb(), &config)
        .expect("engine init");

    let positions = [[0.0, 0.0, 0.0], [1.2, 0.0, 0.0], [2.4, 0.0, 0.0], [3.6, 0.0, 0.0], [4.8, 0.0, 0.0]];
    let input = StepInput::new(&positions, &[0; 5], &[0.0; 5]).expect("step input");
    let list = NeighborList::from_lists(&[
        vec![1, 2],
        vec![0, 2, 3],
        vec![0, 1, 3, 4],
        vec![1, 2, 4],
        vec![2, 3],
    ]);
    let ans = engine
        .compute(&input, &list, EnergyFlags::ALL)
        .expect("compute")
        .answers()
        .expect("no overflow");
    assert_eq!(ans.host_start, 3);
    assert_eq!(ans.atoms.len(), 3);
    assert_eq!(ans.ilist, vec![0, 1, 2]);

    let mut forces = vec![[0.0; 3]; 5];
    ans.scatter_forces(&mut forces);
    assert_eq!(forces[3], [0.0; 3]);
    assert_eq!(forces[0], ans.atoms[0].force);
}

#[test]
fn clear_is_idempotent_and_instances_are_independent() {
    let mut coeffs = HostCoefficients::new(1);
    coeffs.set_cutoff(0, 0, 3.0).set_lj(0, 0, 1.0, 1.0, 3.0, false);
    let mut a = engine(&coeffs, &no_coulomb());
    let mut b = engine(&coeffs, &no_coulomb());
    assert!(a.device_bytes() > 0);

    a.clear();
    a.clear();
    assert!(!a.is_initialized());
    assert!(!a.device().is_loaded());

    let ans = run_pair(&mut b, R, [0.0, 0.0], &pair_list());
    assert!(ans.e_vdwl() != 0.0);
    let positions = pair_positions(R);
    let input = StepInput::new(&positions, &[0, 0], &[0.0, 0.0]).expect("step input");
    let err = a.compute(&input, &pair_list(), EnergyFlags::ALL).unwrap_err();
    assert_eq!(err.status(), -6);
}
