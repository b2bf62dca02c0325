// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: WGSL f64 kernels against the host reference.
//!
//! Needs an adapter with `SHADER_F64`; run with
//! `cargo test --features gpu -- --ignored`.

#![cfg(feature = "gpu")]

use morse_buck_lj_dsf::gpu::GpuPairDevice;
use morse_buck_lj_dsf::{
    tolerances, DsfParams, EnergyFlags, EngineConfig, GlobalParams, HostCoefficients,
    HostDevice, Layout, MorseBuckLjDsf, PairAnswers, PairDevice, StepInput, StepOutcome,
    Topology,
};

const CUT: f64 = 3.0;

fn coefficients(ntypes: usize) -> HostCoefficients {
    let mut h = HostCoefficients::new(ntypes);
    for i in 0..ntypes {
        for j in i..ntypes {
            h.set_cutoff(i, j, CUT);
            match (i + j) % 3 {
                0 => h.set_lj(i, j, 1.0, 1.0, CUT, true),
                1 => h.set_morse(i, j, 0.6, 1.4, 1.3),
                _ => h.set_buck(i, j, 700.0, 0.28, 3.0),
            };
        }
    }
    h
}

fn positions(n: usize) -> Vec<[f64; 3]> {
    let mut out = Vec::new();
    for x in 0..n {
        for y in 0..n {
            for z in 0..n {
                let k = (x * 5 + y * 11 + z * 3) % 7;
                let jitter = (k as f64 / 7.0 - 0.5) * 0.2;
                out.push([
                    x as f64 * 1.25 + jitter,
                    y as f64 * 1.25 - jitter,
                    z as f64 * 1.25,
                ]);
            }
        }
    }
    out
}

fn step<D: PairDevice>(engine: &mut MorseBuckLjDsf<D>, ntypes: usize) -> PairAnswers {
    let pos = positions(5);
    let n = pos.len();
    let types: Vec<u32> = (0..n).map(|i| (i % ntypes) as u32).collect();
    let charges: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 0.5 } else { -0.25 }).collect();
    let mut topology = Topology::new(n);
    for i in (0..n - 1).step_by(2) {
        topology.add_special(i, i + 1, 1).expect("valid bond");
    }
    let input = StepInput::new(&pos, &types, &charges).expect("step input");
    match engine
        .compute_with_build(0, &input, &topology, EnergyFlags::ALL)
        .expect("compute")
    {
        StepOutcome::Computed(ans) => ans,
        other => panic!("unexpected {other:?}"),
    }
}

fn assert_parity(gpu: &PairAnswers, host: &PairAnswers) {
    assert_eq!(gpu.atoms.len(), host.atoms.len());
    for (k, (g, h)) in gpu.atoms.iter().zip(&host.atoms).enumerate() {
        for d in 0..3 {
            let scale = h.force[d].abs().max(1.0);
            assert!(
                (g.force[d] - h.force[d]).abs() < tolerances::GPU_VS_HOST_F64 * scale,
                "atom {k} force[{d}]: gpu {} vs host {}",
                g.force[d],
                h.force[d]
            );
        }
        for (a, b) in g.virial.iter().zip(&h.virial) {
            assert!((a - b).abs() < tolerances::GPU_VS_HOST_F64 * b.abs().max(1.0));
        }
    }
    let tol = tolerances::GPU_VS_HOST_F64;
    assert!((gpu.e_vdwl() - host.e_vdwl()).abs() < tol * host.e_vdwl().abs().max(1.0));
    assert!((gpu.e_coul() - host.e_coul()).abs() < tol * host.e_coul().abs().max(1.0));
}

async fn compare(ntypes: usize, expected: Layout) {
    let config = EngineConfig {
        cell_size: CUT,
        ..EngineConfig::default()
    };
    let coeffs = coefficients(ntypes);
    let global = GlobalParams::new(DsfParams::new(0.2, CUT, 1.0))
        .with_special([1.0, 0.0, 0.5, 0.5], [1.0, 0.0, 0.5, 0.5]);

    let device = match GpuPairDevice::new(&config).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("skipping: {e}");
            return;
        }
    };
    let mut gpu = MorseBuckLjDsf::init(device, &coeffs, &global, &config).expect("gpu init");
    let mut host = MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &global, &config)
        .expect("host init");
    assert_eq!(gpu.layout(), expected);
    assert_eq!(host.layout(), expected);

    let g = step(&mut gpu, ntypes);
    let h = step(&mut host, ntypes);
    assert_parity(&g, &h);
}

#[tokio::test]
#[ignore = "requires GPU with SHADER_F64"]
async fn fast_variant_matches_host() {
    compare(3, Layout::Shared).await;
}

#[tokio::test]
#[ignore = "requires GPU with SHADER_F64"]
async fn general_variant_matches_host() {
    compare(11, Layout::Global).await;
}
