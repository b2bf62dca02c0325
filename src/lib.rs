// SPDX-License-Identifier: AGPL-3.0-only

//! Accelerated LJ / Morse / Buckingham + damped-shifted-force Coulomb
//! pair forces for molecular dynamics.
//!
//! For one step the engine computes per-atom forces, van der Waals and
//! Coulomb energies, and virials from a full neighbor list:
//!
//! | Stage | Module | Runs |
//! |-------|--------|------|
//! | Coefficient packing | [`coeff`] | once at [`MorseBuckLjDsf::init`] |
//! | Pair potential | [`potential`] | inline per neighbor |
//! | Neighbor loop + lane reduction | [`kernel`], [`shaders`] | per step on the device |
//! | Grid geometry | [`launch`] | per step |
//! | Neighbor build | [`neighbor`] | when `ago == 0` |
//!
//! Devices implement [`device::PairDevice`]: [`device::HostDevice`] runs
//! the kernel grid on rayon threads; `gpu::GpuPairDevice` (feature `gpu`)
//! runs WGSL f64 shaders through wgpu.
//!
//! ```no_run
//! use morse_buck_lj_dsf::{
//!     DsfParams, EnergyFlags, EngineConfig, GlobalParams, HostCoefficients, HostDevice,
//!     MorseBuckLjDsf, NeighborList, StepInput, StepOutcome,
//! };
//!
//! # fn main() -> Result<(), morse_buck_lj_dsf::EngineError> {
//! let mut coeffs = HostCoefficients::new(1);
//! coeffs.set_cutoff(0, 0, 10.0).set_lj(0, 0, 1.0, 1.0, 10.0, true);
//! let global = GlobalParams::new(DsfParams::new(0.2, 10.0, 1.0));
//! let mut engine =
//!     MorseBuckLjDsf::init(HostDevice::new(), &coeffs, &global, &EngineConfig::default())?;
//!
//! let positions = [[0.0, 0.0, 0.0], [2.5, 0.0, 0.0]];
//! let input = StepInput::new(&positions, &[0, 0], &[1.0, -1.0])?;
//! let list = NeighborList::from_lists(&[vec![1], vec![0]]);
//! if let StepOutcome::Computed(ans) = engine.compute(&input, &list, EnergyFlags::ALL)? {
//!     println!("E_vdwl = {}, E_coul = {}", ans.e_vdwl(), ans.e_coul());
//! }
//! # Ok(())
//! # }
//! ```

pub mod coeff;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod kernel;
pub mod launch;
pub mod neighbor;
pub mod potential;
pub mod shaders;
pub mod tolerances;

pub use coeff::{CoeffTables, GlobalParams, HostCoefficients, Layout, TypePairTable};
pub use config::EngineConfig;
pub use device::{DeviceCaps, HostDevice, PairDevice};
pub use engine::{MorseBuckLjDsf, PairAnswers, StepOutcome};
pub use error::EngineError;
pub use kernel::{AtomAnswer, EnergyFlags, StepInput};
pub use launch::{KernelVariant, LaunchPlan};
pub use neighbor::{NeighborList, Topology};
pub use potential::{DsfParams, DsfShift, PairCoeffs};
