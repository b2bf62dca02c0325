// SPDX-License-Identifier: AGPL-3.0-only

//! The pair-force engine: setup, per-step compute, teardown.
//!
//! ```text
//!   init ──► pack tables ──► upload ──┐
//!                                     ▼
//!   compute ──► split ──► launch plan ──► device.run ──► PairAnswers
//!   compute_with_build ──► (ago == 0 ? rebuild : reuse) ──► compute
//! ```
//!
//! An engine owns its device and tables; several engines may coexist.
//! Runtime overflow is not an error: it returns
//! [`StepOutcome::NeedsRetry`], after which the caller grows capacity with
//! [`MorseBuckLjDsf::reserve_neighbors`] and repeats the step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::coeff::{CoeffTables, GlobalParams, HostCoefficients, Layout};
use crate::config::EngineConfig;
use crate::device::PairDevice;
use crate::error::EngineError;
use crate::kernel::{AtomAnswer, EnergyFlags, StepInput};
use crate::launch::{check_block_size, LaunchPlan};
use crate::neighbor::{decode, NeighborBuild, NeighborBuilder, NeighborList, Topology};

/// Per-atom results of one step.
#[derive(Clone, Debug, PartialEq)]
pub struct PairAnswers {
    /// One slot per device atom, in `ilist` order.
    pub atoms: Vec<AtomAnswer>,
    /// Atom index of each slot.
    pub ilist: Vec<u32>,
    /// Listed atoms from this index on were not computed and remain
    /// for the host.
    pub host_start: usize,
    /// Wall time of the pair kernel.
    pub kernel_time: Duration,
}

impl PairAnswers {
    /// Total van der Waals (LJ + Morse + Buckingham) energy.
    #[must_use]
    pub fn e_vdwl(&self) -> f64 {
        self.atoms.iter().map(|a| a.e_vdwl).sum()
    }

    /// Total DSF Coulomb energy.
    #[must_use]
    pub fn e_coul(&self) -> f64 {
        self.atoms.iter().map(|a| a.e_coul).sum()
    }

    /// Total virial `xx, yy, zz, xy, xz, yz`.
    #[must_use]
    pub fn virial(&self) -> [f64; 6] {
        let mut total = [0.0; 6];
        for a in &self.atoms {
            for (t, v) in total.iter_mut().zip(a.virial) {
                *t += v;
            }
        }
        total
    }

    /// Add computed forces into a per-atom force array.
    pub fn scatter_forces(&self, forces: &mut [[f64; 3]]) {
        for (a, &i) in self.atoms.iter().zip(&self.ilist) {
            let f = &mut forces[i as usize];
            for d in 0..3 {
                f[d] += a.force[d];
            }
        }
    }
}

/// Result of a compute call.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Computed(PairAnswers),
    /// Neighbor capacity too small; outputs were not written.
    NeedsRetry { required: usize },
}

impl StepOutcome {
    /// The answers, if the step completed.
    #[must_use]
    pub fn answers(self) -> Option<PairAnswers> {
        match self {
            Self::Computed(a) => Some(a),
            Self::NeedsRetry { .. } => None,
        }
    }
}

/// LJ / Morse / Buckingham + DSF Coulomb pair engine on device `D`.
pub struct MorseBuckLjDsf<D: PairDevice> {
    device: D,
    config: EngineConfig,
    tables: Option<Arc<CoeffTables>>,
    layout: Layout,
    lj_types: usize,
    device_bytes: usize,
    max_neighbors: usize,
    nbor: Option<NeighborList>,
    time_pair: Duration,
}

impl<D: PairDevice> MorseBuckLjDsf<D> {
    /// Pack coefficients and make them resident on `device`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] for an invalid `config`
    /// - [`EngineError::Unsupported`] if the block size exceeds the device
    /// - [`EngineError::InvalidInput`] for malformed coefficient tables
    /// - [`EngineError::OutOfMemory`] or a device error from the upload
    pub fn init(
        mut device: D,
        host: &HostCoefficients,
        global: &GlobalParams,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!("Initializing Device {} ...", device.name());

        let caps = device.capabilities();
        check_block_size(config.block_size, caps.max_block_size)?;

        let tables = Arc::new(CoeffTables::pack(
            host,
            global,
            caps.max_shared_types,
            config.block_size,
        )?);
        let layout = tables.layout();
        let lj_types = tables.lj_types();
        let device_bytes = tables.device_bytes();
        device.load_tables(Arc::clone(&tables))?;

        log::info!(
            "{}: {} types, {layout:?} layout (stride {lj_types}), {device_bytes} table bytes, \
             block {} x {} lanes",
            device.name(),
            host.ntypes,
            config.block_size,
            config.threads_per_atom
        );
        if config.nall > 0 {
            log::debug!(
                "sized for {} local / {} total atoms, {} neighbors each",
                config.nlocal,
                config.nall,
                config.max_neighbors
            );
        }

        Ok(Self {
            device,
            config: config.clone(),
            tables: Some(tables),
            layout,
            lj_types,
            device_bytes,
            max_neighbors: config.max_neighbors,
            nbor: None,
            time_pair: Duration::ZERO,
        })
    }

    /// Release device tables and cached lists. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if self.tables.take().is_some() {
            log::debug!("releasing pair tables on {}", self.device.name());
        }
        self.device.release();
        self.nbor = None;
        self.device_bytes = 0;
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.tables.is_some()
    }

    /// Compute with a caller-built neighbor list.
    ///
    /// Only the first `ceil(gpu_split · inum)` listed atoms are computed;
    /// [`PairAnswers::host_start`] marks where the rest begin.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotInitialized`] after [`MorseBuckLjDsf::clear`]
    /// - [`EngineError::InvalidInput`] for out-of-range atoms or types
    /// - a device error if the launch fails
    pub fn compute(
        &mut self,
        input: &StepInput<'_>,
        list: &NeighborList,
        flags: EnergyFlags,
    ) -> Result<StepOutcome, EngineError> {
        let ntypes = self
            .tables
            .as_ref()
            .ok_or(EngineError::NotInitialized)?
            .ntypes();
        check_step(input, list, ntypes)?;

        let required = list.max_count();
        if required > self.max_neighbors {
            log::warn!(
                "neighbor capacity {} exceeded ({required} required); step must be retried",
                self.max_neighbors
            );
            return Ok(StepOutcome::NeedsRetry { required });
        }

        let inum = list.inum();
        let host_start = self.config.device_atoms(inum);
        let split;
        let device_list = if host_start < inum {
            split = list.truncated(host_start);
            &split
        } else {
            list
        };

        let plan = LaunchPlan::new(
            host_start,
            self.config.block_size,
            self.config.threads_per_atom,
            self.layout,
        )?;
        let start = Instant::now();
        let atoms = self.device.run(input, device_list, flags, &plan)?;
        let kernel_time = start.elapsed();
        self.time_pair += kernel_time;

        Ok(StepOutcome::Computed(PairAnswers {
            atoms,
            ilist: device_list.ilist().to_vec(),
            host_start,
            kernel_time,
        }))
    }

    /// Compute from raw positions, rebuilding neighbors when `ago == 0`.
    ///
    /// Forces are computed for the topology's local atoms; every atom in
    /// `input` (locals then ghosts) is a neighbor candidate. The list used
    /// is afterwards available from [`MorseBuckLjDsf::neighbor_list`].
    ///
    /// # Errors
    ///
    /// As [`MorseBuckLjDsf::compute`], plus [`EngineError::InvalidInput`]
    /// for a topology exceeding `max_special` or a zero cell size.
    pub fn compute_with_build(
        &mut self,
        ago: u64,
        input: &StepInput<'_>,
        topology: &Topology,
        flags: EnergyFlags,
    ) -> Result<StepOutcome, EngineError> {
        if self.tables.is_none() {
            return Err(EngineError::NotInitialized);
        }
        if ago == 0 || self.nbor.is_none() {
            if topology.max_special() > self.config.max_special {
                return Err(EngineError::InvalidInput(format!(
                    "{} special partners exceed max_special {}",
                    topology.max_special(),
                    self.config.max_special
                )));
            }
            let builder = NeighborBuilder {
                cell_size: self.config.cell_size,
                max_neighbors: self.max_neighbors,
            };
            match builder.build(input.positions, topology.nlocal(), topology)? {
                NeighborBuild::Built(list) => self.nbor = Some(list),
                NeighborBuild::Overflow { required } => {
                    self.nbor = None;
                    return Ok(StepOutcome::NeedsRetry { required });
                }
            }
        }

        let list = self.nbor.take().ok_or(EngineError::NotInitialized)?;
        let outcome = self.compute(input, &list, flags);
        self.nbor = Some(list);
        outcome
    }

    /// Grow per-atom neighbor capacity after a [`StepOutcome::NeedsRetry`].
    pub fn reserve_neighbors(&mut self, required: usize) {
        if required > self.max_neighbors {
            log::debug!("neighbor capacity {} -> {required}", self.max_neighbors);
            self.max_neighbors = required;
        }
    }

    /// The list built by the last [`MorseBuckLjDsf::compute_with_build`].
    #[must_use]
    pub const fn neighbor_list(&self) -> Option<&NeighborList> {
        self.nbor.as_ref()
    }

    #[must_use]
    pub const fn max_neighbors(&self) -> usize {
        self.max_neighbors
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    #[must_use]
    pub const fn lj_types(&self) -> usize {
        self.lj_types
    }

    /// Bytes of coefficient tables resident on the device.
    #[must_use]
    pub const fn device_bytes(&self) -> usize {
        self.device_bytes
    }

    /// Host bytes held by this engine: itself, its host table copy, and the
    /// cached neighbor list.
    #[must_use]
    pub fn host_memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.tables.as_ref().map_or(0, |t| t.device_bytes())
            + self.nbor.as_ref().map_or(0, NeighborList::host_bytes)
    }

    /// Accumulated pair-kernel wall time since init.
    #[must_use]
    pub const fn time_pair(&self) -> Duration {
        self.time_pair
    }

    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<D: PairDevice> Drop for MorseBuckLjDsf<D> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Range-check a step before launch.
fn check_step(input: &StepInput<'_>, list: &NeighborList, ntypes: usize) -> Result<(), EngineError> {
    let nall = input.len();
    if let Some(&t) = input.types.iter().find(|&&t| t as usize >= ntypes) {
        return Err(EngineError::InvalidInput(format!(
            "atom type {t} out of range for {ntypes} types"
        )));
    }
    if let Some(&i) = list.ilist().iter().find(|&&i| i as usize >= nall) {
        return Err(EngineError::InvalidInput(format!(
            "listed atom {i} out of range for {nall} atoms"
        )));
    }
    if let Some(&e) = list.entries().iter().find(|&&e| decode(e).0 >= nall) {
        return Err(EngineError::InvalidInput(format!(
            "neighbor {} out of range for {nall} atoms",
            decode(e).0
        )));
    }
    Ok(())
}
