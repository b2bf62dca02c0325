// SPDX-License-Identifier: AGPL-3.0-only

//! Accelerator abstraction consumed by the engine.
//!
//! A [`PairDevice`] reports its capacity limits, holds the packed
//! coefficient tables between `load_tables` and `release`, and runs one
//! pair-kernel launch per call.
//!
//! ## Module structure
//!
//! - `host`: rayon execution of the kernel grid (always available)
//! - [`crate::gpu`]: wgpu `SHADER_F64` backend (feature `gpu`)

mod host;

pub use host::HostDevice;

use std::sync::Arc;

use crate::coeff::CoeffTables;
use crate::error::EngineError;
use crate::kernel::{AtomAnswer, EnergyFlags, StepInput};
use crate::launch::LaunchPlan;
use crate::neighbor::NeighborList;

/// Type-pair capacity of group-local coefficient storage on typical devices.
pub const MAX_SHARED_TYPES: usize = 8;

/// Limits the engine checks at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Largest type count whose tables fit group-local storage.
    pub max_shared_types: usize,
    /// Largest thread-group width.
    pub max_block_size: usize,
    /// Bytes available for coefficient tables.
    pub max_table_bytes: u64,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            max_shared_types: MAX_SHARED_TYPES,
            max_block_size: 1024,
            max_table_bytes: u64::MAX,
        }
    }
}

/// An execution target for the pair kernel.
pub trait PairDevice: Send {
    /// Human-readable device name for logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> DeviceCaps;

    /// Make `tables` resident for subsequent [`PairDevice::run`] calls.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutOfMemory`] if the tables do not fit, or a
    /// device error if upload fails.
    fn load_tables(&mut self, tables: Arc<CoeffTables>) -> Result<(), EngineError>;

    /// Drop resident tables. Safe to call repeatedly.
    fn release(&mut self);

    /// Run one launch of `plan` over the listed atoms.
    ///
    /// Returns one slot per listed atom, in `ilist` order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotInitialized`] without resident tables, or a
    /// device error if dispatch fails.
    fn run(
        &mut self,
        input: &StepInput<'_>,
        list: &NeighborList,
        flags: EnergyFlags,
        plan: &LaunchPlan,
    ) -> Result<Vec<AtomAnswer>, EngineError>;
}

impl<D: PairDevice + ?Sized> PairDevice for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn capabilities(&self) -> DeviceCaps {
        (**self).capabilities()
    }

    fn load_tables(&mut self, tables: Arc<CoeffTables>) -> Result<(), EngineError> {
        (**self).load_tables(tables)
    }

    fn release(&mut self) {
        (**self).release();
    }

    fn run(
        &mut self,
        input: &StepInput<'_>,
        list: &NeighborList,
        flags: EnergyFlags,
        plan: &LaunchPlan,
    ) -> Result<Vec<AtomAnswer>, EngineError> {
        (**self).run(input, list, flags, plan)
    }
}
