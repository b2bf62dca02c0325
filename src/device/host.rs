// SPDX-License-Identifier: AGPL-3.0-only

//! Host execution of the pair-kernel grid on rayon worker threads.
//!
//! Each thread-group becomes one rayon task over its own slice of output
//! slots; the fast variant copies the tables into task-local storage the
//! way a GPU group fills shared memory. This device is the parity
//! reference for the GPU backend.

use std::sync::Arc;

use super::{DeviceCaps, PairDevice};
use crate::coeff::CoeffTables;
use crate::error::EngineError;
use crate::kernel::{self, AtomAnswer, EnergyFlags, StepInput};
use crate::launch::LaunchPlan;
use crate::neighbor::NeighborList;

/// Rayon-backed [`PairDevice`].
#[derive(Debug)]
pub struct HostDevice {
    caps: DeviceCaps,
    tables: Option<Arc<CoeffTables>>,
    pool: Option<rayon::ThreadPool>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    /// Default capabilities on the global rayon pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCaps::default())
    }

    /// Emulate a device with the given limits.
    #[must_use]
    pub const fn with_capabilities(caps: DeviceCaps) -> Self {
        Self {
            caps,
            tables: None,
            pool: None,
        }
    }

    /// Run thread-groups on a dedicated pool of `threads` workers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DeviceCreation`] if the pool cannot start.
    pub fn with_threads(mut self, threads: usize) -> Result<Self, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|k| format!("dsf-host-{k}"))
            .build()
            .map_err(|e| EngineError::DeviceCreation(e.to_string()))?;
        self.pool = Some(pool);
        Ok(self)
    }

    /// Whether tables are resident.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.tables.is_some()
    }
}

impl PairDevice for HostDevice {
    fn name(&self) -> &str {
        "host (rayon)"
    }

    fn capabilities(&self) -> DeviceCaps {
        self.caps
    }

    fn load_tables(&mut self, tables: Arc<CoeffTables>) -> Result<(), EngineError> {
        let requested = tables.device_bytes() as u64;
        if requested > self.caps.max_table_bytes {
            return Err(EngineError::OutOfMemory {
                requested,
                limit: self.caps.max_table_bytes,
            });
        }
        self.tables = Some(tables);
        Ok(())
    }

    fn release(&mut self) {
        self.tables = None;
    }

    fn run(
        &mut self,
        input: &StepInput<'_>,
        list: &NeighborList,
        flags: EnergyFlags,
        plan: &LaunchPlan,
    ) -> Result<Vec<AtomAnswer>, EngineError> {
        let tables = self.tables.as_deref().ok_or(EngineError::NotInitialized)?;
        let batch = || kernel::run_batch(tables, input, list, flags, plan);
        Ok(match &self.pool {
            Some(pool) => pool.install(batch),
            None => batch(),
        })
    }
}
