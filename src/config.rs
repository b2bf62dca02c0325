// SPDX-License-Identifier: AGPL-3.0-only

//! Engine configuration: problem-size hints and launch tuning.
//!
//! Loaded from JSON (every field optional) or built in code. The
//! `DSF_THREADS_PER_ATOM` environment variable overrides the lane count,
//! which is the usual knob when tuning a new device.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Environment variable overriding [`EngineConfig::threads_per_atom`].
pub const THREADS_PER_ATOM_ENV: &str = "DSF_THREADS_PER_ATOM";

/// Setup parameters for one engine instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[must_use]
pub struct EngineConfig {
    /// Threads per thread-group (`BX`).
    pub block_size: usize,
    /// Lanes cooperating on one atom (`T`); power of two dividing `BX`.
    pub threads_per_atom: usize,
    /// Neighbor capacity per atom; exceeding it yields a retry.
    pub max_neighbors: usize,
    /// Bonded partners per atom the topology may hold.
    pub max_special: usize,
    /// Neighbor bin edge and cutoff (force cutoff plus skin).
    pub cell_size: f64,
    /// Fraction of atoms handled by the device; the rest stay on the host.
    pub gpu_split: f64,
    /// Local atoms expected per step.
    pub nlocal: usize,
    /// Local plus ghost atoms expected per step.
    pub nall: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 128,
            threads_per_atom: 4,
            max_neighbors: 300,
            max_special: 24,
            cell_size: 0.0,
            gpu_split: 1.0,
            nlocal: 0,
            nall: 0,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the file is unreadable or invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Apply [`THREADS_PER_ATOM_ENV`] if set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the variable is not an integer.
    pub fn with_env_overrides(self) -> Result<Self, EngineError> {
        match std::env::var(THREADS_PER_ATOM_ENV) {
            Ok(v) => self.with_threads_per_atom_str(&v),
            Err(_) => Ok(self),
        }
    }

    fn with_threads_per_atom_str(mut self, v: &str) -> Result<Self, EngineError> {
        self.threads_per_atom = v.trim().parse().map_err(|_| {
            EngineError::Config(format!("{THREADS_PER_ATOM_ENV}={v} is not an integer"))
        })?;
        log::debug!("threads per atom overridden to {}", self.threads_per_atom);
        Ok(self)
    }

    /// Check value ranges that do not depend on the device.
    ///
    /// Device limits (block size, shared capacity) are checked at init.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.block_size == 0 {
            return Err(EngineError::Config("block_size must be positive".into()));
        }
        if !self.threads_per_atom.is_power_of_two() || self.block_size % self.threads_per_atom != 0
        {
            return Err(EngineError::Config(format!(
                "threads_per_atom {} must be a power of two dividing block_size {}",
                self.threads_per_atom, self.block_size
            )));
        }
        if self.max_neighbors == 0 {
            return Err(EngineError::Config("max_neighbors must be positive".into()));
        }
        if !(self.gpu_split > 0.0 && self.gpu_split <= 1.0) {
            return Err(EngineError::Config(format!(
                "gpu_split {} must lie in (0, 1]",
                self.gpu_split
            )));
        }
        if !(self.cell_size >= 0.0 && self.cell_size.is_finite()) {
            return Err(EngineError::Config(format!(
                "cell_size {} must be finite and non-negative",
                self.cell_size
            )));
        }
        if self.nall < self.nlocal {
            return Err(EngineError::Config(format!(
                "nall {} smaller than nlocal {}",
                self.nall, self.nlocal
            )));
        }
        Ok(())
    }

    /// Atoms handed to the device out of `inum`: `ceil(gpu_split · inum)`.
    #[must_use]
    pub fn device_atoms(&self, inum: usize) -> usize {
        ((self.gpu_split * inum as f64).ceil() as usize).min(inum)
    }
}
