// SPDX-License-Identifier: AGPL-3.0-only

//! Launch geometry and kernel-variant selection.
//!
//! A thread-group of `BX` threads serves `BX / T` atoms with `T` lanes each,
//! so `GX = ceil(inum / (BX / T))` groups cover the batch.

use crate::coeff::Layout;
use crate::error::EngineError;

/// Which pair kernel runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelVariant {
    /// Coefficients cached in thread-group storage.
    Fast,
    /// Coefficients read from global tables.
    General,
}

impl From<Layout> for KernelVariant {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Shared => Self::Fast,
            Layout::Global => Self::General,
        }
    }
}

/// Grid for one pair-kernel launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchPlan {
    pub inum: usize,
    pub block_size: usize,
    pub threads_per_atom: usize,
    pub atoms_per_block: usize,
    /// Thread-groups launched (`GX`); at least 1.
    pub grid: usize,
    pub variant: KernelVariant,
}

impl LaunchPlan {
    /// Geometry for `inum` atoms.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] unless `threads_per_atom` is a
    /// power of two dividing a non-zero `block_size`.
    pub fn new(
        inum: usize,
        block_size: usize,
        threads_per_atom: usize,
        layout: Layout,
    ) -> Result<Self, EngineError> {
        check_lanes(block_size, threads_per_atom)?;
        let atoms_per_block = block_size / threads_per_atom;
        Ok(Self {
            inum,
            block_size,
            threads_per_atom,
            atoms_per_block,
            grid: inum.div_ceil(atoms_per_block).max(1),
            variant: layout.into(),
        })
    }

    /// Atom range `[start, end)` served by thread-group `group`.
    #[must_use]
    pub fn atoms_of(&self, group: usize) -> std::ops::Range<usize> {
        let start = (group * self.atoms_per_block).min(self.inum);
        start..(start + self.atoms_per_block).min(self.inum)
    }
}

fn check_lanes(block_size: usize, threads_per_atom: usize) -> Result<(), EngineError> {
    if block_size == 0 || !threads_per_atom.is_power_of_two() || block_size % threads_per_atom != 0
    {
        return Err(EngineError::InvalidInput(format!(
            "threads per atom {threads_per_atom} must be a power of two dividing block size {block_size}"
        )));
    }
    Ok(())
}

/// Check a block size against the device limit.
///
/// # Errors
///
/// Returns [`EngineError::Unsupported`] if `block_size > max_block_size`.
pub fn check_block_size(block_size: usize, max_block_size: usize) -> Result<(), EngineError> {
    if block_size > max_block_size {
        return Err(EngineError::Unsupported(format!(
            "block size {block_size} exceeds device maximum {max_block_size}"
        )));
    }
    Ok(())
}
