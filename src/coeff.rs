// SPDX-License-Identifier: AGPL-3.0-only

//! Type-pair coefficient tables and their device packing.
//!
//! The host describes the force field as zero-based `ntypes × ntypes`
//! symmetric tables ([`HostCoefficients`]). [`CoeffTables::pack`] folds them
//! into six `[f64; 4]` tables of extent `lj_types²`:
//!
//! | table    | x        | y        | z         | w       |
//! |----------|----------|----------|-----------|---------|
//! | `lj1`    | lj1      | lj2      | cut_ljsq  | cutsq   |
//! | `lj3`    | lj3      | lj4      | offset    | 0       |
//! | `mor1`   | cutsq    | morse1   | r0        | beta    |
//! | `mor2`   | d0       | offset   | 0         | 0       |
//! | `coeff1` | rhoinv   | buck1    | buck2     | cutsq   |
//! | `coeff2` | a        | c        | offset    | 0       |
//!
//! plus an 8-entry special-factor table (`special_lj[0..4]`, then
//! `special_coul[0..4]`).
//!
//! When the type count fits the device's shared capacity, `lj_types` is
//! padded up to that capacity and the fast (`Shared`) layout is used;
//! padding entries are zero and contribute nothing because their cutoffs
//! are zero.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::potential::{self, DsfParams, PairCoeffs};

/// Number of `[f64; 4]` coefficient tables per type pair.
pub const TABLES_PER_PAIR: usize = 6;

/// Byte size of one packed table entry.
const ENTRY_BYTES: usize = std::mem::size_of::<[f64; 4]>();

// ═══════════════════════════════════════════════════════════════════
// Host-side input
// ═══════════════════════════════════════════════════════════════════

/// Zero-based, row-major `ntypes × ntypes` table of one coefficient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTypePairTable")]
pub struct TypePairTable {
    ntypes: usize,
    values: Vec<f64>,
}

/// Unchecked wire form of [`TypePairTable`].
#[derive(Deserialize)]
struct RawTypePairTable {
    ntypes: usize,
    values: Vec<f64>,
}

impl TryFrom<RawTypePairTable> for TypePairTable {
    type Error = EngineError;

    fn try_from(raw: RawTypePairTable) -> Result<Self, Self::Error> {
        Self::from_row_major(raw.ntypes, raw.values)
    }
}

impl TypePairTable {
    /// All-zero table.
    #[must_use]
    pub fn zeros(ntypes: usize) -> Self {
        Self {
            ntypes,
            values: vec![0.0; ntypes * ntypes],
        }
    }

    /// Build from a row-major slice.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if `values.len() != ntypes²`.
    pub fn from_row_major(ntypes: usize, values: Vec<f64>) -> Result<Self, EngineError> {
        if values.len() != ntypes * ntypes {
            return Err(EngineError::InvalidInput(format!(
                "type-pair table has {} entries, expected {ntypes}² = {}",
                values.len(),
                ntypes * ntypes
            )));
        }
        Ok(Self { ntypes, values })
    }

    #[must_use]
    pub const fn ntypes(&self) -> usize {
        self.ntypes
    }

    /// Value for type pair `(i, j)`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is not below `ntypes`.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.ntypes && j < self.ntypes, "type index out of range");
        self.values[i * self.ntypes + j]
    }

    /// Set `(i, j)` and `(j, i)`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is not below `ntypes`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(i < self.ntypes && j < self.ntypes, "type index out of range");
        self.values[i * self.ntypes + j] = value;
        self.values[j * self.ntypes + i] = value;
    }

    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        (0..self.ntypes).all(|i| (0..i).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

/// Per-type-pair force-field parameters as the host pair style holds them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostCoefficients {
    pub ntypes: usize,
    pub cutsq: TypePairTable,
    pub cut_ljsq: TypePairTable,
    pub lj1: TypePairTable,
    pub lj2: TypePairTable,
    pub lj3: TypePairTable,
    pub lj4: TypePairTable,
    /// Energy shift of the pair's short-range term at the cutoff.
    pub offset: TypePairTable,
    pub morse1: TypePairTable,
    pub r0: TypePairTable,
    pub beta: TypePairTable,
    pub d0: TypePairTable,
    pub rhoinv: TypePairTable,
    pub buck1: TypePairTable,
    pub buck2: TypePairTable,
    pub a: TypePairTable,
    pub c: TypePairTable,
}

impl HostCoefficients {
    /// Non-interacting force field for `ntypes` atom types.
    #[must_use]
    pub fn new(ntypes: usize) -> Self {
        let z = || TypePairTable::zeros(ntypes);
        Self {
            ntypes,
            cutsq: z(),
            cut_ljsq: z(),
            lj1: z(),
            lj2: z(),
            lj3: z(),
            lj4: z(),
            offset: z(),
            morse1: z(),
            r0: z(),
            beta: z(),
            d0: z(),
            rhoinv: z(),
            buck1: z(),
            buck2: z(),
            a: z(),
            c: z(),
        }
    }

    /// Global pair cutoff for `(i, j)`; gates every term.
    pub fn set_cutoff(&mut self, i: usize, j: usize, cut: f64) -> &mut Self {
        self.cutsq.set(i, j, cut * cut);
        self
    }

    /// Lennard-Jones 12-6 with its own cutoff. `shift` stores the energy at
    /// `cut_lj` as the pair offset.
    pub fn set_lj(
        &mut self,
        i: usize,
        j: usize,
        epsilon: f64,
        sigma: f64,
        cut_lj: f64,
        shift: bool,
    ) -> &mut Self {
        let [lj1, lj2, lj3, lj4] = potential::lj_coefficients(epsilon, sigma);
        self.lj1.set(i, j, lj1);
        self.lj2.set(i, j, lj2);
        self.lj3.set(i, j, lj3);
        self.lj4.set(i, j, lj4);
        self.cut_ljsq.set(i, j, cut_lj * cut_lj);
        if shift {
            self.offset
                .set(i, j, potential::lj_offset(epsilon, sigma, cut_lj));
        }
        self
    }

    /// Morse `D0 [e^{-2α(r-r0)} − 2 e^{-α(r-r0)}]`.
    pub fn set_morse(&mut self, i: usize, j: usize, d0: f64, alpha: f64, r0: f64) -> &mut Self {
        self.morse1.set(i, j, potential::morse1(d0, alpha));
        self.d0.set(i, j, d0);
        self.r0.set(i, j, r0);
        self.beta.set(i, j, alpha);
        self
    }

    /// Buckingham `A e^{-r/ρ} − C/r⁶`.
    pub fn set_buck(&mut self, i: usize, j: usize, a: f64, rho: f64, c: f64) -> &mut Self {
        let [rhoinv, buck1, buck2] = potential::buck_coefficients(a, rho, c);
        self.rhoinv.set(i, j, rhoinv);
        self.buck1.set(i, j, buck1);
        self.buck2.set(i, j, buck2);
        self.a.set(i, j, a);
        self.c.set(i, j, c);
        self
    }

    /// Explicit energy shift for `(i, j)`.
    pub fn set_offset(&mut self, i: usize, j: usize, offset: f64) -> &mut Self {
        self.offset.set(i, j, offset);
        self
    }

    fn tables(&self) -> [(&'static str, &TypePairTable); 16] {
        [
            ("cutsq", &self.cutsq),
            ("cut_ljsq", &self.cut_ljsq),
            ("lj1", &self.lj1),
            ("lj2", &self.lj2),
            ("lj3", &self.lj3),
            ("lj4", &self.lj4),
            ("offset", &self.offset),
            ("morse1", &self.morse1),
            ("r0", &self.r0),
            ("beta", &self.beta),
            ("d0", &self.d0),
            ("rhoinv", &self.rhoinv),
            ("buck1", &self.buck1),
            ("buck2", &self.buck2),
            ("a", &self.a),
            ("c", &self.c),
        ]
    }

    /// Check extents, symmetry, and finiteness of every table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] naming the first bad table.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.ntypes == 0 {
            return Err(EngineError::InvalidInput("ntypes must be positive".into()));
        }
        for (name, table) in self.tables() {
            if table.ntypes() != self.ntypes || table.values.len() != self.ntypes * self.ntypes {
                return Err(EngineError::InvalidInput(format!(
                    "table {name} sized for {} types with {} entries, expected {}",
                    table.ntypes(),
                    table.values.len(),
                    self.ntypes
                )));
            }
            if !table.is_symmetric() {
                return Err(EngineError::InvalidInput(format!(
                    "table {name} is not symmetric"
                )));
            }
            if table.values.iter().any(|v| !v.is_finite()) {
                return Err(EngineError::InvalidInput(format!(
                    "table {name} has non-finite entries"
                )));
            }
        }
        Ok(())
    }
}

/// Scalars shared by every type pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalParams {
    pub dsf: DsfParams,
    /// LJ-family scale for neighbor order none / 1-2 / 1-3 / 1-4.
    pub special_lj: [f64; 4],
    pub special_coul: [f64; 4],
}

impl GlobalParams {
    /// No bonded exclusions: every special factor is 1.
    #[must_use]
    pub const fn new(dsf: DsfParams) -> Self {
        Self {
            dsf,
            special_lj: [1.0; 4],
            special_coul: [1.0; 4],
        }
    }

    #[must_use]
    pub const fn with_special(mut self, special_lj: [f64; 4], special_coul: [f64; 4]) -> Self {
        self.special_lj = special_lj;
        self.special_coul = special_coul;
        self
    }

    /// The 8-entry special table in device order.
    #[must_use]
    pub fn sp_lj(&self) -> [f64; 8] {
        let mut out = [0.0; 8];
        out[..4].copy_from_slice(&self.special_lj);
        out[4..].copy_from_slice(&self.special_coul);
        out
    }
}

// ═══════════════════════════════════════════════════════════════════
// Layout selection
// ═══════════════════════════════════════════════════════════════════

/// Where the kernel reads coefficients from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Tables cached per thread-group; `lj_types` padded to the capacity.
    Shared,
    /// Tables read from global memory with stride `ntypes`.
    Global,
}

/// Pick the layout and table extent for `ntypes` on a device.
///
/// Falls back to [`Layout::Global`] rather than erroring when the types do
/// not fit or the thread-group is narrower than the shared capacity.
#[must_use]
pub fn choose_layout(ntypes: usize, max_shared_types: usize, block_size: usize) -> (Layout, usize) {
    if max_shared_types > 0 && ntypes <= max_shared_types && block_size >= max_shared_types {
        (Layout::Shared, max_shared_types)
    } else {
        (Layout::Global, ntypes)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Packing
// ═══════════════════════════════════════════════════════════════════

/// Pack up to four host tables into one `[f64; 4]` entry per type pair.
///
/// `None` slots and every entry outside `ntypes × ntypes` are zero.
#[must_use]
pub fn type_pack4(lj_types: usize, ntypes: usize, src: [Option<&TypePairTable>; 4]) -> Vec<[f64; 4]> {
    let mut out = vec![[0.0; 4]; lj_types * lj_types];
    for i in 0..ntypes {
        for j in 0..ntypes {
            let entry = &mut out[i * lj_types + j];
            for (slot, table) in entry.iter_mut().zip(src) {
                if let Some(t) = table {
                    *slot = t.get(i, j);
                }
            }
        }
    }
    out
}

/// Two-table variant of [`type_pack4`]; slots `z` and `w` stay zero.
#[must_use]
pub fn type_pack2(lj_types: usize, ntypes: usize, x: &TypePairTable, y: &TypePairTable) -> Vec<[f64; 4]> {
    type_pack4(lj_types, ntypes, [Some(x), Some(y), None, None])
}

/// Which form's offset slot receives the shared `offset` for each pair.
///
/// The first populated form in LJ → Morse → Buckingham order gets it, so
/// the unconditional sum subtracts the shift once.
fn split_offset(host: &HostCoefficients) -> [TypePairTable; 3] {
    let n = host.ntypes;
    let mut lj = TypePairTable::zeros(n);
    let mut morse = TypePairTable::zeros(n);
    let mut buck = TypePairTable::zeros(n);
    for i in 0..n {
        for j in 0..=i {
            let offset = host.offset.get(i, j);
            if offset == 0.0 {
                continue;
            }
            let nonzero = |tables: &[&TypePairTable]| tables.iter().any(|t| t.get(i, j) != 0.0);
            let has_lj = nonzero(&[&host.lj1, &host.lj2, &host.lj3, &host.lj4]);
            let has_morse = nonzero(&[&host.morse1, &host.d0]);
            let has_buck = nonzero(&[&host.buck1, &host.buck2, &host.a, &host.c]);
            let target = if has_lj || !(has_morse || has_buck) {
                &mut lj
            } else if has_morse {
                &mut morse
            } else {
                &mut buck
            };
            target.set(i, j, offset);
        }
    }
    [lj, morse, buck]
}

/// Device-ready coefficient tables for one engine instance.
#[derive(Clone, Debug, PartialEq)]
pub struct CoeffTables {
    ntypes: usize,
    lj_types: usize,
    layout: Layout,
    pub lj1: Vec<[f64; 4]>,
    pub lj3: Vec<[f64; 4]>,
    pub mor1: Vec<[f64; 4]>,
    pub mor2: Vec<[f64; 4]>,
    pub coeff1: Vec<[f64; 4]>,
    pub coeff2: Vec<[f64; 4]>,
    pub sp_lj: [f64; 8],
    pub dsf: DsfParams,
}

impl CoeffTables {
    /// Validate `host` and pack it for a device with the given capacity.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidInput`] if the host tables are
    /// malformed. Capacity never causes an error.
    pub fn pack(
        host: &HostCoefficients,
        global: &GlobalParams,
        max_shared_types: usize,
        block_size: usize,
    ) -> Result<Self, EngineError> {
        host.validate()?;
        let ntypes = host.ntypes;
        let (layout, lj_types) = choose_layout(ntypes, max_shared_types, block_size);
        if layout == Layout::Global && max_shared_types > 0 {
            log::debug!(
                "{ntypes} types with block size {block_size} do not fit shared capacity \
                 {max_shared_types}; using global coefficient layout"
            );
        }

        let [lj_offset, morse_offset, buck_offset] = split_offset(host);
        let h = host;
        Ok(Self {
            ntypes,
            lj_types,
            layout,
            lj1: type_pack4(
                lj_types,
                ntypes,
                [Some(&h.lj1), Some(&h.lj2), Some(&h.cut_ljsq), Some(&h.cutsq)],
            ),
            lj3: type_pack4(
                lj_types,
                ntypes,
                [Some(&h.lj3), Some(&h.lj4), Some(&lj_offset), None],
            ),
            mor1: type_pack4(
                lj_types,
                ntypes,
                [Some(&h.cutsq), Some(&h.morse1), Some(&h.r0), Some(&h.beta)],
            ),
            mor2: type_pack2(lj_types, ntypes, &h.d0, &morse_offset),
            coeff1: type_pack4(
                lj_types,
                ntypes,
                [Some(&h.rhoinv), Some(&h.buck1), Some(&h.buck2), Some(&h.cutsq)],
            ),
            coeff2: type_pack4(
                lj_types,
                ntypes,
                [Some(&h.a), Some(&h.c), Some(&buck_offset), None],
            ),
            sp_lj: global.sp_lj(),
            dsf: global.dsf,
        })
    }

    /// Pack with the shared capacity disabled, forcing [`Layout::Global`].
    ///
    /// # Errors
    ///
    /// Same as [`CoeffTables::pack`].
    pub fn pack_global(host: &HostCoefficients, global: &GlobalParams) -> Result<Self, EngineError> {
        Self::pack(host, global, 0, 0)
    }

    #[must_use]
    pub const fn ntypes(&self) -> usize {
        self.ntypes
    }

    /// Row stride of every table.
    #[must_use]
    pub const fn lj_types(&self) -> usize {
        self.lj_types
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// The six packed entries of `(i, j)` in table order.
    #[must_use]
    pub fn packed(&self, i: usize, j: usize) -> [[f64; 4]; TABLES_PER_PAIR] {
        let k = i * self.lj_types + j;
        [
            self.lj1[k],
            self.lj3[k],
            self.mor1[k],
            self.mor2[k],
            self.coeff1[k],
            self.coeff2[k],
        ]
    }

    /// Logical record of `(i, j)`.
    #[must_use]
    pub fn record(&self, i: usize, j: usize) -> PairCoeffs {
        PairCoeffs::from_packed(&self.packed(i, j))
    }

    /// Whether every packed `(i, j)` equals `(j, i)`, padding included.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        (0..self.lj_types).all(|i| (0..i).all(|j| self.packed(i, j) == self.packed(j, i)))
    }

    /// Bytes the tables occupy on a device: all six packed tables plus the
    /// special factors, not only the `lj1`/`lj3` pair counted by the
    /// OpenCL/CUDA library's `_max_bytes`.
    #[must_use]
    pub fn device_bytes(&self) -> usize {
        TABLES_PER_PAIR * self.lj_types * self.lj_types * ENTRY_BYTES
            + std::mem::size_of::<[f64; 8]>()
    }

    /// All six tables concatenated table-major, as one flat `f64` buffer.
    ///
    /// Table `t`, pair `(i, j)`, component `c` is at
    /// `((t · lj_types² + i · lj_types + j) · 4 + c)`.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f64> {
        [
            &self.lj1,
            &self.lj3,
            &self.mor1,
            &self.mor2,
            &self.coeff1,
            &self.coeff2,
        ]
        .into_iter()
        .flat_map(|t| t.iter().flatten().copied())
        .collect()
    }
}
