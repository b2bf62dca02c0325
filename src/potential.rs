// SPDX-License-Identifier: AGPL-3.0-only

//! Per-pair potential evaluation: LJ + Morse + Buckingham + DSF Coulomb.
//!
//! The same function body runs inline in the host kernel and is mirrored
//! line-for-line by the WGSL shaders in [`crate::shaders`].
//!
//! Physics (all terms gated by the pair cutoff `cutsq` first):
//!
//! ```text
//!   LJ     E = r⁻⁶(lj3 r⁻⁶ − lj4) − offset          F/r = r⁻⁶(lj1 r⁻⁶ − lj2)/r²
//!   Morse  E = d0(e² − 2e) − offset, e = exp(−β(r − r0))   F/r = morse1(e² − e)/r
//!   Buck   E = a·exp(−r ρ⁻¹) − c r⁻⁶ − offset       F/r = (buck1 r exp − buck2 r⁻⁶)/r²
//!   DSF    E = qqrd2e qᵢqⱼ (erfc(αr)/r − e_shift − r f_shift)
//!          F = qqrd2e qᵢqⱼ (erfc(αr)/r² + 2α/√π exp(−α²r²)/r + f_shift)
//! ```
//!
//! LJ, Morse and Buckingham are scaled by the LJ special factor, DSF by the
//! Coulomb special factor. The four forms are summed unconditionally; a form
//! with zero coefficients contributes exactly zero.

use std::f64::consts::PI;

/// Number of low bits of a packed neighbor entry holding the atom index.
pub const SBBITS: u32 = 30;

/// Mask selecting the atom index from a packed neighbor entry.
pub const NEIGHMASK: u32 = (1 << SBBITS) - 1;

/// √π, as used by the DSF force derivative.
pub const MY_PIS: f64 = 1.772_453_850_905_516;

// A&S 7.1.26 rational approximation of erfc, shared with the shaders.
const EWALD_P: f64 = 0.327_591_1;
const A1: f64 = 0.254_829_592;
const A2: f64 = -0.284_496_736;
const A3: f64 = 1.421_413_741;
const A4: f64 = -1.453_152_027;
const A5: f64 = 1.061_405_429;

/// Special-bond order encoded in the top bits of a neighbor entry.
#[inline]
#[must_use]
pub const fn sbmask(j: u32) -> usize {
    (j >> SBBITS) as usize & 3
}

/// Coefficients of one type pair, unpacked from the device tables.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairCoeffs {
    pub lj1: f64,
    pub lj2: f64,
    pub lj3: f64,
    pub lj4: f64,
    pub lj_offset: f64,
    pub cut_lj_sq: f64,
    /// Global pair cutoff²; no term contributes beyond it.
    pub cutsq: f64,
    pub morse1: f64,
    pub r0: f64,
    pub beta: f64,
    pub d0: f64,
    pub morse_offset: f64,
    pub rhoinv: f64,
    pub buck1: f64,
    pub buck2: f64,
    pub a: f64,
    pub c: f64,
    pub buck_offset: f64,
}

impl PairCoeffs {
    /// Unpack the six `[f64; 4]` device table entries of one type pair.
    ///
    /// Order: `lj1, lj3, mor1, mor2, coeff1, coeff2` (see [`crate::coeff`]).
    #[must_use]
    pub const fn from_packed(p: &[[f64; 4]; 6]) -> Self {
        let [lj1, lj3, mor1, mor2, coeff1, coeff2] = *p;
        Self {
            lj1: lj1[0],
            lj2: lj1[1],
            cut_lj_sq: lj1[2],
            cutsq: lj1[3],
            lj3: lj3[0],
            lj4: lj3[1],
            lj_offset: lj3[2],
            morse1: mor1[1],
            r0: mor1[2],
            beta: mor1[3],
            d0: mor2[0],
            morse_offset: mor2[1],
            rhoinv: coeff1[0],
            buck1: coeff1[1],
            buck2: coeff1[2],
            a: coeff2[0],
            c: coeff2[1],
            buck_offset: coeff2[2],
        }
    }
}

/// Scalars of the DSF Coulomb term shared by every type pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DsfParams {
    pub cut_coulsq: f64,
    pub qqrd2e: f64,
    pub e_shift: f64,
    pub f_shift: f64,
    pub alpha: f64,
}

impl DsfParams {
    /// DSF parameters with shifts derived from `alpha` and the cutoff.
    #[must_use]
    pub fn new(alpha: f64, cut_coul: f64, qqrd2e: f64) -> Self {
        let shift = DsfShift::new(alpha, cut_coul);
        Self {
            cut_coulsq: cut_coul * cut_coul,
            qqrd2e,
            e_shift: shift.e_shift,
            f_shift: shift.f_shift,
            alpha,
        }
    }
}

/// Energy and force shifts that make the DSF term vanish at the cutoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DsfShift {
    pub e_shift: f64,
    pub f_shift: f64,
}

impl DsfShift {
    /// Shifts for damping `alpha` and Coulomb cutoff `cut_coul` (exact erfc).
    #[must_use]
    pub fn new(alpha: f64, cut_coul: f64) -> Self {
        let erfcc = statrs::function::erf::erfc(alpha * cut_coul);
        let erfcd = (-alpha * alpha * cut_coul * cut_coul).exp();
        let f_shift = -(erfcc / (cut_coul * cut_coul) + 2.0 / MY_PIS * alpha * erfcd / cut_coul);
        let e_shift = erfcc / cut_coul - f_shift * cut_coul;
        Self { e_shift, f_shift }
    }
}

/// Contribution of one neighbor to atom `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairTerms {
    /// |F|/r; multiply by the separation vector to get the force on `i`.
    pub force_over_r: f64,
    /// LJ + Morse + Buckingham pair energy (not half-counted).
    pub e_vdwl: f64,
    /// DSF Coulomb pair energy (not half-counted).
    pub e_coul: f64,
}

impl PairTerms {
    pub const ZERO: Self = Self {
        force_over_r: 0.0,
        e_vdwl: 0.0,
        e_coul: 0.0,
    };
}

/// erfc(αr) by the five-term rational approximation, given `exp(−α²r²)`.
#[inline]
#[must_use]
pub fn erfc_poly(alpha_r: f64, erfcd: f64) -> f64 {
    let t = 1.0 / EWALD_P.mul_add(alpha_r, 1.0);
    t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5)))) * erfcd
}

/// Evaluate every active term for one pair at squared separation `r2`.
///
/// `qiqj` is the charge product, `factor_lj`/`factor_coul` the special
/// factors for the pair's bond order. `r2` must be non-zero; neighbor lists
/// never contain self pairs.
#[inline]
#[must_use]
pub fn evaluate(
    r2: f64,
    c: &PairCoeffs,
    qiqj: f64,
    factor_lj: f64,
    factor_coul: f64,
    dsf: &DsfParams,
) -> PairTerms {
    if r2 >= c.cutsq {
        return PairTerms::ZERO;
    }

    let r2inv = 1.0 / r2;
    let r = r2.sqrt();
    let r6inv = r2inv * r2inv * r2inv;

    let mut force_over_r = 0.0;
    let mut e_vdwl = 0.0;

    if r2 < c.cut_lj_sq {
        let forcelj = r6inv * (c.lj1 * r6inv - c.lj2);
        force_over_r += factor_lj * forcelj * r2inv;
        e_vdwl += factor_lj * (r6inv * (c.lj3 * r6inv - c.lj4) - c.lj_offset);
    }

    // Morse and Buckingham share the pair cutoff already checked above.
    let dexp = (-c.beta * (r - c.r0)).exp();
    force_over_r += factor_lj * c.morse1 * (dexp * dexp - dexp) / r;
    e_vdwl += factor_lj * (c.d0 * (dexp * dexp - 2.0 * dexp) - c.morse_offset);

    let rexp = (-r * c.rhoinv).exp();
    let forcebuck = c.buck1 * r * rexp - c.buck2 * r6inv;
    force_over_r += factor_lj * forcebuck * r2inv;
    e_vdwl += factor_lj * (c.a * rexp - c.c * r6inv - c.buck_offset);

    let mut e_coul = 0.0;
    if r2 < dsf.cut_coulsq {
        let prefactor = dsf.qqrd2e * qiqj / r;
        let erfcd = (-dsf.alpha * dsf.alpha * r2).exp();
        let erfcc = erfc_poly(dsf.alpha * r, erfcd);
        let mut forcecoul =
            prefactor * (erfcc / r + 2.0 * dsf.alpha / MY_PIS * erfcd + r * dsf.f_shift) * r;
        let mut ecoul = prefactor * (erfcc - r * dsf.e_shift - r2 * dsf.f_shift);
        if factor_coul < 1.0 {
            // Excluded share comes off force and energy alike.
            let excluded = 1.0 - factor_coul;
            forcecoul -= excluded * forcecoul;
            ecoul -= excluded * ecoul;
        }
        force_over_r += forcecoul * r2inv;
        e_coul = ecoul;
    }

    PairTerms {
        force_over_r,
        e_vdwl,
        e_coul,
    }
}

/// Lennard-Jones coefficients `(lj1, lj2, lj3, lj4)` from σ and ε.
#[must_use]
pub fn lj_coefficients(epsilon: f64, sigma: f64) -> [f64; 4] {
    let s6 = sigma.powi(6);
    let s12 = s6 * s6;
    [
        48.0 * epsilon * s12,
        24.0 * epsilon * s6,
        4.0 * epsilon * s12,
        4.0 * epsilon * s6,
    ]
}

/// LJ energy at the cutoff, the usual `offset` for a shifted LJ.
#[must_use]
pub fn lj_offset(epsilon: f64, sigma: f64, cut: f64) -> f64 {
    let ratio = (sigma / cut).powi(6);
    4.0 * epsilon * (ratio * ratio - ratio)
}

/// Morse force prefactor `2·D0·α`.
#[must_use]
pub fn morse1(d0: f64, alpha: f64) -> f64 {
    2.0 * d0 * alpha
}

/// Buckingham coefficients `(rhoinv, buck1, buck2)` from `A`, `ρ`, `C`.
#[must_use]
pub fn buck_coefficients(a: f64, rho: f64, c: f64) -> [f64; 3] {
    [1.0 / rho, a / rho, 6.0 * c]
}

/// Exact-erfc reference DSF energy and force magnitude, for validation.
#[must_use]
pub fn dsf_reference(r: f64, qiqj: f64, dsf: &DsfParams) -> (f64, f64) {
    let erfcc = statrs::function::erf::erfc(dsf.alpha * r);
    let erfcd = (-dsf.alpha * dsf.alpha * r * r).exp();
    let energy = dsf.qqrd2e * qiqj * (erfcc / r - dsf.e_shift - r * dsf.f_shift);
    let force = dsf.qqrd2e
        * qiqj
        * (erfcc / (r * r) + 2.0 * dsf.alpha / PI.sqrt() * erfcd / r + dsf.f_shift);
    (energy, force)
}
