// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized numerical tolerances with their justification.
//!
//! Every threshold used by the test-suite and the parity checks lives here,
//! so no test carries an ad-hoc magic number.
//!
//! | Category | Basis | Value |
//! |----------|-------|-------|
//! | Exact f64 | same instruction order | 1e-12 |
//! | Layout parity | same math, different storage | 1e-12 |
//! | erfc polynomial | A&S 7.1.26 | 1e-6 relative |
//! | GPU vs host | different FMA contraction | 1e-9 |

// ═══════════════════════════════════════════════════════════════════
// Machine precision
// ═══════════════════════════════════════════════════════════════════

/// Tolerance for results that should agree to rounding in f64.
///
/// Closed-form LJ/Morse/Buckingham evaluations involve ~10 flops; 1e-12
/// leaves three orders of margin above accumulated ε.
pub const EXACT_F64: f64 = 1e-12;

/// Fast vs general layout parity.
///
/// The two kernel variants read the same coefficient bits from different
/// storage and accumulate in the same order, so results must match to
/// rounding.
pub const LAYOUT_PARITY: f64 = EXACT_F64;

/// Threads-per-atom parity.
///
/// Lane-strided accumulation changes summation order; the tree reduction
/// adds O(log T) roundings per component.
pub const LANE_PARITY: f64 = 1e-10;

// ═══════════════════════════════════════════════════════════════════
// Special functions
// ═══════════════════════════════════════════════════════════════════

/// Relative error of the kernel's erfc polynomial against exact erfc.
///
/// The five-term rational approximation (A&S 7.1.26) has max absolute error
/// ~1.5e-7; relative to the Coulomb magnitudes tested this stays below 1e-6.
pub const ERFC_POLY_REL: f64 = 1e-6;

/// DSF energy/force residual at the Coulomb cutoff.
///
/// With shifts computed from exact erfc and the kernel evaluated with the
/// polynomial, the residual is bounded by the polynomial error times the
/// prefactor magnitude.
pub const DSF_CUTOFF_RESIDUAL: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════
// Device parity
// ═══════════════════════════════════════════════════════════════════

/// GPU `SHADER_F64` results against the host device.
///
/// Same IEEE 754 representation, but drivers may contract to FMA and use
/// their own `exp()`; observed differences stay below 1e-10 relative.
pub const GPU_VS_HOST_F64: f64 = 1e-9;
