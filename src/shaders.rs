// SPDX-License-Identifier: AGPL-3.0-only

//! WGSL sources for the f64 pair kernel.
//!
//! A kernel is assembled from three pieces: the software `exp_f64`, the
//! shared bindings + potential + neighbor loop, and one variant file that
//! supplies the coefficient lookup. The two variants differ only in where
//! `pair_coeffs()` and `special()` read from.
//!
//! Pipeline-overridable constants: `BLOCK_SIZE` (≤ [`MAX_GPU_BLOCK`]) and
//! `LANES` (threads per atom).

use crate::coeff::CoeffTables;
use crate::launch::KernelVariant;

// ═══════════════════════════════════════════════════════════════════
// Sources
// ═══════════════════════════════════════════════════════════════════

/// Software `exp()` on f64 (range reduction + Horner).
pub const MATH_F64: &str = include_str!("shaders/math_f64.wgsl");

/// Bindings, DSF/LJ/Morse/Buckingham evaluation, and the `main` entry.
pub const PAIR_COMMON_F64: &str = include_str!("shaders/pair_common_f64.wgsl");

/// Global-table coefficient lookup.
pub const PAIR_GENERAL_F64: &str = include_str!("shaders/pair_general_f64.wgsl");

/// Workgroup-cached coefficient lookup (8 types).
pub const PAIR_FAST_F64: &str = include_str!("shaders/pair_fast_f64.wgsl");

// ═══════════════════════════════════════════════════════════════════
// Layout constants shared with the host side
// ═══════════════════════════════════════════════════════════════════

/// f64 values written per atom: force₃, `e_vdwl`, `e_coul`, virial₆.
pub const ANS_STRIDE: usize = 11;

/// Length of the `scalars` buffer: five DSF scalars, padding, `sp_lj[8]`.
pub const SCALARS_LEN: usize = 16;

/// Offset of the special factors in `scalars`.
pub const SP_BASE: usize = 8;

/// Size of the workgroup reduction array; the largest usable block.
pub const MAX_GPU_BLOCK: usize = 256;

/// Type capacity of the fast variant's workgroup tables.
pub const SHARED_TYPES: usize = 8;

/// Full shader source for `variant`.
#[must_use]
pub fn pair_shader(variant: KernelVariant) -> String {
    let lookup = match variant {
        KernelVariant::Fast => PAIR_FAST_F64,
        KernelVariant::General => PAIR_GENERAL_F64,
    };
    format!("{MATH_F64}\n{PAIR_COMMON_F64}\n{lookup}")
}

/// The `scalars` buffer contents for `tables`.
#[must_use]
pub fn scalars(tables: &CoeffTables) -> [f64; SCALARS_LEN] {
    let d = &tables.dsf;
    let mut out = [0.0; SCALARS_LEN];
    out[..5].copy_from_slice(&[d.cut_coulsq, d.qqrd2e, d.e_shift, d.f_shift, d.alpha]);
    out[SP_BASE..].copy_from_slice(&tables.sp_lj);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeff::{GlobalParams, HostCoefficients};
    use crate::device::MAX_SHARED_TYPES;
    use crate::potential::DsfParams;

    #[test]
    fn variants_define_lookup_functions() {
        for src in [PAIR_GENERAL_F64, PAIR_FAST_F64] {
            assert!(src.contains("fn load_shared("));
            assert!(src.contains("fn pair_coeffs("));
            assert!(src.contains("fn special("));
        }
        assert!(PAIR_FAST_F64.contains("var<workgroup> sh_coeff"));
        assert!(!PAIR_GENERAL_F64.contains("var<workgroup>"));
    }

    #[test]
    fn assembled_shader_has_entry_and_bindings() {
        for variant in [KernelVariant::Fast, KernelVariant::General] {
            let src = pair_shader(variant);
            assert!(src.contains("@compute"));
            assert!(src.contains("@workgroup_size(BLOCK_SIZE)"));
            assert!(src.contains("fn exp_f64("));
            for b in 0..=8 {
                assert!(src.contains(&format!("@binding({b})")), "binding {b}");
            }
        }
    }

    #[test]
    fn shader_constants_match_host() {
        assert!(PAIR_COMMON_F64.contains(&format!("ANS_STRIDE: u32 = {ANS_STRIDE}u")));
        assert!(PAIR_COMMON_F64.contains(&format!("SP_BASE: u32 = {SP_BASE}u")));
        assert!(PAIR_COMMON_F64.contains(&format!("array<f64, {MAX_GPU_BLOCK}>")));
        assert!(PAIR_COMMON_F64.contains("0x3FFFFFFFu"));
        assert!(PAIR_COMMON_F64.contains("EWALD_P: f64 = 0.3275911"));
        assert_eq!(SHARED_TYPES, MAX_SHARED_TYPES);
        let entries = 6 * SHARED_TYPES * SHARED_TYPES;
        assert!(PAIR_FAST_F64.contains(&format!("array<vec4<f64>, {entries}>")));
    }

    #[test]
    fn scalars_layout() {
        let g = GlobalParams::new(DsfParams::new(0.2, 10.0, 332.06371))
            .with_special([1.0, 0.0, 0.5, 0.5], [1.0, 0.0, 0.0, 0.8333]);
        let t = CoeffTables::pack_global(&HostCoefficients::new(1), &g).unwrap();
        let s = scalars(&t);
        assert_eq!(s[0], 100.0);
        assert_eq!(s[1], 332.06371);
        assert_eq!(s[4], 0.2);
        assert_eq!(s[5..8], [0.0; 3]);
        assert_eq!(s[SP_BASE..], g.sp_lj());
    }
}
