//! Affine transform kernels: `y = a * x + b` over `f32` samples.
//!
//! [`ScalarKernel`] runs anywhere and takes any length. [`Simd128Kernel`] is
//! only compiled for targets with a 128-bit vector unit and processes groups
//! of 32 samples; callers must hand it at least two groups. Both do a separate
//! multiply and add (no fused rounding), so their outputs are bit-identical.

use std::fmt::Debug;

/// One strategy for computing the affine transform.
pub trait AffineKernel: Debug + Default + Copy + Send + Sync + 'static {
    /// Short name for logs.
    const NAME: &'static str;
    /// Smallest length `apply` accepts.
    const MIN_ITEMS: usize;
    /// `apply` lengths must be multiples of this.
    const ITEM_MULTIPLE: usize;

    /// Whether `len` samples can be processed in one call.
    fn accepts(len: usize) -> bool {
        len >= Self::MIN_ITEMS && len % Self::ITEM_MULTIPLE == 0
    }

    /// Write `a * input[i] + b` to `output[i]`.
    ///
    /// # Panics
    /// If the slices differ in length or the length is not accepted.
    fn apply(&self, a: f32, b: f32, input: &[f32], output: &mut [f32]);
}

/// Element-by-element loop; correct for any length.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScalarKernel;

impl AffineKernel for ScalarKernel {
    const NAME: &'static str = "scalar";
    const MIN_ITEMS: usize = 1;
    const ITEM_MULTIPLE: usize = 1;

    #[inline]
    fn apply(&self, a: f32, b: f32, input: &[f32], output: &mut [f32]) {
        assert_eq!(input.len(), output.len());
        for (&x, y) in input.iter().zip(output.iter_mut()) {
            *y = a * x + b;
        }
    }
}

/// Samples per vector group.
pub const SIMD_GROUP: usize = 32;

/// 128-bit SIMD kernel (NEON on aarch64, SSE on x86_64).
#[cfg(any(target_arch = "aarch64", target_arch = "x86_64"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Simd128Kernel;

#[cfg(any(target_arch = "aarch64", target_arch = "x86_64"))]
impl AffineKernel for Simd128Kernel {
    const NAME: &'static str = "simd128";
    const MIN_ITEMS: usize = 2 * SIMD_GROUP;
    const ITEM_MULTIPLE: usize = SIMD_GROUP;

    #[inline]
    fn apply(&self, a: f32, b: f32, input: &[f32], output: &mut [f32]) {
        assert_eq!(input.len(), output.len());
        assert!(
            Self::accepts(input.len()),
            "simd128 kernel needs a multiple of {SIMD_GROUP} and at least {} samples, got {}",
            Self::MIN_ITEMS,
            input.len()
        );
        for (src, dst) in input
            .chunks_exact(SIMD_GROUP)
            .zip(output.chunks_exact_mut(SIMD_GROUP))
        {
            simd::group(a, b, src, dst);
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod simd {
    use super::SIMD_GROUP;
    use std::arch::aarch64::{vaddq_f32, vdupq_n_f32, vld1q_f32, vmulq_n_f32, vst1q_f32};

    #[inline(always)]
    pub(super) fn group(a: f32, b: f32, src: &[f32], dst: &mut [f32]) {
        debug_assert!(src.len() == SIMD_GROUP && dst.len() == SIMD_GROUP);
        // SAFETY: NEON is part of the aarch64 baseline; every pointer stays
        // inside the 32-element chunks checked above.
        unsafe {
            let vb = vdupq_n_f32(b);
            for lane in (0..SIMD_GROUP).step_by(4) {
                let x = vld1q_f32(src.as_ptr().add(lane));
                vst1q_f32(dst.as_mut_ptr().add(lane), vaddq_f32(vmulq_n_f32(x, a), vb));
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod simd {
    use super::SIMD_GROUP;
    use std::arch::x86_64::{_mm_add_ps, _mm_loadu_ps, _mm_mul_ps, _mm_set1_ps, _mm_storeu_ps};

    #[inline(always)]
    pub(super) fn group(a: f32, b: f32, src: &[f32], dst: &mut [f32]) {
        debug_assert!(src.len() == SIMD_GROUP && dst.len() == SIMD_GROUP);
        // SAFETY: SSE is part of the x86_64 baseline; every pointer stays
        // inside the 32-element chunks checked above.
        unsafe {
            let va = _mm_set1_ps(a);
            let vb = _mm_set1_ps(b);
            for lane in (0..SIMD_GROUP).step_by(4) {
                let x = _mm_loadu_ps(src.as_ptr().add(lane));
                _mm_storeu_ps(dst.as_mut_ptr().add(lane), _mm_add_ps(_mm_mul_ps(va, x), vb));
            }
        }
    }
}

/// Fastest kernel available on the build target.
#[cfg(any(target_arch = "aarch64", target_arch = "x86_64"))]
pub type DefaultKernel = Simd128Kernel;

/// Fastest kernel available on the build target.
#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
pub type DefaultKernel = ScalarKernel;
