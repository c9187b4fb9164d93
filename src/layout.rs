//! Layout Math - logical shape to physical GPU storage
//!
//! Pure functions that derive dim orders, strides, padded sizes and image
//! extents from a tensor's sizes and packing choice. Nothing in here touches a
//! GPU object, so every function can be exercised with literal inputs.
//!
//! # Texel packing
//!
//! Tensor data stored in textures is grouped into texels of 4 scalars, and
//! tensor metadata reaches shaders as `ivec4`s. To fit both:
//!
//! 1. The rank is padded up to a multiple of 4 with leading size-1 dims.
//! 2. The packed dimension is padded up to a multiple of 4.
//!
//! ```text
//! sizes         [3, 5, 7]          (C, H, W), channels packed
//! padded_sizes  [1, 4, 5, 7]       (N, C, H, W)
//! extents       [7, 5, 1]          (X, Y, Z) = (W, H, C/4)
//! ```

use crate::types::{AxisMapLayout, MemoryLayout, BATCH_DIM, TEXEL_WIDTH};

/// Mapping from WHCN dims to texture axes.
///
/// Entries 0..3 give the texture axis (X=0, Y=1, Z=2) holding the width,
/// height and channels dims. Entry 3 is the WHCN index of the dim along which
/// batches are concatenated.
pub type AxisMap = [usize; 4];

/// Axis map used unless a tensor is transposed or built with an optimized map
pub const DEFAULT_AXIS_MAP: AxisMap = [0, 1, 2, 2];

/// Stride reported for dims that only exist because of rank padding
pub const UNSQUEEZED_STRIDE: usize = i32::MAX as usize;

/// Largest element count a 32-bit shader index can address
pub const MAX_ADDRESSABLE_NUMEL: usize = i32::MAX as usize;

/// Round up to the next multiple of 4
#[must_use]
pub const fn align_up_4(n: usize) -> usize {
    (n + 3) & !3
}

/// Product of all sizes (1 for a zero-dim tensor)
#[must_use]
pub fn numel(sizes: &[usize]) -> usize {
    sizes.iter().product()
}

/// Product of all sizes, or `None` if it overflows `usize`
#[must_use]
pub fn checked_numel(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &s| acc.checked_mul(s))
}

/// Element `offset_from_end` positions from the back, or 1 when the tensor
/// does not have that many dims
fn val_at_rev(values: &[usize], offset_from_end: usize) -> usize {
    if offset_from_end == 0 || offset_from_end > values.len() {
        1
    } else {
        values[values.len() - offset_from_end]
    }
}

/// Default row-major dim order with the packed dim moved last.
///
/// `packed_dim` is a WHCN index. If it refers to a dim beyond the tensor's
/// rank the natural order is returned unchanged, since the packed dim is an
/// implicit leading singleton.
///
/// ```
/// use tesela::layout::calculate_dim_order;
///
/// // NCHW, channels packed -> NHWC memory order
/// assert_eq!(calculate_dim_order(4, 2), vec![0, 2, 3, 1]);
/// ```
#[must_use]
pub fn calculate_dim_order(ndim: usize, packed_dim: usize) -> Vec<usize> {
    if ndim == 0 {
        return vec![0];
    }

    let Some(packed_nchw) = ndim.checked_sub(packed_dim + 1) else {
        return (0..ndim).collect();
    };

    let mut dim_order: Vec<usize> = (0..ndim).filter(|&d| d != packed_nchw).collect();
    dim_order.push(packed_nchw);
    dim_order
}

/// Row-major strides following `dim_order` instead of the natural order.
///
/// The dim named last in `dim_order` gets stride 1. A zero-sized dim does not
/// collapse the strides of the dims outside it.
///
/// # Panics
///
/// Panics if `dim_order` does not have one entry per size.
#[must_use]
pub fn calculate_strides(sizes: &[usize], dim_order: &[usize]) -> Vec<usize> {
    if sizes.is_empty() {
        return vec![1];
    }
    assert_eq!(
        sizes.len(),
        dim_order.len(),
        "dim order rank {} does not match sizes rank {}",
        dim_order.len(),
        sizes.len()
    );

    let ndim = sizes.len();
    let mut strides = vec![0usize; ndim];
    strides[dim_order[ndim - 1]] = 1;
    for i in (0..ndim - 1).rev() {
        let inner = dim_order[i + 1];
        strides[dim_order[i]] = if sizes[inner] == 0 {
            strides[inner]
        } else {
            strides[inner] * sizes[inner]
        };
    }
    strides
}

/// Pad `strides` up to a multiple of 4 entries.
///
/// Injected leading entries get [`UNSQUEEZED_STRIDE`]: the axis does not
/// exist and its index never increments.
///
/// # Panics
///
/// Panics if `numel` cannot be addressed with 32-bit shader indices.
#[must_use]
pub fn unsqueeze_strides(strides: &[usize], numel: usize) -> Vec<usize> {
    assert!(
        numel <= MAX_ADDRESSABLE_NUMEL,
        "tensor with {numel} elements cannot be indexed by 32-bit shaders"
    );
    let ndim_up4 = align_up_4(strides.len());
    let mut unsqueezed = vec![UNSQUEEZED_STRIDE; ndim_up4 - strides.len()];
    unsqueezed.extend_from_slice(strides);
    unsqueezed
}

/// Sizes as stored on the GPU: rank padded to a multiple of 4 with leading
/// singleton dims, packed dim padded to a multiple of 4.
///
/// ```
/// use tesela::layout::calculate_padded_sizes;
///
/// assert_eq!(calculate_padded_sizes(&[3, 5, 7], 2), vec![1, 4, 5, 7]);
/// assert_eq!(calculate_padded_sizes(&[3, 5, 7], 0), vec![1, 3, 5, 8]);
/// ```
#[must_use]
pub fn calculate_padded_sizes(sizes: &[usize], packed_dim: usize) -> Vec<usize> {
    let ndim_up4 = align_up_4(sizes.len().max(1));
    let mut padded_sizes: Vec<usize> = (1..=ndim_up4)
        .rev()
        .map(|from_end| val_at_rev(sizes, from_end))
        .collect();

    let dim_offset = packed_dim + 1;
    padded_sizes[ndim_up4 - dim_offset] = align_up_4(val_at_rev(sizes, dim_offset));
    padded_sizes
}

fn extent_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("image extent {value} does not fit in u32"))
}

/// Image extents `[X, Y, Z]` needed to hold a tensor with `padded_sizes`.
///
/// Each texture axis takes the largest WHC dim mapped onto it. The batch dim
/// is folded into the axis of the concatenation dim (`axis_map[3]`) by
/// multiplication, then the axis holding the packed dim is divided by 4.
///
/// # Panics
///
/// Panics unless `padded_sizes` has exactly 4 entries (texture storage is
/// limited to 4D tensors) and the packed axis is a multiple of 4.
#[must_use]
pub fn calculate_image_extents(
    padded_sizes: &[usize],
    axis_map: &AxisMap,
    packed_dim: usize,
) -> [u32; 3] {
    assert_eq!(
        padded_sizes.len(),
        4,
        "image extents require 4 padded dims, got {}",
        padded_sizes.len()
    );

    let mut extents = [1u32; 3];
    for whcn_dim in 0..BATCH_DIM {
        let axis = axis_map[whcn_dim];
        let size = extent_u32(padded_sizes[padded_sizes.len() - 1 - whcn_dim]);
        extents[axis] = extents[axis].max(size);
    }

    let batch_axis = axis_map[axis_map[BATCH_DIM]];
    extents[batch_axis] *= extent_u32(padded_sizes[0]);

    let packed_axis = axis_map[packed_dim];
    assert!(
        extents[packed_axis] % TEXEL_WIDTH as u32 == 0,
        "packed axis extent {} is not a multiple of 4",
        extents[packed_axis]
    );
    extents[packed_axis] /= TEXEL_WIDTH as u32;
    extents
}

/// Axis map for a new tensor under the given policy
#[must_use]
pub fn calculate_axis_map(sizes: &[usize], layout: AxisMapLayout) -> AxisMap {
    match layout {
        AxisMapLayout::Default => DEFAULT_AXIS_MAP,
        AxisMapLayout::Optimized => {
            // Largest dim on X, smallest on Z; sort is stable so ties keep WHC order.
            let mut whc = [0usize, 1, 2];
            whc.sort_by(|&a, &b| val_at_rev(sizes, b + 1).cmp(&val_at_rev(sizes, a + 1)));

            let mut axis_map = [0usize; 4];
            for (axis, &whcn_dim) in whc.iter().enumerate() {
                axis_map[whcn_dim] = axis;
            }
            axis_map[BATCH_DIM] = whc[2];
            axis_map
        }
    }
}

/// Logical sizes (NCHW) of a tensor stored in an existing image
#[must_use]
pub fn calculate_sizes_from_image(extents: [u32; 3], memory_layout: MemoryLayout) -> Vec<usize> {
    let mut sizes: Vec<usize> = extents.iter().map(|&e| e as usize).collect();
    sizes[memory_layout.packed_dim()] *= TEXEL_WIDTH;
    sizes.reverse();
    sizes
}

/// True if `dim_order` is a permutation of `0..dim_order.len()`
#[must_use]
pub fn dim_order_is_valid(dim_order: &[usize]) -> bool {
    let mut seen = vec![false; dim_order.len()];
    dim_order.iter().all(|&d| d < seen.len() && !std::mem::replace(&mut seen[d], true))
}

/// Relabel `dim0` and `dim1` inside a dim order
pub fn transpose_dim_order_inplace(dim_order: &mut [usize], dim0: usize, dim1: usize) {
    for d in dim_order.iter_mut() {
        if *d == dim0 {
            *d = dim1;
        } else if *d == dim1 {
            *d = dim0;
        }
    }
}

/// Last 4 entries of `values` in WHCN order, missing dims reported as 1.
///
/// # Panics
///
/// Panics if a value does not fit in `i32`.
#[must_use]
pub fn make_whcn_ivec4(values: &[usize]) -> [i32; 4] {
    let mut out = [1i32; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        let v = val_at_rev(values, i + 1);
        *slot = i32::try_from(v).unwrap_or_else(|_| panic!("metadata value {v} does not fit in i32"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_4() {
        assert_eq!(align_up_4(0), 0);
        assert_eq!(align_up_4(1), 4);
        assert_eq!(align_up_4(4), 4);
        assert_eq!(align_up_4(5), 8);
    }

    #[test]
    fn test_dim_order_width_packed() {
        assert_eq!(calculate_dim_order(4, 0), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_dim_order_height_packed() {
        assert_eq!(calculate_dim_order(4, 1), vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_dim_order_channels_packed() {
        assert_eq!(calculate_dim_order(4, 2), vec![0, 2, 3, 1]);
        assert_eq!(calculate_dim_order(3, 2), vec![1, 2, 0]);
    }

    #[test]
    fn test_dim_order_packed_beyond_rank() {
        assert_eq!(calculate_dim_order(2, 2), vec![0, 1]);
        assert_eq!(calculate_dim_order(0, 2), vec![0]);
    }

    #[test]
    fn test_strides_row_major() {
        assert_eq!(calculate_strides(&[2, 3, 4, 5], &[0, 1, 2, 3]), vec![60, 20, 5, 1]);
    }

    #[test]
    fn test_strides_channels_last() {
        // N=2, C=3, H=4, W=5 in NHWC memory order
        assert_eq!(calculate_strides(&[2, 3, 4, 5], &[0, 2, 3, 1]), vec![60, 1, 15, 3]);
    }

    #[test]
    fn test_strides_zero_dim_tensor() {
        assert_eq!(calculate_strides(&[], &[0]), vec![1]);
    }

    #[test]
    fn test_strides_zero_size_dim() {
        assert_eq!(calculate_strides(&[2, 0, 3], &[0, 1, 2]), vec![3, 3, 1]);
    }

    #[test]
    #[should_panic(expected = "does not match sizes rank")]
    fn test_strides_rank_mismatch() {
        let _ = calculate_strides(&[2, 3], &[0, 1, 2]);
    }

    #[test]
    fn test_checked_numel() {
        assert_eq!(checked_numel(&[]), Some(1));
        assert_eq!(checked_numel(&[2, 3, 4]), Some(24));
        assert_eq!(checked_numel(&[65536, 65536]), Some(1 << 32));
        assert_eq!(checked_numel(&[usize::MAX, 2]), None);
    }

    #[test]
    #[should_panic(expected = "cannot be indexed by 32-bit shaders")]
    fn test_unsqueeze_strides_rejects_unaddressable() {
        let _ = unsqueeze_strides(&[1], MAX_ADDRESSABLE_NUMEL + 1);
    }

    #[test]
    fn test_unsqueeze_strides() {
        assert_eq!(
            unsqueeze_strides(&[20, 5, 1], 60),
            vec![UNSQUEEZED_STRIDE, 20, 5, 1]
        );
        assert_eq!(unsqueeze_strides(&[60, 20, 5, 1], 120), vec![60, 20, 5, 1]);
        assert_eq!(
            unsqueeze_strides(&[24, 12, 4, 2, 1], 48),
            vec![UNSQUEEZED_STRIDE, UNSQUEEZED_STRIDE, UNSQUEEZED_STRIDE, 24, 12, 4, 2, 1]
        );
    }

    #[test]
    fn test_padded_sizes() {
        assert_eq!(calculate_padded_sizes(&[3, 5, 7], 2), vec![1, 4, 5, 7]);
        assert_eq!(calculate_padded_sizes(&[3, 5, 7], 1), vec![1, 3, 8, 7]);
        assert_eq!(calculate_padded_sizes(&[3, 5, 7], 0), vec![1, 3, 5, 8]);
    }

    #[test]
    fn test_padded_sizes_high_rank() {
        assert_eq!(
            calculate_padded_sizes(&[2, 3, 4, 5, 6], 2),
            vec![1, 1, 1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn test_padded_sizes_packed_dim_missing() {
        // 1D tensor, channels packed: the implicit channel dim pads from 1 to 4
        assert_eq!(calculate_padded_sizes(&[10], 2), vec![1, 4, 1, 10]);
        assert_eq!(calculate_padded_sizes(&[], 0), vec![1, 1, 1, 4]);
    }

    #[test]
    fn test_image_extents_channels_packed() {
        let padded = calculate_padded_sizes(&[3, 5, 7], 2);
        assert_eq!(calculate_image_extents(&padded, &DEFAULT_AXIS_MAP, 2), [7, 5, 1]);
    }

    #[test]
    fn test_image_extents_batch_folds_into_depth() {
        let padded = calculate_padded_sizes(&[2, 3, 5, 7], 2);
        assert_eq!(padded, vec![2, 4, 5, 7]);
        assert_eq!(calculate_image_extents(&padded, &DEFAULT_AXIS_MAP, 2), [7, 5, 2]);
    }

    #[test]
    fn test_image_extents_width_packed() {
        let padded = calculate_padded_sizes(&[3, 5, 7], 0);
        assert_eq!(calculate_image_extents(&padded, &DEFAULT_AXIS_MAP, 0), [2, 5, 3]);
    }

    #[test]
    fn test_image_extents_permuted_axis_map() {
        // W and H swapped onto Y and X
        let padded = calculate_padded_sizes(&[4, 5, 7], 2);
        assert_eq!(calculate_image_extents(&padded, &[1, 0, 2, 2], 2), [5, 7, 1]);
    }

    #[test]
    #[should_panic(expected = "require 4 padded dims")]
    fn test_image_extents_rejects_high_rank() {
        let padded = calculate_padded_sizes(&[1, 2, 3, 4, 5], 2);
        let _ = calculate_image_extents(&padded, &DEFAULT_AXIS_MAP, 2);
    }

    #[test]
    fn test_axis_map_default() {
        assert_eq!(calculate_axis_map(&[2, 3, 4], AxisMapLayout::Default), [0, 1, 2, 2]);
    }

    #[test]
    fn test_axis_map_optimized() {
        // C=64 largest -> X, W=8 -> Y, H=2 -> Z; batch concatenated along H
        let axis_map = calculate_axis_map(&[64, 2, 8], AxisMapLayout::Optimized);
        assert_eq!(axis_map, [1, 2, 0, 1]);
    }

    #[test]
    fn test_axis_map_optimized_ties_keep_order() {
        assert_eq!(calculate_axis_map(&[4, 4, 4], AxisMapLayout::Optimized), [0, 1, 2, 2]);
    }

    #[test]
    fn test_sizes_from_image() {
        assert_eq!(
            calculate_sizes_from_image([7, 5, 1], MemoryLayout::ChannelsPacked),
            vec![4, 5, 7]
        );
        assert_eq!(
            calculate_sizes_from_image([2, 5, 3], MemoryLayout::WidthPacked),
            vec![3, 5, 8]
        );
    }

    #[test]
    fn test_dim_order_validity() {
        assert!(dim_order_is_valid(&[0, 2, 3, 1]));
        assert!(!dim_order_is_valid(&[0, 0, 1]));
        assert!(!dim_order_is_valid(&[0, 3]));
        assert!(dim_order_is_valid(&[]));
    }

    #[test]
    fn test_transpose_dim_order() {
        let mut order = vec![0, 2, 3, 1];
        transpose_dim_order_inplace(&mut order, 1, 3);
        assert_eq!(order, vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_make_whcn_ivec4() {
        assert_eq!(make_whcn_ivec4(&[2, 3, 4]), [4, 3, 2, 1]);
        assert_eq!(make_whcn_ivec4(&[9, 1, 2, 3, 4]), [4, 3, 2, 1]);
    }
}
