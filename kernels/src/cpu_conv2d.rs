use crate::{KernelElem, KernelError, Padding2d, Result, check_len, window_extent};
use rayon::prelude::*;

/// Performs 2D Convolution on CPU.
///
/// # Arguments
///
/// * `input` - Input data (flattened). Shape: `[batch_size, in_channels, height, width]`
/// * `weight` - Weight data (flattened). Shape: `[out_channels, in_channels, kernel_h, kernel_w]`
/// * `input_shape` - Shape of the input tensor.
/// * `weight_shape` - Shape of the weight tensor.
/// * `stride` - Stride of the convolution: `[stride_h, stride_w]`
/// * `padding` - Zero padding per side: `[[top, bottom], [left, right]]`
///
/// # Returns
///
/// A flattened vector containing the result of the convolution.
/// Output shape: `[batch_size, out_channels, out_h, out_w]`
pub fn cpu_conv2d<T: KernelElem>(
    input: &[T],
    weight: &[T],
    input_shape: &[usize; 4],
    weight_shape: &[usize; 4],
    stride: [usize; 2],
    padding: Padding2d,
) -> Result<Vec<T>> {
    check_len(input, input_shape)?;
    check_len(weight, weight_shape)?;

    let [batch_size, in_channels, in_h, in_w] = *input_shape;
    let [out_channels, weight_in_channels, k_h, k_w] = *weight_shape;

    if in_channels != weight_in_channels {
        return Err(KernelError::ShapeMismatch {
            expected: vec![in_channels],
            got: vec![weight_in_channels],
        });
    }

    let out_h = window_extent(in_h, padding[0], k_h, stride[0])?;
    let out_w = window_extent(in_w, padding[1], k_w, stride[1])?;
    let [pad_top, _] = padding[0];
    let [pad_left, _] = padding[1];

    let plane_in = in_h * in_w;
    let plane_out = out_h * out_w;
    let mut output = vec![T::zero(); batch_size * out_channels * plane_out];

    if plane_out == 0 {
        return Ok(output);
    }

    // One task per (batch, out_channel) plane. Inside a plane the loop order is
    // (ic, kh, kw) outermost so each weight is loaded once and the innermost loop walks a
    // contiguous input row.
    output
        .par_chunks_mut(plane_out)
        .enumerate()
        .for_each(|(plane, out_plane)| {
            let b = plane / out_channels;
            let oc = plane % out_channels;

            for ic in 0..in_channels {
                let in_plane = &input[(b * in_channels + ic) * plane_in..][..plane_in];
                let w_base = (oc * in_channels + ic) * k_h * k_w;

                for kh in 0..k_h {
                    for kw in 0..k_w {
                        let w = weight[w_base + kh * k_w + kw];
                        if w == T::zero() {
                            continue;
                        }

                        for oh in 0..out_h {
                            let h_in = (oh * stride[0] + kh) as isize - pad_top as isize;
                            if h_in < 0 || h_in >= in_h as isize {
                                continue;
                            }
                            let in_row = &in_plane[h_in as usize * in_w..][..in_w];
                            let out_row = &mut out_plane[oh * out_w..][..out_w];

                            for (ow, out_val) in out_row.iter_mut().enumerate() {
                                let w_in = (ow * stride[1] + kw) as isize - pad_left as isize;
                                if w_in >= 0 && w_in < in_w as isize {
                                    *out_val += w * in_row[w_in as usize];
                                }
                            }
                        }
                    }
                }
            }
        });

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv2d_identity_kernel() {
        // 1x1 kernel with weight 2.0 just scales the input.
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let out = cpu_conv2d(&input, &[2.0], &[1, 1, 3, 3], &[1, 1, 1, 1], [1, 1], [[0, 0], [0, 0]])
            .unwrap();
        let expected: Vec<f32> = (0..9).map(|i| 2.0 * i as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_conv2d_valid_sum() {
        // All-ones 3x3 kernel over a 4x4 ramp, VALID -> 2x2 window sums.
        let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let out = cpu_conv2d(&input, &[1.0; 9], &[1, 1, 4, 4], &[1, 1, 3, 3], [1, 1], [[0, 0], [0, 0]])
            .unwrap();
        // top-left window: 0+1+2+4+5+6+8+9+10 = 45
        assert_eq!(out, vec![45.0, 54.0, 81.0, 90.0]);
    }

    #[test]
    fn test_conv2d_same_padding_keeps_size() {
        let input = vec![1.0f32; 25];
        let out = cpu_conv2d(&input, &[1.0; 9], &[1, 1, 5, 5], &[1, 1, 3, 3], [1, 1], [[1, 1], [1, 1]])
            .unwrap();
        assert_eq!(out.len(), 25);
        // Corner sees a 2x2 patch, edge a 2x3 patch, centre the full 3x3.
        assert_eq!(out[0], 4.0);
        assert_eq!(out[1], 6.0);
        assert_eq!(out[12], 9.0);
    }

    #[test]
    fn test_conv2d_asymmetric_kernel_and_padding() {
        // [1, 3] kernel, padding only on the right: each output sums the current and next
        // two columns of its row.
        let input: Vec<f32> = (0..8).map(|i| i as f32).collect(); // 2x4
        let out = cpu_conv2d(&input, &[1.0; 3], &[1, 1, 2, 4], &[1, 1, 1, 3], [1, 1], [[0, 0], [0, 2]])
            .unwrap();
        assert_eq!(out, vec![3.0, 6.0, 5.0, 3.0, 15.0, 18.0, 13.0, 7.0]);
    }

    #[test]
    fn test_conv2d_multi_channel() {
        // Two input channels summed by a [1, 2, 1, 1] kernel, two batches.
        let input = vec![1.0f32, 2.0, 10.0, 20.0, 3.0, 4.0, 30.0, 40.0]; // [2, 2, 1, 2]
        let out = cpu_conv2d(&input, &[1.0, 1.0], &[2, 2, 1, 2], &[1, 2, 1, 1], [1, 1], [[0, 0], [0, 0]])
            .unwrap();
        assert_eq!(out, vec![11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_conv2d_channel_mismatch() {
        let err = cpu_conv2d(&[0.0f32; 9], &[0.0; 18], &[1, 1, 3, 3], &[1, 2, 3, 3], [1, 1], [[0, 0], [0, 0]]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_conv2d_kernel_too_large() {
        let err = cpu_conv2d(&[0.0f32; 4], &[0.0; 9], &[1, 1, 2, 2], &[1, 1, 3, 3], [1, 1], [[0, 0], [0, 0]]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }
}
