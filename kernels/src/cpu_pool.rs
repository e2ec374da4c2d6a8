use crate::{KernelElem, KernelError, Padding2d, Result, check_len, window_extent};
use rayon::prelude::*;

#[derive(Clone, Copy)]
enum Reduce {
    Max,
    Mean,
}

/// Performs 2D Max Pooling on CPU.
///
/// Padded cells never win: only positions inside the input take part in the maximum.
///
/// # Arguments
///
/// * `input` - Input data (flattened). Shape: `[batch_size, channels, height, width]`
/// * `input_shape` - Shape of the input tensor.
/// * `kernel_size` - Size of the pooling window: `[k_h, k_w]`
/// * `stride` - Stride of the pooling: `[stride_h, stride_w]`
/// * `padding` - Padding per side: `[[top, bottom], [left, right]]`
///
/// # Returns
///
/// Output shape: `[batch_size, channels, out_h, out_w]`
pub fn cpu_max_pool2d<T: KernelElem>(
    input: &[T],
    input_shape: &[usize; 4],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: Padding2d,
) -> Result<Vec<T>> {
    pool2d(input, input_shape, kernel_size, stride, padding, Reduce::Max)
}

/// Performs 2D Average Pooling on CPU.
///
/// The divisor is the number of cells of the window that fall inside the input, so padding
/// does not drag averages towards zero at the borders.
///
/// Arguments and output shape are the same as [`cpu_max_pool2d`].
pub fn cpu_avg_pool2d<T: KernelElem>(
    input: &[T],
    input_shape: &[usize; 4],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: Padding2d,
) -> Result<Vec<T>> {
    pool2d(input, input_shape, kernel_size, stride, padding, Reduce::Mean)
}

fn pool2d<T: KernelElem>(
    input: &[T],
    input_shape: &[usize; 4],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: Padding2d,
    reduce: Reduce,
) -> Result<Vec<T>> {
    check_len(input, input_shape)?;

    let [batch_size, channels, in_h, in_w] = *input_shape;
    let [k_h, k_w] = kernel_size;

    // A window lying entirely in the padding would have nothing to reduce.
    if padding[0][0] >= k_h || padding[0][1] >= k_h || padding[1][0] >= k_w || padding[1][1] >= k_w {
        return Err(KernelError::InvalidArgument(format!(
            "padding {padding:?} must be smaller than the pooling window {kernel_size:?}"
        )));
    }

    let out_h = window_extent(in_h, padding[0], k_h, stride[0])?;
    let out_w = window_extent(in_w, padding[1], k_w, stride[1])?;
    let pad_top = padding[0][0] as isize;
    let pad_left = padding[1][0] as isize;

    let plane_in = in_h * in_w;
    let plane_out = out_h * out_w;
    let mut output = vec![T::zero(); batch_size * channels * plane_out];

    if plane_out == 0 {
        return Ok(output);
    }

    output
        .par_chunks_mut(plane_out)
        .enumerate()
        .for_each(|(plane, out_plane)| {
            let in_plane = &input[plane * plane_in..][..plane_in];

            for oh in 0..out_h {
                let h_start = (oh * stride[0]) as isize - pad_top;
                let h_lo = h_start.max(0) as usize;
                let h_hi = ((h_start + k_h as isize).min(in_h as isize)) as usize;

                for ow in 0..out_w {
                    let w_start = (ow * stride[1]) as isize - pad_left;
                    let w_lo = w_start.max(0) as usize;
                    let w_hi = ((w_start + k_w as isize).min(in_w as isize)) as usize;

                    let mut acc = in_plane[h_lo * in_w + w_lo];
                    if let Reduce::Mean = reduce {
                        acc = T::zero();
                    }
                    let mut count = 0usize;

                    for h in h_lo..h_hi {
                        for &val in &in_plane[h * in_w + w_lo..h * in_w + w_hi] {
                            match reduce {
                                Reduce::Max => {
                                    if val > acc {
                                        acc = val;
                                    }
                                }
                                Reduce::Mean => acc += val,
                            }
                            count += 1;
                        }
                    }

                    out_plane[oh * out_w + ow] = match reduce {
                        Reduce::Max => acc,
                        Reduce::Mean => acc / T::from_usize(count).unwrap_or_else(T::one),
                    };
                }
            }
        });

    Ok(output)
}
