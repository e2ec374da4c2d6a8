//! Tensor operations.
//!
//! # Overview
//!
//! This module is the numeric engine behind the CPU runtime:
//! - **Element-wise Arithmetic**: `+`, `-`, `*`, `/` on identically shaped tensors.
//! - **Convolution and Pooling**: channel-first rank-4 tensors, per-side padding.
//! - **Per-channel statistics**: the mean/variance and affine transform used by batch norm.
//! - **Layout**: axis permutation, concatenation and flattening.
//!
//! The heavy lifting is delegated to `inception-rs-kernels`, which parallelizes with `rayon`.
//!
//! ```rust
//! use inception_rs::tensor::Tensor;
//!
//! let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
//! let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();
//!
//! let c = (&a + &b).unwrap();
//! assert_eq!(c.data(), &[4.0, 6.0]);
//! ```

use super::{Result, Tensor, TensorElem, TensorError, compute_strides};
use inception_rs_kernels::Padding2d;

use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};

/// Implements a binary arithmetic operation trait (e.g., `Add`, `Sub`) for `&Tensor`.
///
/// Shapes must match exactly; the operation runs element-wise in parallel.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK>
        where
            T: TensorElem,
        {
            type Output = crate::tensor::Result<Tensor<T, RANK>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

/// Output extent of a sliding window once the kernel has accepted the arguments.
fn window_out(input: usize, pad: [usize; 2], kernel: usize, stride: usize) -> usize {
    (input + pad[0] + pad[1] - kernel) / stride + 1
}

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Applies a function element-wise to the tensor.
    ///
    /// ```rust
    /// use inception_rs::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// let squared = t.map(|x| x * x);
    /// assert_eq!(squared.data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Sum of squared elements. Used for L2 penalties.
    pub fn sum_squares(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &x| acc + x * x)
    }

    /// Permutes the axes: output axis `i` is input axis `perm[i]`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` if `perm` is not a permutation of `0..RANK`.
    pub fn permute(&self, perm: [usize; RANK]) -> Result<Self> {
        let data = inception_rs_kernels::cpu_permute(&self.data, &self.shape, &perm)?;
        let mut shape = [0; RANK];
        for (dim, &axis) in shape.iter_mut().zip(perm.iter()) {
            *dim = self.shape[axis];
        }
        Ok(Tensor {
            shape,
            strides: compute_strides(&shape),
            data,
        })
    }

    /// Concatenates tensors along `axis`, in order.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` when the tensors disagree on any other axis.
    pub fn concat(tensors: &[&Self], axis: usize) -> Result<Self> {
        let inputs: Vec<(&[T], [usize; RANK])> =
            tensors.iter().map(|t| (t.data(), t.shape)).collect();
        let (data, shape) = inception_rs_kernels::cpu_concat(&inputs, axis)?;
        Ok(Tensor {
            shape,
            strides: compute_strides(&shape),
            data,
        })
    }
}

impl<T> Tensor<T, 4>
where
    T: TensorElem,
{
    /// Performs 2D Convolution.
    ///
    /// # Arguments
    ///
    /// * `weight` - Weight tensor of shape `[out_channels, in_channels, kernel_h, kernel_w]`.
    /// * `stride` - Stride of the convolution `[stride_h, stride_w]`.
    /// * `padding` - Zero padding per side `[[top, bottom], [left, right]]`.
    ///
    /// # Returns
    ///
    /// Output shape: `[batch_size, out_channels, out_h, out_w]`
    pub fn conv2d(
        &self,
        weight: &Tensor<T, 4>,
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Tensor<T, 4>> {
        let data = inception_rs_kernels::cpu_conv2d(
            &self.data,
            &weight.data,
            &self.shape,
            &weight.shape,
            stride,
            padding,
        )?;

        let [batch_size, _, in_h, in_w] = self.shape;
        let [out_channels, _, k_h, k_w] = weight.shape;
        let out_shape = [
            batch_size,
            out_channels,
            window_out(in_h, padding[0], k_h, stride[0]),
            window_out(in_w, padding[1], k_w, stride[1]),
        ];
        Tensor::new(data, out_shape)
    }

    /// Performs 2D Max Pooling. Padded cells never contribute.
    ///
    /// Output shape: `[batch_size, channels, out_h, out_w]`
    pub fn max_pool2d(
        &self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Tensor<T, 4>> {
        let data = inception_rs_kernels::cpu_max_pool2d(
            &self.data,
            &self.shape,
            kernel_size,
            stride,
            padding,
        )?;
        Tensor::new(data, self.pooled_shape(kernel_size, stride, padding))
    }

    /// Performs 2D Average Pooling, dividing by the number of unpadded cells in each window.
    ///
    /// Output shape: `[batch_size, channels, out_h, out_w]`
    pub fn avg_pool2d(
        &self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Tensor<T, 4>> {
        let data = inception_rs_kernels::cpu_avg_pool2d(
            &self.data,
            &self.shape,
            kernel_size,
            stride,
            padding,
        )?;
        Tensor::new(data, self.pooled_shape(kernel_size, stride, padding))
    }

    fn pooled_shape(&self, kernel_size: [usize; 2], stride: [usize; 2], padding: Padding2d) -> [usize; 4] {
        let [batch_size, channels, in_h, in_w] = self.shape;
        [
            batch_size,
            channels,
            window_out(in_h, padding[0], kernel_size[0], stride[0]),
            window_out(in_w, padding[1], kernel_size[1], stride[1]),
        ]
    }

    /// Adds `bias[c]` to every element of channel `c`.
    pub fn bias_add(&self, bias: &Tensor<T, 1>) -> Result<Tensor<T, 4>> {
        self.channel_affine(None, bias)
    }

    /// Computes `x * scale[c] + shift[c]` per channel. A missing scale means 1.
    pub fn channel_affine(
        &self,
        scale: Option<&Tensor<T, 1>>,
        shift: &Tensor<T, 1>,
    ) -> Result<Tensor<T, 4>> {
        let channels = self.shape[1];
        check_channels(channels, shift)?;
        if let Some(scale) = scale {
            check_channels(channels, scale)?;
        }

        let plane = self.shape[2] * self.shape[3];
        let mut out = Tensor::zeros(self.shape);
        if plane == 0 {
            return Ok(out);
        }

        out.data
            .par_chunks_mut(plane)
            .zip(self.data.par_chunks(plane))
            .enumerate()
            .for_each(|(idx, (o, x))| {
                let c = idx % channels;
                let s = scale.map_or(T::one(), |scale| scale.data[c]);
                let b = shift.data[c];
                for (o, &x) in o.iter_mut().zip(x) {
                    *o = x * s + b;
                }
            });
        Ok(out)
    }

    /// Per-channel mean and (biased) variance over the batch and spatial axes.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::Unsupported` when a channel has no elements.
    pub fn channel_moments(&self) -> Result<(Tensor<T, 1>, Tensor<T, 1>)> {
        let [batch_size, channels, h, w] = self.shape;
        let plane = h * w;
        let count = batch_size * plane;
        let n = T::from_usize(count)
            .filter(|_| count > 0)
            .ok_or_else(|| TensorError::Unsupported("moments of an empty tensor".to_string()))?;

        let mut mean = vec![T::zero(); channels];
        for (idx, chunk) in self.data.chunks(plane).enumerate() {
            let c = idx % channels;
            for &x in chunk {
                mean[c] += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![T::zero(); channels];
        for (idx, chunk) in self.data.chunks(plane).enumerate() {
            let c = idx % channels;
            for &x in chunk {
                let d = x - mean[c];
                var[c] += d * d;
            }
        }
        for v in &mut var {
            *v /= n;
        }

        Ok((Tensor::new(mean, [channels])?, Tensor::new(var, [channels])?))
    }

    /// Flattens `[N, C, H, W]` into `[N, C * H * W]`.
    pub fn flatten(self) -> Result<Tensor<T, 2>> {
        let [batch_size, c, h, w] = self.shape;
        self.reshape([batch_size, c * h * w])
    }
}

fn check_channels<T: TensorElem>(channels: usize, t: &Tensor<T, 1>) -> Result<()> {
    if t.shape[0] != channels {
        return Err(TensorError::ShapeMismatch {
            expected: vec![channels],
            got: t.shape.to_vec(),
        });
    }
    Ok(())
}

impl<T> Tensor<T, 2>
where
    T: TensorElem,
{
    /// Fully connected layer: `[B, in] · [units, in]ᵀ + bias`.
    pub fn linear(&self, weight: &Tensor<T, 2>, bias: Option<&Tensor<T, 1>>) -> Result<Tensor<T, 2>> {
        let data = inception_rs_kernels::cpu_linear(
            &self.data,
            &weight.data,
            bias.map(|b| b.data()),
            &self.shape,
            &weight.shape,
        )?;
        Tensor::new(data, [self.shape[0], weight.shape[0]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();

        assert_eq!((&a + &b).unwrap().data(), &[4.0, 6.0]);
        assert_eq!((&a * &b).unwrap().data(), &[3.0, 8.0]);
        assert_eq!((&b - &a).unwrap().data(), &[2.0, 2.0]);

        let f = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        assert!(matches!(&a + &f, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_conv2d_same_shape() {
        let x = Tensor::<f32, 4>::ones([1, 2, 5, 5]);
        let w = Tensor::<f32, 4>::ones([3, 2, 3, 3]);
        let y = x.conv2d(&w, [2, 2], [[1, 1], [1, 1]]).unwrap();
        assert_eq!(y.shape(), &[1, 3, 3, 3]);
        // centre window sees 9 cells in each of the 2 channels
        assert_eq!(y.data()[4], 18.0);
    }

    #[test]
    fn test_pools() {
        let x = Tensor::<f32, 4>::new((0..16).map(|i| i as f32).collect(), [1, 1, 4, 4]).unwrap();
        let max = x.max_pool2d([2, 2], [2, 2], [[0, 0], [0, 0]]).unwrap();
        assert_eq!(max.shape(), &[1, 1, 2, 2]);
        assert_eq!(max.data(), &[5.0, 7.0, 13.0, 15.0]);

        let avg = x.avg_pool2d([4, 4], [1, 1], [[0, 0], [0, 0]]).unwrap();
        assert_eq!(avg.shape(), &[1, 1, 1, 1]);
        assert_eq!(avg.data(), &[7.5]);
    }

    #[test]
    fn test_bias_add_and_affine() {
        let x = Tensor::<f32, 4>::ones([2, 2, 1, 2]);
        let bias = Tensor::new(vec![1.0, -1.0], [2]).unwrap();
        let y = x.bias_add(&bias).unwrap();
        assert_eq!(y.data(), &[2.0, 2.0, 0.0, 0.0, 2.0, 2.0, 0.0, 0.0]);

        let scale = Tensor::new(vec![3.0, 0.5], [2]).unwrap();
        let z = x.channel_affine(Some(&scale), &bias).unwrap();
        assert_eq!(z.data(), &[4.0, 4.0, -0.5, -0.5, 4.0, 4.0, -0.5, -0.5]);

        let wrong = Tensor::new(vec![1.0; 3], [3]).unwrap();
        assert!(x.bias_add(&wrong).is_err());
    }

    #[test]
    fn test_channel_moments() {
        // channel 0 holds {1, 3} per batch, channel 1 holds {5, 5}
        let x = Tensor::<f32, 4>::new(vec![1.0, 3.0, 5.0, 5.0, 1.0, 3.0, 5.0, 5.0], [2, 2, 1, 2])
            .unwrap();
        let (mean, var) = x.channel_moments().unwrap();
        assert_eq!(mean.data(), &[2.0, 5.0]);
        assert_eq!(var.data(), &[1.0, 0.0]);
    }

    #[test]
    fn test_permute_and_concat() {
        let nhwc = Tensor::<f32, 4>::new((0..6).map(|i| i as f32).collect(), [1, 1, 2, 3]).unwrap();
        let nchw = nhwc.permute([0, 3, 1, 2]).unwrap();
        assert_eq!(nchw.shape(), &[1, 3, 1, 2]);
        assert_eq!(nchw.data(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

        let a = Tensor::<f32, 4>::zeros([1, 2, 3, 3]);
        let b = Tensor::<f32, 4>::ones([1, 5, 3, 3]);
        let c = Tensor::concat(&[&a, &b], 1).unwrap();
        assert_eq!(c.shape(), &[1, 7, 3, 3]);
        assert_eq!(c.data()[2 * 9], 1.0);
    }

    #[test]
    fn test_flatten_and_linear() {
        let x = Tensor::<f32, 4>::ones([2, 3, 1, 1]).flatten().unwrap();
        assert_eq!(x.shape(), &[2, 3]);

        let w = Tensor::new(vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0], [2, 3]).unwrap();
        let b = Tensor::new(vec![0.5, 0.0], [2]).unwrap();
        let y = x.linear(&w, Some(&b)).unwrap();
        assert_eq!(y.shape(), &[2, 2]);
        assert_eq!(y.data(), &[3.5, 1.0, 3.5, 1.0]);
    }

    #[test]
    fn test_sum_squares() {
        let t = Tensor::<f32, 1>::new(vec![1.0, -2.0, 3.0], [3]).unwrap();
        assert_eq!(t.sum_squares(), 14.0);
    }
}
