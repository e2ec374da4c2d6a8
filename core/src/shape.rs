//! Shape arithmetic for windows (convolution and pooling), padding modes and layouts.
//!
//! Both runtimes go through these functions, so the meta runtime predicts exactly what the
//! CPU runtime computes.

use crate::error::{InceptionError, Result};
use inception_rs_kernels::Padding2d;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `[height, width]` pair. Kernel sizes and strides accept either a scalar or a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size2 {
    pub h: usize,
    pub w: usize,
}

impl Size2 {
    pub const fn new(h: usize, w: usize) -> Self {
        Self { h, w }
    }

    pub const fn as_array(self) -> [usize; 2] {
        [self.h, self.w]
    }
}

impl From<usize> for Size2 {
    fn from(n: usize) -> Self {
        Self { h: n, w: n }
    }
}

impl From<[usize; 2]> for Size2 {
    fn from([h, w]: [usize; 2]) -> Self {
        Self { h, w }
    }
}

impl fmt::Display for Size2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.h, self.w)
    }
}

/// Padding mode of a convolution or pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Output extent `ceil(in / stride)`; zero padding split evenly, odd remainder on the
    /// bottom/right.
    #[default]
    Same,
    /// No padding; output extent `(in - kernel) / stride + 1`.
    Valid,
}

impl Padding {
    /// Resolves the mode into explicit per-side padding for an `input` of `[h, w]`.
    pub fn resolve(self, input: [usize; 2], kernel: Size2, stride: Size2) -> Padding2d {
        match self {
            Padding::Valid => [[0, 0], [0, 0]],
            Padding::Same => [
                same_padding(input[0], kernel.h, stride.h),
                same_padding(input[1], kernel.w, stride.w),
            ],
        }
    }
}

impl FromStr for Padding {
    type Err = InceptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SAME" | "same" => Ok(Padding::Same),
            "VALID" | "valid" => Ok(Padding::Valid),
            other => Err(InceptionError::Config(format!("unknown padding mode {other:?}"))),
        }
    }
}

/// `[before, after]` padding of one axis under SAME.
fn same_padding(input: usize, kernel: usize, stride: usize) -> [usize; 2] {
    let stride = stride.max(1);
    let out = input.div_ceil(stride);
    let total = ((out.saturating_sub(1)) * stride + kernel).saturating_sub(input);
    [total / 2, total - total / 2]
}

/// Output extent of a sliding window along one axis.
pub fn window_output(input: usize, pad: [usize; 2], kernel: usize, stride: usize) -> Result<usize> {
    if kernel == 0 || stride == 0 {
        return Err(InceptionError::InvalidInput(format!(
            "kernel ({kernel}) and stride ({stride}) must be positive"
        )));
    }
    let padded = input + pad[0] + pad[1];
    if padded < kernel {
        return Err(InceptionError::InvalidInput(format!(
            "window of {kernel} does not fit an extent of {input} (padded {padded})"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// Spatial output `[out_h, out_w]` of a window over `[h, w]`.
pub fn window_output2d(
    input: [usize; 2],
    kernel: Size2,
    stride: Size2,
    padding: Padding2d,
) -> Result<[usize; 2]> {
    Ok([
        window_output(input[0], padding[0], kernel.h, stride.h)?,
        window_output(input[1], padding[1], kernel.w, stride.w)?,
    ])
}

/// Shape of `shapes` concatenated along `axis`, or `None` if they disagree elsewhere.
pub fn concat_shape<const RANK: usize>(shapes: &[[usize; RANK]], axis: usize) -> Option<[usize; RANK]> {
    let first = shapes.first()?;
    if axis >= RANK {
        return None;
    }
    let mut out = *first;
    out[axis] = 0;
    for shape in shapes {
        for dim in 0..RANK {
            if dim != axis && shape[dim] != first[dim] {
                return None;
            }
        }
        out[axis] += shape[axis];
    }
    Some(out)
}

/// Memory order of an image batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `[N, C, H, W]`
    #[default]
    ChannelFirst,
    /// `[N, H, W, C]`
    ChannelLast,
}

impl Layout {
    /// Axis permutation that brings a tensor in this layout to channel-first.
    pub const fn to_channel_first(self) -> [usize; 4] {
        match self {
            Layout::ChannelFirst => [0, 1, 2, 3],
            Layout::ChannelLast => [0, 3, 1, 2],
        }
    }
}

impl FromStr for Layout {
    type Err = InceptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "channel_first" | "nchw" => Ok(Layout::ChannelFirst),
            "channel_last" | "nhwc" => Ok(Layout::ChannelLast),
            other => Err(InceptionError::Config(format!("unknown layout {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same_out(input: usize, kernel: usize, stride: usize) -> usize {
        let pad = same_padding(input, kernel, stride);
        window_output(input, pad, kernel, stride).unwrap()
    }

    #[test]
    fn test_same_is_ceil_div() {
        for input in [1, 2, 7, 8, 17, 35, 147, 299] {
            for stride in [1, 2] {
                for kernel in [1, 3, 5, 7] {
                    assert_eq!(same_out(input, kernel, stride), input.div_ceil(stride));
                }
            }
        }
    }

    #[test]
    fn test_same_padding_asymmetric() {
        // even input, stride 2, kernel 3: one cell of padding, on the bottom/right
        assert_eq!(same_padding(8, 3, 2), [0, 1]);
        // odd total padding for a 1x7 row: three each side
        assert_eq!(same_padding(17, 7, 1), [3, 3]);
        assert_eq!(same_padding(5, 1, 1), [0, 0]);
    }

    #[test]
    fn test_valid_windows() {
        // the stem: 299 -> 149 -> 147
        assert_eq!(window_output(299, [0, 0], 3, 2).unwrap(), 149);
        assert_eq!(window_output(149, [0, 0], 3, 1).unwrap(), 147);
        // grid reduction: 35 -> 17 -> 8
        assert_eq!(window_output(35, [0, 0], 3, 2).unwrap(), 17);
        assert_eq!(window_output(17, [0, 0], 3, 2).unwrap(), 8);
        assert!(window_output(2, [0, 0], 3, 1).is_err());
        assert!(window_output(2, [0, 0], 1, 0).is_err());
    }

    #[test]
    fn test_size2_from() {
        assert_eq!(Size2::from(3), Size2::new(3, 3));
        assert_eq!(Size2::from([1, 7]), Size2::new(1, 7));
        assert_eq!(Size2::new(7, 1).to_string(), "7x1");
    }

    #[test]
    fn test_resolve() {
        let pad = Padding::Same.resolve([17, 17], Size2::new(1, 7), Size2::from(1));
        assert_eq!(pad, [[0, 0], [3, 3]]);
        let pad = Padding::Valid.resolve([17, 17], Size2::from(3), Size2::from(2));
        assert_eq!(pad, [[0, 0], [0, 0]]);
        assert_eq!("VALID".parse::<Padding>().unwrap(), Padding::Valid);
        assert!("full".parse::<Padding>().is_err());
    }

    #[test]
    fn test_concat_shape() {
        let shapes = [[1, 64, 35, 35], [1, 64, 35, 35], [1, 96, 35, 35], [1, 32, 35, 35]];
        assert_eq!(concat_shape(&shapes, 1), Some([1, 256, 35, 35]));
        assert_eq!(concat_shape(&[[1, 64, 35, 35], [1, 64, 17, 17]], 1), None);
        assert_eq!(concat_shape::<4>(&[], 1), None);
    }

    #[test]
    fn test_layout() {
        assert_eq!(Layout::ChannelLast.to_channel_first(), [0, 3, 1, 2]);
        assert_eq!("nhwc".parse::<Layout>().unwrap(), Layout::ChannelLast);
        let json = serde_json::to_string(&Layout::ChannelLast).unwrap();
        assert_eq!(json, "\"channel_last\"");
    }
}
