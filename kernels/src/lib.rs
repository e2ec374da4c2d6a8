//! CPU kernels for `inception-rs`.
//!
//! Every kernel works on flat, contiguous, row-major slices plus an explicit shape, and
//! returns a freshly allocated `Vec`. Shape bookkeeping (strides, ranks, layouts) lives in the
//! main crate; this crate only knows how to move numbers around quickly.
//!
//! Work is split across cores with `rayon`, usually one task per `(batch, channel)` plane.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cpu_concat;
pub mod cpu_conv2d;
pub mod cpu_linear;
pub mod cpu_permute;
pub mod cpu_pool;

pub use cpu_concat::cpu_concat;
pub use cpu_conv2d::cpu_conv2d;
pub use cpu_linear::cpu_linear;
pub use cpu_permute::cpu_permute;
pub use cpu_pool::{cpu_avg_pool2d, cpu_max_pool2d};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Zero padding for the two spatial dimensions, given per side: `[[top, bottom], [left, right]]`.
///
/// Convolutions with "SAME" padding and an even amount of total padding split it evenly;
/// an odd remainder goes to the bottom/right side.
pub type Padding2d = [[usize; 2]; 2];

/// Trait bound for elements that can be processed by kernels.
/// This mirrors `TensorElem` in the main crate to avoid circular dependencies.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// Checks that `data` holds exactly as many elements as `shape` describes.
pub(crate) fn check_len<T>(data: &[T], shape: &[usize]) -> Result<()> {
    let expected: usize = shape.iter().product();
    if data.len() != expected {
        return Err(KernelError::ShapeMismatch {
            expected: vec![expected],
            got: vec![data.len()],
        });
    }
    Ok(())
}

/// Output extent of a sliding window along one axis.
///
/// Fails when the (padded) input is smaller than the window or the stride is zero.
pub(crate) fn window_extent(input: usize, pad: [usize; 2], kernel: usize, stride: usize) -> Result<usize> {
    if stride == 0 || kernel == 0 {
        return Err(KernelError::InvalidArgument(format!(
            "kernel ({kernel}) and stride ({stride}) must be positive"
        )));
    }
    let padded = input + pad[0] + pad[1];
    if padded < kernel {
        return Err(KernelError::ShapeMismatch {
            expected: vec![kernel],
            got: vec![padded],
        });
    }
    Ok((padded - kernel) / stride + 1)
}
