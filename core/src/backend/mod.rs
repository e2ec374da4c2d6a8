//! Tensor runtimes.
//!
//! The network builder never touches numbers directly: every primitive goes through a
//! [`Backend`]. Two runtimes ship with the crate:
//!
//! - [`CpuBackend`]: eager `f32` execution on top of `inception-rs-kernels`.
//! - [`MetaBackend`]: shape-only tensors plus an op trace. Builds the full 299x299 network
//!   instantly, which is what `summary` and the topology tests use.
//!
//! Both runtimes derive output shapes from [`crate::shape`], so they always agree.

use crate::error::Result;
use crate::params::Initializer;
use inception_rs_kernels::Padding2d;
use std::fmt::Debug;

pub mod cpu;
pub mod meta;

pub use cpu::CpuBackend;
pub use meta::{MetaBackend, MetaTensor, OpRecord};

/// A tensor runtime: creates tensors and runs the primitives the network is made of.
///
/// Image tensors are channel-first `[N, C, H, W]`; per-channel vectors are rank 1; dense
/// activations are `[N, features]`.
pub trait Backend {
    type Tensor<const RANK: usize>: Clone + Debug;

    /// Short runtime name, for logs.
    fn name(&self) -> &'static str;

    fn shape<const RANK: usize>(&self, t: &Self::Tensor<RANK>) -> [usize; RANK];

    /// Creates a fresh parameter from its initializer.
    fn materialize<const RANK: usize>(
        &self,
        name: &str,
        shape: [usize; RANK],
        init: Initializer,
    ) -> Result<Self::Tensor<RANK>>;

    fn from_host<const RANK: usize>(&self, data: Vec<f32>, shape: [usize; RANK]) -> Result<Self::Tensor<RANK>>;

    /// Copies values back to the host. Fails with `MissingHostData` on shape-only runtimes.
    fn to_host<const RANK: usize>(&self, t: &Self::Tensor<RANK>) -> Result<Vec<f32>>;

    fn conv2d(
        &self,
        x: &Self::Tensor<4>,
        weight: &Self::Tensor<4>,
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Self::Tensor<4>>;

    /// Adds `bias[c]` to channel `c`.
    fn bias_add(&self, x: &Self::Tensor<4>, bias: &Self::Tensor<1>) -> Result<Self::Tensor<4>>;

    /// `(x - mean) / sqrt(variance + epsilon) * gamma + beta`, per channel. Missing gamma
    /// means 1, missing beta means 0.
    fn batch_norm(
        &self,
        x: &Self::Tensor<4>,
        mean: &Self::Tensor<1>,
        variance: &Self::Tensor<1>,
        gamma: Option<&Self::Tensor<1>>,
        beta: Option<&Self::Tensor<1>>,
        epsilon: f32,
    ) -> Result<Self::Tensor<4>>;

    /// Per-channel batch mean and variance over `N`, `H` and `W`.
    fn moments(&self, x: &Self::Tensor<4>) -> Result<(Self::Tensor<1>, Self::Tensor<1>)>;

    /// `momentum * moving + (1 - momentum) * batch`.
    fn moving_average(
        &self,
        moving: &Self::Tensor<1>,
        batch: &Self::Tensor<1>,
        momentum: f32,
    ) -> Result<Self::Tensor<1>>;

    fn relu<const RANK: usize>(&self, x: &Self::Tensor<RANK>) -> Result<Self::Tensor<RANK>>;

    fn gelu<const RANK: usize>(&self, x: &Self::Tensor<RANK>) -> Result<Self::Tensor<RANK>>;

    /// Zeroes each element with probability `rate` and scales survivors by `1 / (1 - rate)`.
    fn dropout<const RANK: usize>(&self, x: &Self::Tensor<RANK>, rate: f32) -> Result<Self::Tensor<RANK>>;

    fn max_pool2d(
        &self,
        x: &Self::Tensor<4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Self::Tensor<4>>;

    /// Average pooling; the divisor counts only cells inside the input.
    fn avg_pool2d(
        &self,
        x: &Self::Tensor<4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Self::Tensor<4>>;

    fn concat<const RANK: usize>(&self, xs: &[&Self::Tensor<RANK>], axis: usize) -> Result<Self::Tensor<RANK>>;

    fn permute<const RANK: usize>(&self, x: &Self::Tensor<RANK>, perm: [usize; RANK]) -> Result<Self::Tensor<RANK>>;

    /// `[N, C, H, W]` to `[N, C * H * W]`.
    fn flatten(&self, x: &Self::Tensor<4>) -> Result<Self::Tensor<2>>;

    /// `x · weightᵀ + bias` with `weight` stored as `[units, in_features]`.
    fn dense(
        &self,
        x: &Self::Tensor<2>,
        weight: &Self::Tensor<2>,
        bias: Option<&Self::Tensor<1>>,
    ) -> Result<Self::Tensor<2>>;

    /// Sum of squared elements, for regularization penalties.
    fn sum_squares<const RANK: usize>(&self, t: &Self::Tensor<RANK>) -> Result<f32>;
}
