//! Eager `f32` runtime on top of the CPU kernels.

use super::Backend;
use crate::error::{InceptionError, Result};
use crate::nn::activation::gelu;
use crate::params::Initializer;
use crate::tensor::Tensor;
use inception_rs_kernels::Padding2d;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

/// Eager CPU runtime. Randomness (initializers, dropout) comes from one seeded generator,
/// so two backends created with the same seed build identical networks.
#[derive(Debug)]
pub struct CpuBackend {
    rng: RefCell<StdRng>,
}

impl CpuBackend {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Backend for CpuBackend {
    type Tensor<const RANK: usize> = Tensor<f32, RANK>;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn shape<const RANK: usize>(&self, t: &Tensor<f32, RANK>) -> [usize; RANK] {
        *t.shape()
    }

    fn materialize<const RANK: usize>(
        &self,
        name: &str,
        shape: [usize; RANK],
        init: Initializer,
    ) -> Result<Tensor<f32, RANK>> {
        let data = init.sample(name, &shape, &mut *self.rng.borrow_mut())?;
        Ok(Tensor::new(data, shape)?)
    }

    fn from_host<const RANK: usize>(&self, data: Vec<f32>, shape: [usize; RANK]) -> Result<Tensor<f32, RANK>> {
        Ok(Tensor::new(data, shape)?)
    }

    fn to_host<const RANK: usize>(&self, t: &Tensor<f32, RANK>) -> Result<Vec<f32>> {
        Ok(t.data().to_vec())
    }

    fn conv2d(
        &self,
        x: &Tensor<f32, 4>,
        weight: &Tensor<f32, 4>,
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Tensor<f32, 4>> {
        Ok(x.conv2d(weight, stride, padding)?)
    }

    fn bias_add(&self, x: &Tensor<f32, 4>, bias: &Tensor<f32, 1>) -> Result<Tensor<f32, 4>> {
        Ok(x.bias_add(bias)?)
    }

    fn batch_norm(
        &self,
        x: &Tensor<f32, 4>,
        mean: &Tensor<f32, 1>,
        variance: &Tensor<f32, 1>,
        gamma: Option<&Tensor<f32, 1>>,
        beta: Option<&Tensor<f32, 1>>,
        epsilon: f32,
    ) -> Result<Tensor<f32, 4>> {
        // Fold everything into one per-channel affine transform:
        // scale = gamma / sqrt(var + eps), shift = beta - mean * scale.
        let channels = mean.shape()[0];
        let mut scale = Vec::with_capacity(channels);
        let mut shift = Vec::with_capacity(channels);
        for c in 0..channels {
            let inv_std = 1.0 / (channel(variance, c)? + epsilon).sqrt();
            let g = gamma.map(|g| channel(g, c)).transpose()?.unwrap_or(1.0);
            let b = beta.map(|b| channel(b, c)).transpose()?.unwrap_or(0.0);
            let s = g * inv_std;
            scale.push(s);
            shift.push(b - channel(mean, c)? * s);
        }
        let scale = Tensor::new(scale, [channels])?;
        let shift = Tensor::new(shift, [channels])?;
        Ok(x.channel_affine(Some(&scale), &shift)?)
    }

    fn moments(&self, x: &Tensor<f32, 4>) -> Result<(Tensor<f32, 1>, Tensor<f32, 1>)> {
        Ok(x.channel_moments()?)
    }

    fn moving_average(
        &self,
        moving: &Tensor<f32, 1>,
        batch: &Tensor<f32, 1>,
        momentum: f32,
    ) -> Result<Tensor<f32, 1>> {
        let kept = moving.map(|m| m * momentum);
        let fresh = batch.map(|b| b * (1.0 - momentum));
        Ok((&kept + &fresh)?)
    }

    fn relu<const RANK: usize>(&self, x: &Tensor<f32, RANK>) -> Result<Tensor<f32, RANK>> {
        Ok(x.map(|v| v.max(0.0)))
    }

    fn gelu<const RANK: usize>(&self, x: &Tensor<f32, RANK>) -> Result<Tensor<f32, RANK>> {
        Ok(x.map(gelu))
    }

    fn dropout<const RANK: usize>(&self, x: &Tensor<f32, RANK>, rate: f32) -> Result<Tensor<f32, RANK>> {
        if !(0.0..1.0).contains(&rate) {
            return Err(InceptionError::Config(format!(
                "dropout rate must be in [0, 1), got {rate}"
            )));
        }
        if rate == 0.0 {
            return Ok(x.clone());
        }

        let keep = 1.0 - rate;
        let mut rng = self.rng.borrow_mut();
        let mut out = x.clone();
        for v in out.data_mut() {
            *v = if rng.random::<f32>() < rate { 0.0 } else { *v / keep };
        }
        Ok(out)
    }

    fn max_pool2d(
        &self,
        x: &Tensor<f32, 4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Tensor<f32, 4>> {
        Ok(x.max_pool2d(kernel, stride, padding)?)
    }

    fn avg_pool2d(
        &self,
        x: &Tensor<f32, 4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<Tensor<f32, 4>> {
        Ok(x.avg_pool2d(kernel, stride, padding)?)
    }

    fn concat<const RANK: usize>(&self, xs: &[&Tensor<f32, RANK>], axis: usize) -> Result<Tensor<f32, RANK>> {
        Ok(Tensor::concat(xs, axis)?)
    }

    fn permute<const RANK: usize>(&self, x: &Tensor<f32, RANK>, perm: [usize; RANK]) -> Result<Tensor<f32, RANK>> {
        Ok(x.permute(perm)?)
    }

    fn flatten(&self, x: &Tensor<f32, 4>) -> Result<Tensor<f32, 2>> {
        Ok(x.clone().flatten()?)
    }

    fn dense(
        &self,
        x: &Tensor<f32, 2>,
        weight: &Tensor<f32, 2>,
        bias: Option<&Tensor<f32, 1>>,
    ) -> Result<Tensor<f32, 2>> {
        Ok(x.linear(weight, bias)?)
    }

    fn sum_squares<const RANK: usize>(&self, t: &Tensor<f32, RANK>) -> Result<f32> {
        Ok(t.sum_squares())
    }
}

fn channel(t: &Tensor<f32, 1>, c: usize) -> Result<f32> {
    t.data().get(c).copied().ok_or_else(|| {
        InceptionError::InvalidInput(format!(
            "per-channel vector of length {} has no channel {c}",
            t.shape()[0]
        ))
    })
}
