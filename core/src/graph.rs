//! Network construction primitives.
//!
//! A [`GraphBuilder`] pairs a runtime with a parameter store. Layers are plain method calls:
//! each takes its scope explicitly, fetches (or creates) its parameters by name and returns
//! the output tensor. There is no graph object; a network is ordinary function composition.

use crate::backend::Backend;
use crate::error::{InceptionError, Result};
use crate::names::NamePath;
use crate::nn::{Activation, BatchNormSpec, ConvSpec, DenseSpec, PoolKind, PoolSpec};
use crate::params::{Initializer, ParamSpec, ParamStore};
use crate::shape::{Layout, concat_shape};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Whether layers behave as in training (batch statistics, dropout) or inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Inference,
    Training,
}

pub struct GraphBuilder<'a, B: Backend> {
    backend: &'a B,
    store: &'a mut ParamStore<B>,
    mode: Mode,
}

impl<'a, B: Backend> GraphBuilder<'a, B> {
    pub fn new(backend: &'a B, store: &'a mut ParamStore<B>, mode: Mode) -> Self {
        Self { backend, store, mode }
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub fn store(&self) -> &ParamStore<B> {
        self.store
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn shape<const RANK: usize>(&self, x: &B::Tensor<RANK>) -> [usize; RANK] {
        self.backend.shape(x)
    }

    /// Convolution unit: conv, then bias, batch norm and activation as configured.
    ///
    /// Creates `{name}-weight` of shape `[filters, C_in, kh, kw]`, optionally `{name}-bias`
    /// and, with batch norm, the `{name}_bn-*` statistics. Calling it again with the same
    /// `name` reuses the same weights.
    pub fn conv_unit(&mut self, name: &NamePath, input: &B::Tensor<4>, spec: &ConvSpec) -> Result<B::Tensor<4>> {
        let [_, in_channels, h, w] = self.backend.shape(input);
        let weight = self.store.get_or_create_kernel(
            self.backend,
            &name.param("weight"),
            [spec.filters, in_channels, spec.kernel.h, spec.kernel.w],
            ParamSpec::new(spec.weight_init).with_regularizer(spec.weight_regularizer),
        )?;
        let padding = spec.padding.resolve([h, w], spec.kernel, spec.stride);
        let mut out = self
            .backend
            .conv2d(input, weight, spec.stride.as_array(), padding)?;

        if spec.use_bias {
            let bias = self.store.get_or_create_vector(
                self.backend,
                &name.param("bias"),
                [spec.filters],
                ParamSpec::new(spec.bias_init).with_regularizer(spec.bias_regularizer),
            )?;
            out = self.backend.bias_add(&out, bias)?;
        }

        if let Some(bn) = &spec.batch_norm {
            out = self.batch_norm(&name.with_suffix("_bn"), &out, bn)?;
        }

        let out = self.activation(&out, spec.activation)?;
        trace!(name = %name, shape = ?self.backend.shape(&out), "conv unit");
        Ok(out)
    }

    /// Batch normalization over channels with parameters `{name}-gamma`, `-beta`,
    /// `-moving_mean` and `-moving_variance`.
    ///
    /// In training mode the batch moments normalize the input and the moving statistics are
    /// updated in the store.
    pub fn batch_norm(&mut self, name: &NamePath, x: &B::Tensor<4>, spec: &BatchNormSpec) -> Result<B::Tensor<4>> {
        let channels = self.backend.shape(x)[1];
        let gamma = if spec.scale {
            Some(self.vector(&name.param("gamma"), channels, ParamSpec::new(Initializer::Ones))?)
        } else {
            None
        };
        let beta = if spec.center {
            Some(self.vector(&name.param("beta"), channels, ParamSpec::new(Initializer::Zeros))?)
        } else {
            None
        };
        let mean_name = name.param("moving_mean");
        let var_name = name.param("moving_variance");
        let moving_mean = self.vector(&mean_name, channels, ParamSpec::new(Initializer::Zeros).frozen())?;
        let moving_var = self.vector(&var_name, channels, ParamSpec::new(Initializer::Ones).frozen())?;

        match self.mode {
            Mode::Inference => self.backend.batch_norm(
                x,
                &moving_mean,
                &moving_var,
                gamma.as_ref(),
                beta.as_ref(),
                spec.epsilon,
            ),
            Mode::Training => {
                let (batch_mean, batch_var) = self.backend.moments(x)?;
                let out = self.backend.batch_norm(
                    x,
                    &batch_mean,
                    &batch_var,
                    gamma.as_ref(),
                    beta.as_ref(),
                    spec.epsilon,
                )?;
                let new_mean = self
                    .backend
                    .moving_average(&moving_mean, &batch_mean, spec.momentum)?;
                let new_var = self
                    .backend
                    .moving_average(&moving_var, &batch_var, spec.momentum)?;
                self.store.update_vector(self.backend, &mean_name, new_mean)?;
                self.store.update_vector(self.backend, &var_name, new_var)?;
                Ok(out)
            }
        }
    }

    fn vector(&mut self, name: &str, len: usize, spec: ParamSpec) -> Result<B::Tensor<1>> {
        Ok(self
            .store
            .get_or_create_vector(self.backend, name, [len], spec)?
            .clone())
    }

    pub fn activation<const RANK: usize>(&self, x: &B::Tensor<RANK>, activation: Activation) -> Result<B::Tensor<RANK>> {
        match activation {
            Activation::Identity => Ok(x.clone()),
            Activation::Relu => self.backend.relu(x),
        }
    }

    pub fn gelu<const RANK: usize>(&self, x: &B::Tensor<RANK>) -> Result<B::Tensor<RANK>> {
        self.backend.gelu(x)
    }

    pub fn pool(&self, x: &B::Tensor<4>, spec: &PoolSpec) -> Result<B::Tensor<4>> {
        let [_, _, h, w] = self.backend.shape(x);
        let padding = spec.padding.resolve([h, w], spec.kernel, spec.stride);
        let kernel = spec.kernel.as_array();
        let stride = spec.stride.as_array();
        match spec.kind {
            PoolKind::Max => self.backend.max_pool2d(x, kernel, stride, padding),
            PoolKind::Avg => self.backend.avg_pool2d(x, kernel, stride, padding),
        }
    }

    /// Concatenates branch outputs on the channel axis, in the given order.
    ///
    /// # Errors
    ///
    /// `BranchShapeMismatch` if the branches disagree on batch or spatial size.
    pub fn concat_branches(&self, scope: &NamePath, branches: &[&B::Tensor<4>]) -> Result<B::Tensor<4>> {
        let shapes: Vec<[usize; 4]> = branches.iter().map(|b| self.backend.shape(*b)).collect();
        if concat_shape(&shapes, 1).is_none() {
            return Err(InceptionError::BranchShapeMismatch {
                scope: scope.to_string(),
                shapes: shapes.iter().map(|s| s.to_vec()).collect(),
            });
        }
        self.backend.concat(branches, 1)
    }

    /// Fully connected layer with `{name}-weight` `[units, features]` and `{name}-bias`.
    pub fn dense(&mut self, name: &NamePath, x: &B::Tensor<2>, spec: &DenseSpec) -> Result<B::Tensor<2>> {
        let features = self.backend.shape(x)[1];
        let weight_name = name.param("weight");
        let weight_shape = [spec.units, features];
        let weight_spec = ParamSpec::new(spec.weight_init).with_regularizer(spec.weight_regularizer);

        // weight before bias keeps declaration order in the store
        let weight = self
            .store
            .get_or_create_matrix(self.backend, &weight_name, weight_shape, weight_spec)?
            .clone();
        let bias = if spec.use_bias {
            let bias_spec = ParamSpec::new(spec.bias_init).with_regularizer(spec.bias_regularizer);
            Some(self.vector(&name.param("bias"), spec.units, bias_spec)?)
        } else {
            None
        };
        self.backend.dense(x, &weight, bias.as_ref())
    }

    /// Dropout, active in training mode only.
    pub fn dropout<const RANK: usize>(&self, x: &B::Tensor<RANK>, rate: f32) -> Result<B::Tensor<RANK>> {
        match self.mode {
            Mode::Training if rate > 0.0 => self.backend.dropout(x, rate),
            _ => Ok(x.clone()),
        }
    }

    pub fn flatten(&self, x: &B::Tensor<4>) -> Result<B::Tensor<2>> {
        self.backend.flatten(x)
    }

    /// Brings an image batch in `layout` to channel-first order.
    pub fn to_channel_first(&self, x: &B::Tensor<4>, layout: Layout) -> Result<B::Tensor<4>> {
        match layout {
            Layout::ChannelFirst => Ok(x.clone()),
            Layout::ChannelLast => self.backend.permute(x, layout.to_channel_first()),
        }
    }
}
