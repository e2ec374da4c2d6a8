//! Parameter store, initializers and regularizers.
//!
//! Layers never own their weights. They ask the [`ParamStore`] for a parameter by its full
//! hierarchical name; the first request creates it (from a checkpoint value if one is staged,
//! otherwise from its [`Initializer`]) and every later request with the same name returns the
//! same tensor. This is how weights are shared between two calls that use the same scope.

use crate::backend::Backend;
use crate::checkpoint::StoredTensor;
use crate::error::{InceptionError, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which fan a variance-scaling initializer divides by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    FanIn,
    FanOut,
    FanAvg,
}

/// Distribution a variance-scaling initializer draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceDistribution {
    RandomNormal,
    TruncatedNormal,
    Uniform,
}

/// How a parameter's first value is produced.
///
/// Initializers are plain `Copy` values: one constant can configure any number of layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    Zeros,
    Ones,
    Constant(f32),
    RandomNormal { mean: f32, std: f32 },
    /// Normal samples redrawn until they fall within two standard deviations of the mean.
    TruncatedNormal { mean: f32, std: f32 },
    /// Variance `scale / fan`, with the fan picked by `mode`. Fans follow the
    /// `[out, in, kh, kw]` kernel layout (and `[units, in]` for dense weights).
    VarianceScaling {
        scale: f32,
        mode: FanMode,
        distribution: VarianceDistribution,
    },
}

/// Standard deviation of a unit normal truncated to `[-2, 2]`.
const TRUNCATED_NORMAL_STD: f32 = 0.879_625_7;

impl Initializer {
    /// The convolution weight default: variance scaling 1.0, fan-in, normal.
    pub const fn conv_default() -> Self {
        Initializer::VarianceScaling {
            scale: 1.0,
            mode: FanMode::FanIn,
            distribution: VarianceDistribution::RandomNormal,
        }
    }

    /// Draws `shape.iter().product()` values.
    pub fn sample<R: Rng + ?Sized>(&self, name: &str, shape: &[usize], rng: &mut R) -> Result<Vec<f32>> {
        let size: usize = shape.iter().product();
        let fail = |reason: String| InceptionError::Initializer {
            name: name.to_string(),
            reason,
        };

        let values = match *self {
            Initializer::Zeros => vec![0.0; size],
            Initializer::Ones => vec![1.0; size],
            Initializer::Constant(v) => vec![v; size],
            Initializer::RandomNormal { mean, std } => {
                if !(std.is_finite() && std >= 0.0) {
                    return Err(fail(format!(
                        "standard deviation must be finite and non-negative, got {std}"
                    )));
                }
                let normal = Normal::new(mean, std).map_err(|e| fail(e.to_string()))?;
                (0..size).map(|_| normal.sample(rng)).collect()
            }
            Initializer::TruncatedNormal { mean, std } => truncated_normal(size, mean, std, rng)
                .map_err(fail)?,
            Initializer::VarianceScaling {
                scale,
                mode,
                distribution,
            } => {
                let (fan_in, fan_out) = fans(shape);
                let fan = match mode {
                    FanMode::FanIn => fan_in,
                    FanMode::FanOut => fan_out,
                    FanMode::FanAvg => (fan_in + fan_out) / 2.0,
                };
                if scale <= 0.0 {
                    return Err(fail(format!("scale must be positive, got {scale}")));
                }
                let variance = scale / fan.max(1.0);
                match distribution {
                    VarianceDistribution::RandomNormal => {
                        let normal = Normal::new(0.0, variance.sqrt()).map_err(|e| fail(e.to_string()))?;
                        (0..size).map(|_| normal.sample(rng)).collect()
                    }
                    VarianceDistribution::TruncatedNormal => {
                        truncated_normal(size, 0.0, variance.sqrt() / TRUNCATED_NORMAL_STD, rng)
                            .map_err(fail)?
                    }
                    VarianceDistribution::Uniform => {
                        let limit = (3.0 * variance).sqrt();
                        (0..size).map(|_| rng.random_range(-limit..limit)).collect()
                    }
                }
            }
        };
        Ok(values)
    }
}

fn truncated_normal<R: Rng + ?Sized>(
    size: usize,
    mean: f32,
    std: f32,
    rng: &mut R,
) -> std::result::Result<Vec<f32>, String> {
    let unit = Normal::new(0.0f32, 1.0).map_err(|e| e.to_string())?;
    if !(std.is_finite() && std >= 0.0) {
        return Err(format!("standard deviation must be finite and non-negative, got {std}"));
    }
    let mut values = Vec::with_capacity(size);
    while values.len() < size {
        let z = unit.sample(rng);
        if z.abs() <= 2.0 {
            values.push(mean + std * z);
        }
    }
    Ok(values)
}

/// `(fan_in, fan_out)` of a parameter shape.
pub fn fans(shape: &[usize]) -> (f32, f32) {
    match shape {
        [] => (1.0, 1.0),
        [n] => (*n as f32, *n as f32),
        [out, inp] => (*inp as f32, *out as f32),
        [out, inp, spatial @ ..] => {
            let receptive: usize = spatial.iter().product();
            ((inp * receptive) as f32, (out * receptive) as f32)
        }
    }
}

/// Weight penalty added to a training loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regularizer {
    /// `l * sum(w²)`
    L2(f32),
}

impl Regularizer {
    /// Default weight decay for convolution kernels and biases.
    pub const CONV_DEFAULT: Regularizer = Regularizer::L2(0.00005);

    fn penalty(&self, sum_squares: f32) -> f32 {
        match *self {
            Regularizer::L2(l) => l * sum_squares,
        }
    }
}

/// How to create a parameter on first use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub initializer: Initializer,
    pub regularizer: Option<Regularizer>,
    pub trainable: bool,
}

impl ParamSpec {
    pub const fn new(initializer: Initializer) -> Self {
        Self {
            initializer,
            regularizer: None,
            trainable: true,
        }
    }

    pub const fn with_regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.regularizer = regularizer;
        self
    }

    /// Excluded from training updates (batch-norm moving statistics).
    pub const fn frozen(mut self) -> Self {
        self.trainable = false;
        self
    }
}

/// A parameter value of one of the ranks the network uses.
pub enum ParamValue<B: Backend> {
    Vector(B::Tensor<1>),
    Matrix(B::Tensor<2>),
    Kernel(B::Tensor<4>),
}

impl<B: Backend> Clone for ParamValue<B> {
    fn clone(&self) -> Self {
        match self {
            ParamValue::Vector(t) => ParamValue::Vector(t.clone()),
            ParamValue::Matrix(t) => ParamValue::Matrix(t.clone()),
            ParamValue::Kernel(t) => ParamValue::Kernel(t.clone()),
        }
    }
}

impl<B: Backend> std::fmt::Debug for ParamValue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Vector(t) => f.debug_tuple("Vector").field(t).finish(),
            ParamValue::Matrix(t) => f.debug_tuple("Matrix").field(t).finish(),
            ParamValue::Kernel(t) => f.debug_tuple("Kernel").field(t).finish(),
        }
    }
}

/// Generates the typed accessor of one `ParamValue` variant.
macro_rules! impl_param_access {
    ($variant:ident, $rank:literal, $as:ident, $as_mut:ident) => {
        impl<B: Backend> ParamValue<B> {
            pub fn $as(&self) -> Option<&B::Tensor<$rank>> {
                match self {
                    ParamValue::$variant(t) => Some(t),
                    _ => None,
                }
            }

            pub fn $as_mut(&mut self) -> Option<&mut B::Tensor<$rank>> {
                match self {
                    ParamValue::$variant(t) => Some(t),
                    _ => None,
                }
            }
        }
    };
}

impl_param_access!(Vector, 1, as_vector, as_vector_mut);
impl_param_access!(Matrix, 2, as_matrix, as_matrix_mut);
impl_param_access!(Kernel, 4, as_kernel, as_kernel_mut);

impl<B: Backend> ParamValue<B> {
    /// Copies the value to the host as a flat row-major vector.
    pub fn to_host(&self, backend: &B) -> Result<Vec<f32>> {
        match self {
            ParamValue::Vector(t) => backend.to_host(t),
            ParamValue::Matrix(t) => backend.to_host(t),
            ParamValue::Kernel(t) => backend.to_host(t),
        }
    }

    fn sum_squares(&self, backend: &B) -> Result<f32> {
        match self {
            ParamValue::Vector(t) => backend.sum_squares(t),
            ParamValue::Matrix(t) => backend.sum_squares(t),
            ParamValue::Kernel(t) => backend.sum_squares(t),
        }
    }
}

/// A registered parameter.
#[derive(Debug)]
pub struct Parameter<B: Backend> {
    name: String,
    shape: Vec<usize>,
    spec: ParamSpec,
    value: ParamValue<B>,
}

impl<B: Backend> Parameter<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn spec(&self) -> &ParamSpec {
        &self.spec
    }

    pub fn value(&self) -> &ParamValue<B> {
        &self.value
    }
}

/// Outcome of [`ParamStore::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreReport {
    /// Values written into already registered parameters.
    pub applied: usize,
    /// Values staged for parameters that do not exist yet.
    pub staged: usize,
}

/// Insertion-ordered, name-keyed parameter registry.
pub struct ParamStore<B: Backend> {
    params: Vec<Parameter<B>>,
    index: HashMap<String, usize>,
    pending: HashMap<String, StoredTensor>,
}

impl<B: Backend> Default for ParamStore<B> {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

/// Generates `get_or_create_*` for one rank.
macro_rules! impl_get_or_create {
    ($fn_name:ident, $variant:ident, $rank:literal, $as:ident) => {
        /// Returns the parameter `name`, creating it on first use.
        ///
        /// # Errors
        ///
        /// `ParameterShapeConflict` if `name` exists (or is staged from a checkpoint) with a
        /// different shape.
        pub fn $fn_name(
            &mut self,
            backend: &B,
            name: &str,
            shape: [usize; $rank],
            spec: ParamSpec,
        ) -> Result<&B::Tensor<$rank>> {
            let idx = match self.index.get(name) {
                Some(&idx) => {
                    let existing = &self.params[idx];
                    if existing.shape != shape {
                        return Err(InceptionError::ParameterShapeConflict {
                            name: name.to_string(),
                            existing: existing.shape.clone(),
                            requested: shape.to_vec(),
                        });
                    }
                    idx
                }
                None => {
                    if let Some(stored) = self.pending.get(name) {
                        if stored.shape != shape {
                            return Err(InceptionError::ParameterShapeConflict {
                                name: name.to_string(),
                                existing: stored.shape.clone(),
                                requested: shape.to_vec(),
                            });
                        }
                    }
                    // staged entries leave `pending` only once their shape matched
                    let value = match self.pending.remove(name) {
                        Some(stored) => {
                            debug!(name, "parameter restored from checkpoint");
                            backend.from_host(stored.data, shape)?
                        }
                        None => backend.materialize(name, shape, spec.initializer)?,
                    };
                    self.insert(name, shape.to_vec(), spec, ParamValue::$variant(value))
                }
            };

            self.params[idx].value.$as().ok_or_else(|| InceptionError::ParameterShapeConflict {
                name: name.to_string(),
                existing: self.params[idx].shape.clone(),
                requested: shape.to_vec(),
            })
        }
    };
}

impl<B: Backend> ParamStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    impl_get_or_create!(get_or_create_vector, Vector, 1, as_vector);
    impl_get_or_create!(get_or_create_matrix, Matrix, 2, as_matrix);
    impl_get_or_create!(get_or_create_kernel, Kernel, 4, as_kernel);

    fn insert(&mut self, name: &str, shape: Vec<usize>, spec: ParamSpec, value: ParamValue<B>) -> usize {
        let idx = self.params.len();
        self.params.push(Parameter {
            name: name.to_string(),
            shape,
            spec,
            value,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Replaces the value of an existing rank-1 parameter (moving statistics updates).
    pub fn update_vector(&mut self, backend: &B, name: &str, value: B::Tensor<1>) -> Result<()> {
        let param = self.lookup_mut(name)?;
        let new_shape = backend.shape(&value);
        if param.shape != new_shape {
            return Err(InceptionError::ParameterShapeConflict {
                name: name.to_string(),
                existing: param.shape.clone(),
                requested: new_shape.to_vec(),
            });
        }
        match param.value.as_vector_mut() {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(InceptionError::ParameterShapeConflict {
                name: name.to_string(),
                existing: param.shape.clone(),
                requested: new_shape.to_vec(),
            }),
        }
    }

    fn lookup_mut(&mut self, name: &str) -> Result<&mut Parameter<B>> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| InceptionError::Config(format!("unknown parameter {name}")))?;
        Ok(&mut self.params[idx])
    }

    pub fn get(&self, name: &str) -> Option<&Parameter<B>> {
        self.index.get(name).map(|&idx| &self.params[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Parameters in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter<B>> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar values across all parameters.
    pub fn num_elements(&self) -> usize {
        self.params.iter().map(Parameter::size).sum()
    }

    pub fn num_trainable_elements(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.spec.trainable)
            .map(Parameter::size)
            .sum()
    }

    /// Sum of all regularization penalties at the current values.
    pub fn penalty(&self, backend: &B) -> Result<f32> {
        let mut total = 0.0;
        for param in &self.params {
            if let Some(reg) = param.spec.regularizer {
                total += reg.penalty(param.value.sum_squares(backend)?);
            }
        }
        Ok(total)
    }

    /// Copies every parameter to the host, in creation order.
    pub fn export(&self, backend: &B) -> Result<Vec<(String, StoredTensor)>> {
        self.params
            .iter()
            .map(|p| {
                Ok((
                    p.name.clone(),
                    StoredTensor {
                        shape: p.shape.clone(),
                        data: p.value.to_host(backend)?,
                    },
                ))
            })
            .collect()
    }

    /// Applies checkpoint values.
    ///
    /// Registered parameters are overwritten; the rest are staged and picked up by the first
    /// `get_or_create_*` call for that name. Every entry is checked before anything changes,
    /// so a failed restore leaves the store untouched.
    pub fn restore(&mut self, backend: &B, stored: HashMap<String, StoredTensor>) -> Result<RestoreReport> {
        let mut updates = Vec::new();
        let mut staged = Vec::new();
        for (name, tensor) in stored {
            let Some(&idx) = self.index.get(&name) else {
                staged.push((name, tensor));
                continue;
            };

            let param = &self.params[idx];
            if param.shape != tensor.shape {
                return Err(InceptionError::ParameterShapeConflict {
                    name,
                    existing: param.shape.clone(),
                    requested: tensor.shape,
                });
            }
            let value = match &param.value {
                ParamValue::Vector(_) => ParamValue::Vector(backend.from_host(tensor.data, rank::<1>(&tensor.shape)?)?),
                ParamValue::Matrix(_) => ParamValue::Matrix(backend.from_host(tensor.data, rank::<2>(&tensor.shape)?)?),
                ParamValue::Kernel(_) => ParamValue::Kernel(backend.from_host(tensor.data, rank::<4>(&tensor.shape)?)?),
            };
            updates.push((idx, value));
        }

        let report = RestoreReport {
            applied: updates.len(),
            staged: staged.len(),
        };
        for (idx, value) in updates {
            self.params[idx].value = value;
        }
        self.pending.extend(staged);
        Ok(report)
    }

    /// Names of staged checkpoint values that no layer has claimed.
    pub fn pending(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pending.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drops unclaimed checkpoint values, logging each one.
    pub fn clear_pending(&mut self) -> usize {
        for name in self.pending() {
            warn!(name, "checkpoint entry was never used");
        }
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

fn rank<const RANK: usize>(shape: &[usize]) -> Result<[usize; RANK]> {
    shape.try_into().map_err(|_| {
        InceptionError::Checkpoint(format!("expected a rank-{RANK} shape, got {shape:?}"))
    })
}
