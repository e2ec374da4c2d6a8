use crate::params::{Initializer, Regularizer};

/// Descriptor of a fully connected layer over `[N, features]`.
///
/// Parameters are `{scope}-weight` of shape `[units, features]` and, when enabled,
/// `{scope}-bias` of shape `[units]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseSpec {
    pub units: usize,
    pub use_bias: bool,
    pub weight_init: Initializer,
    pub weight_regularizer: Option<Regularizer>,
    pub bias_init: Initializer,
    pub bias_regularizer: Option<Regularizer>,
}

impl DenseSpec {
    /// Bias on, zero bias init, no regularizers, truncated-normal weights with std 0.02.
    pub fn new(units: usize) -> Self {
        Self {
            units,
            use_bias: true,
            weight_init: Initializer::TruncatedNormal { mean: 0.0, std: 0.02 },
            weight_regularizer: None,
            bias_init: Initializer::Zeros,
            bias_regularizer: None,
        }
    }

    pub fn bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn weight_init(mut self, init: Initializer) -> Self {
        self.weight_init = init;
        self
    }

    pub fn bias_init(mut self, init: Initializer) -> Self {
        self.bias_init = init;
        self
    }

    pub fn regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.weight_regularizer = regularizer;
        self.bias_regularizer = regularizer;
        self
    }
}
