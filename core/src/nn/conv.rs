use crate::error::Result;
use crate::nn::{Activation, BatchNormSpec};
use crate::params::{Initializer, Regularizer};
use crate::shape::{Padding, Size2};

/// Descriptor of a convolution unit: conv, then optional bias, optional batch norm and the
/// activation.
///
/// A plain value. The builder methods return modified copies, so one descriptor can be the
/// template for a whole family of layers:
///
/// ```rust
/// use inception_rs::nn::ConvSpec;
/// use inception_rs::shape::{Padding, Size2};
///
/// let reduce = ConvSpec::new(192, [1, 7]);
/// let down = ConvSpec::new(320, 3).stride(2).padding(Padding::Valid);
/// assert_eq!(reduce.kernel, Size2::new(1, 7));
/// assert_eq!(down.stride, Size2::new(2, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvSpec {
    pub filters: usize,
    pub kernel: Size2,
    pub stride: Size2,
    pub padding: Padding,
    pub use_bias: bool,
    pub batch_norm: Option<BatchNormSpec>,
    pub activation: Activation,
    pub weight_init: Initializer,
    pub weight_regularizer: Option<Regularizer>,
    pub bias_init: Initializer,
    pub bias_regularizer: Option<Regularizer>,
}

impl ConvSpec {
    /// Stride 1, SAME padding, bias, no batch norm, ReLU, variance-scaling weights and
    /// L2 0.00005 on weight and bias.
    pub fn new(filters: usize, kernel: impl Into<Size2>) -> Self {
        Self {
            filters,
            kernel: kernel.into(),
            stride: Size2::from(1),
            padding: Padding::Same,
            use_bias: true,
            batch_norm: None,
            activation: Activation::Relu,
            weight_init: Initializer::conv_default(),
            weight_regularizer: Some(Regularizer::CONV_DEFAULT),
            bias_init: Initializer::Zeros,
            bias_regularizer: Some(Regularizer::CONV_DEFAULT),
        }
    }

    pub fn stride(mut self, stride: impl Into<Size2>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Enables batch norm with the default momentum 0.997 and epsilon 1.001e-5.
    pub fn batch_norm(self, enabled: bool) -> Self {
        self.batch_norm_with(enabled.then(BatchNormSpec::default))
    }

    pub fn batch_norm_with(mut self, spec: Option<BatchNormSpec>) -> Self {
        self.batch_norm = spec;
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Sets the activation from its configuration name.
    ///
    /// # Errors
    ///
    /// `UnsupportedActivation` for anything but `identity` and `rectified-linear`.
    pub fn activation_name(self, name: &str) -> Result<Self> {
        Ok(self.activation(name.parse()?))
    }

    pub fn weight_init(mut self, init: Initializer) -> Self {
        self.weight_init = init;
        self
    }

    pub fn bias_init(mut self, init: Initializer) -> Self {
        self.bias_init = init;
        self
    }

    /// Sets the same regularizer on weight and bias.
    pub fn regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.weight_regularizer = regularizer;
        self.bias_regularizer = regularizer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InceptionError;

    #[test]
    fn test_defaults() {
        let spec = ConvSpec::new(64, 3);
        assert_eq!(spec.kernel, Size2::new(3, 3));
        assert_eq!(spec.stride, Size2::new(1, 1));
        assert_eq!(spec.padding, Padding::Same);
        assert!(spec.use_bias);
        assert!(spec.batch_norm.is_none());
        assert_eq!(spec.activation, Activation::Relu);
        assert_eq!(spec.weight_regularizer, Some(Regularizer::L2(0.00005)));
    }

    #[test]
    fn test_builders_copy() {
        let base = ConvSpec::new(32, 3);
        let down = base.stride(2).padding(Padding::Valid).batch_norm(true);
        assert_eq!(base.stride, Size2::new(1, 1));
        assert_eq!(down.stride, Size2::new(2, 2));
        assert_eq!(down.batch_norm, Some(BatchNormSpec::default()));
        assert!(down.batch_norm(false).batch_norm.is_none());
    }

    #[test]
    fn test_activation_name() {
        let spec = ConvSpec::new(8, 1).activation_name("identity").unwrap();
        assert_eq!(spec.activation, Activation::Identity);

        let err = ConvSpec::new(8, 1).activation_name("swish").unwrap_err();
        assert!(matches!(err, InceptionError::UnsupportedActivation(_)));
    }
}
