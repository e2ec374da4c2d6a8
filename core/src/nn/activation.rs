//! Activation Functions.
//!
//! Convolution units accept exactly two activations, named the way model configurations
//! name them: `identity` and `rectified-linear`. Anything else is rejected when the layer
//! descriptor is built, before any tensor op runs.
//!
//! The feed-forward block additionally uses GELU, which is applied directly rather than
//! selected by name.

use crate::error::{InceptionError, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    Identity,
    /// `max(0, x)`
    #[default]
    Relu,
}

impl Activation {
    /// The configuration name of this activation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Relu => "rectified-linear",
        }
    }
}

impl FromStr for Activation {
    type Err = InceptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "identity" => Ok(Activation::Identity),
            "rectified-linear" => Ok(Activation::Relu),
            other => Err(InceptionError::UnsupportedActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the GELU (Gaussian Error Linear Unit) activation function.
///
/// $$ \text{GELU}(x) \approx 0.5 x (1 + \tanh[\sqrt{2/\pi} (x + 0.044715 x^3)]) $$
///
/// This is the "tanh approximation" of GELU.
pub fn gelu(x: f32) -> f32 {
    let sqrt_2_over_pi = (2.0f32 / std::f32::consts::PI).sqrt();
    let inner = sqrt_2_over_pi * (x + 0.044715 * x.powi(3));
    0.5 * x * (1.0 + inner.tanh())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("identity".parse::<Activation>().unwrap(), Activation::Identity);
        assert_eq!("rectified-linear".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!(Activation::Relu.to_string(), "rectified-linear");
    }

    #[test]
    fn test_rejects_other_names() {
        for name in ["relu", "tanh", "sigmoid", "Identity", ""] {
            let err = name.parse::<Activation>().unwrap_err();
            assert!(matches!(err, InceptionError::UnsupportedActivation(ref n) if n == name));
        }
    }

    #[test]
    fn test_gelu_value() {
        assert!(gelu(0.0).abs() < 1e-6);
        // sqrt(2/pi) * 1.044715 = 0.83355; 0.5 * (1 + tanh(0.83355)) = 0.8412
        assert!((gelu(1.0) - 0.8412).abs() < 1e-3);
        assert!(gelu(-10.0).abs() < 1e-3);
    }
}
