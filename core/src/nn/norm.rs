//! Batch normalization settings.
//!
//! Batch norm over the channel axis of `[N, C, H, W]`:
//! `y = (x - mean) / sqrt(var + epsilon) * gamma + beta`.
//!
//! In training mode `mean`/`var` are the batch moments and the moving statistics are
//! updated as `moving = momentum * moving + (1 - momentum) * batch`. In inference mode the
//! moving statistics are used as they are.

/// Hyper-parameters of one batch-norm layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormSpec {
    pub momentum: f32,
    pub epsilon: f32,
    /// Learn a per-channel shift (`beta`).
    pub center: bool,
    /// Learn a per-channel scale (`gamma`).
    pub scale: bool,
}

impl Default for BatchNormSpec {
    fn default() -> Self {
        Self {
            momentum: 0.997,
            epsilon: 1.001e-5,
            center: true,
            scale: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let spec = BatchNormSpec::default();
        assert_eq!(spec.momentum, 0.997);
        assert_eq!(spec.epsilon, 1.001e-5);
        assert!(spec.center && spec.scale);
    }
}
