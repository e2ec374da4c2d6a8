use crate::error::{InceptionError, Result};
use crate::shape::{Padding, Size2};
use std::fmt;
use std::str::FromStr;

/// Pooling reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Mean over the unpadded cells of the window.
    Avg,
    Max,
}

impl FromStr for PoolKind {
    type Err = InceptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "avg" => Ok(PoolKind::Avg),
            "max" => Ok(PoolKind::Max),
            other => Err(InceptionError::UnsupportedPooling(other.to_string())),
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolKind::Avg => "avg",
            PoolKind::Max => "max",
        })
    }
}

/// 2D pooling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSpec {
    pub kind: PoolKind,
    pub kernel: Size2,
    pub stride: Size2,
    pub padding: Padding,
}

impl PoolSpec {
    pub fn new(kind: PoolKind, kernel: impl Into<Size2>, stride: impl Into<Size2>, padding: Padding) -> Self {
        Self {
            kind,
            kernel: kernel.into(),
            stride: stride.into(),
            padding,
        }
    }

    pub fn max(kernel: impl Into<Size2>, stride: impl Into<Size2>, padding: Padding) -> Self {
        Self::new(PoolKind::Max, kernel, stride, padding)
    }

    pub fn avg(kernel: impl Into<Size2>, stride: impl Into<Size2>, padding: Padding) -> Self {
        Self::new(PoolKind::Avg, kernel, stride, padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_kind_names() {
        assert_eq!("avg".parse::<PoolKind>().unwrap(), PoolKind::Avg);
        assert_eq!("max".parse::<PoolKind>().unwrap(), PoolKind::Max);
        assert_eq!(PoolKind::Max.to_string(), "max");
        assert!(matches!(
            "min".parse::<PoolKind>(),
            Err(InceptionError::UnsupportedPooling(_))
        ));
    }

    #[test]
    fn test_constructors() {
        let p = PoolSpec::max(3, 2, Padding::Valid);
        assert_eq!(p.kind, PoolKind::Max);
        assert_eq!(p.kernel, Size2::new(3, 3));
        assert_eq!(p.stride, Size2::new(2, 2));
    }
}
