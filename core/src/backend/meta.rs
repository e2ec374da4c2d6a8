//! Shape-only runtime.
//!
//! Tensors carry a shape and nothing else; every op validates its inputs, computes the output
//! shape with the same arithmetic the CPU kernels use, and appends an [`OpRecord`] to the trace.

use super::Backend;
use crate::error::{InceptionError, Result};
use crate::params::Initializer;
use crate::shape::{Size2, concat_shape, window_output2d};
use inception_rs_kernels::Padding2d;
use std::cell::RefCell;

/// A tensor without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaTensor<const RANK: usize> {
    shape: [usize; RANK],
}

impl<const RANK: usize> MetaTensor<RANK> {
    pub const fn new(shape: [usize; RANK]) -> Self {
        Self { shape }
    }

    pub const fn shape(&self) -> &[usize; RANK] {
        &self.shape
    }
}

/// One executed op and the shape it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    pub op: &'static str,
    pub output: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct MetaBackend {
    trace: RefCell<Vec<OpRecord>>,
}

impl MetaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ops executed so far, in order.
    pub fn trace(&self) -> Vec<OpRecord> {
        self.trace.borrow().clone()
    }

    /// Empties the trace. The trace only grows otherwise, one record per executed op.
    pub fn clear_trace(&self) {
        self.trace.borrow_mut().clear();
    }

    /// Number of recorded ops named `op`.
    pub fn count(&self, op: &str) -> usize {
        self.trace.borrow().iter().filter(|r| r.op == op).count()
    }

    fn record<const RANK: usize>(&self, op: &'static str, shape: [usize; RANK]) -> MetaTensor<RANK> {
        self.trace.borrow_mut().push(OpRecord {
            op,
            output: shape.to_vec(),
        });
        MetaTensor { shape }
    }
}

fn mismatch(op: &str, expected: &[usize], got: &[usize]) -> InceptionError {
    InceptionError::InvalidInput(format!("{op}: expected {expected:?}, got {got:?}"))
}

fn check_channels(op: &str, x: &MetaTensor<4>, v: &MetaTensor<1>) -> Result<()> {
    if v.shape[0] != x.shape[1] {
        return Err(mismatch(op, &[x.shape[1]], &v.shape));
    }
    Ok(())
}

impl MetaBackend {
    fn pool(
        &self,
        op: &'static str,
        x: &MetaTensor<4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<MetaTensor<4>> {
        let [n, c, h, w] = x.shape;
        let [oh, ow] = window_output2d([h, w], Size2::from(kernel), Size2::from(stride), padding)?;
        Ok(self.record(op, [n, c, oh, ow]))
    }
}

impl Backend for MetaBackend {
    type Tensor<const RANK: usize> = MetaTensor<RANK>;

    fn name(&self) -> &'static str {
        "meta"
    }

    fn shape<const RANK: usize>(&self, t: &MetaTensor<RANK>) -> [usize; RANK] {
        t.shape
    }

    fn materialize<const RANK: usize>(
        &self,
        _name: &str,
        shape: [usize; RANK],
        _init: Initializer,
    ) -> Result<MetaTensor<RANK>> {
        Ok(self.record("materialize", shape))
    }

    fn from_host<const RANK: usize>(&self, data: Vec<f32>, shape: [usize; RANK]) -> Result<MetaTensor<RANK>> {
        let size: usize = shape.iter().product();
        if data.len() != size {
            return Err(mismatch("from_host", &[size], &[data.len()]));
        }
        Ok(self.record("from_host", shape))
    }

    fn to_host<const RANK: usize>(&self, t: &MetaTensor<RANK>) -> Result<Vec<f32>> {
        Err(InceptionError::MissingHostData(format!("{:?}", t.shape)))
    }

    fn conv2d(
        &self,
        x: &MetaTensor<4>,
        weight: &MetaTensor<4>,
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<MetaTensor<4>> {
        let [n, c, h, w] = x.shape;
        let [filters, in_channels, kh, kw] = weight.shape;
        if in_channels != c {
            return Err(mismatch("conv2d", &[c], &[in_channels]));
        }
        let [oh, ow] = window_output2d([h, w], Size2::new(kh, kw), Size2::from(stride), padding)?;
        Ok(self.record("conv2d", [n, filters, oh, ow]))
    }

    fn bias_add(&self, x: &MetaTensor<4>, bias: &MetaTensor<1>) -> Result<MetaTensor<4>> {
        check_channels("bias_add", x, bias)?;
        Ok(self.record("bias_add", x.shape))
    }

    fn batch_norm(
        &self,
        x: &MetaTensor<4>,
        mean: &MetaTensor<1>,
        variance: &MetaTensor<1>,
        gamma: Option<&MetaTensor<1>>,
        beta: Option<&MetaTensor<1>>,
        _epsilon: f32,
    ) -> Result<MetaTensor<4>> {
        for v in [Some(mean), Some(variance), gamma, beta].into_iter().flatten() {
            check_channels("batch_norm", x, v)?;
        }
        Ok(self.record("batch_norm", x.shape))
    }

    fn moments(&self, x: &MetaTensor<4>) -> Result<(MetaTensor<1>, MetaTensor<1>)> {
        let c = [x.shape[1]];
        Ok((self.record("moments", c), MetaTensor::new(c)))
    }

    fn moving_average(
        &self,
        moving: &MetaTensor<1>,
        batch: &MetaTensor<1>,
        _momentum: f32,
    ) -> Result<MetaTensor<1>> {
        if moving.shape != batch.shape {
            return Err(mismatch("moving_average", &moving.shape, &batch.shape));
        }
        Ok(self.record("moving_average", moving.shape))
    }

    fn relu<const RANK: usize>(&self, x: &MetaTensor<RANK>) -> Result<MetaTensor<RANK>> {
        Ok(self.record("relu", x.shape))
    }

    fn gelu<const RANK: usize>(&self, x: &MetaTensor<RANK>) -> Result<MetaTensor<RANK>> {
        Ok(self.record("gelu", x.shape))
    }

    fn dropout<const RANK: usize>(&self, x: &MetaTensor<RANK>, rate: f32) -> Result<MetaTensor<RANK>> {
        if !(0.0..1.0).contains(&rate) {
            return Err(InceptionError::Config(format!(
                "dropout rate must be in [0, 1), got {rate}"
            )));
        }
        Ok(self.record("dropout", x.shape))
    }

    fn max_pool2d(
        &self,
        x: &MetaTensor<4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<MetaTensor<4>> {
        self.pool("max_pool2d", x, kernel, stride, padding)
    }

    fn avg_pool2d(
        &self,
        x: &MetaTensor<4>,
        kernel: [usize; 2],
        stride: [usize; 2],
        padding: Padding2d,
    ) -> Result<MetaTensor<4>> {
        self.pool("avg_pool2d", x, kernel, stride, padding)
    }

    fn concat<const RANK: usize>(&self, xs: &[&MetaTensor<RANK>], axis: usize) -> Result<MetaTensor<RANK>> {
        let shapes: Vec<[usize; RANK]> = xs.iter().map(|t| t.shape).collect();
        let shape = concat_shape(&shapes, axis).ok_or_else(|| {
            InceptionError::InvalidInput(format!("concat on axis {axis}: incompatible {shapes:?}"))
        })?;
        Ok(self.record("concat", shape))
    }

    fn permute<const RANK: usize>(&self, x: &MetaTensor<RANK>, perm: [usize; RANK]) -> Result<MetaTensor<RANK>> {
        let mut seen = [false; RANK];
        let mut shape = [0; RANK];
        for (dim, &axis) in shape.iter_mut().zip(perm.iter()) {
            if axis >= RANK || seen[axis] {
                return Err(InceptionError::InvalidInput(format!(
                    "{perm:?} is not a permutation of {RANK} axes"
                )));
            }
            seen[axis] = true;
            *dim = x.shape[axis];
        }
        Ok(self.record("permute", shape))
    }

    fn flatten(&self, x: &MetaTensor<4>) -> Result<MetaTensor<2>> {
        let [n, c, h, w] = x.shape;
        Ok(self.record("flatten", [n, c * h * w]))
    }

    fn dense(
        &self,
        x: &MetaTensor<2>,
        weight: &MetaTensor<2>,
        bias: Option<&MetaTensor<1>>,
    ) -> Result<MetaTensor<2>> {
        let [n, features] = x.shape;
        let [units, in_features] = weight.shape;
        if features != in_features {
            return Err(mismatch("dense", &[features], &[in_features]));
        }
        if let Some(bias) = bias {
            if bias.shape[0] != units {
                return Err(mismatch("dense bias", &[units], &bias.shape));
            }
        }
        Ok(self.record("dense", [n, units]))
    }

    fn sum_squares<const RANK: usize>(&self, t: &MetaTensor<RANK>) -> Result<f32> {
        Err(InceptionError::MissingHostData(format!("{:?}", t.shape)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Padding;

    #[test]
    fn test_conv2d_shapes() {
        let meta = MetaBackend::new();
        let x = MetaTensor::new([2, 3, 299, 299]);
        let w = MetaTensor::new([32, 3, 3, 3]);
        let y = meta.conv2d(&x, &w, [2, 2], [[0, 0], [0, 0]]).unwrap();
        assert_eq!(y.shape(), &[2, 32, 149, 149]);

        let w = MetaTensor::new([64, 32, 3, 3]);
        let pad = Padding::Same.resolve([149, 149], Size2::from(3), Size2::from(1));
        let y = meta.conv2d(&y, &w, [1, 1], pad).unwrap();
        assert_eq!(y.shape(), &[2, 64, 149, 149]);

        let bad = MetaTensor::new([64, 16, 3, 3]);
        assert!(meta.conv2d(&y, &bad, [1, 1], pad).is_err());
    }

    #[test]
    fn test_trace() {
        let meta = MetaBackend::new();
        let x = MetaTensor::new([1, 8, 8, 8]);
        let y = meta.max_pool2d(&x, [3, 3], [2, 2], [[0, 0], [0, 0]]).unwrap();
        let _ = meta.relu(&y).unwrap();
        assert_eq!(meta.count("max_pool2d"), 1);
        assert_eq!(
            meta.trace(),
            vec![
                OpRecord { op: "max_pool2d", output: vec![1, 8, 3, 3] },
                OpRecord { op: "relu", output: vec![1, 8, 3, 3] },
            ]
        );

        meta.clear_trace();
        assert!(meta.trace().is_empty());
        let _ = meta.relu(&y).unwrap();
        assert_eq!(meta.count("relu"), 1);
    }

    #[test]
    fn test_concat_mismatch() {
        let meta = MetaBackend::new();
        let a = MetaTensor::new([1, 4, 17, 17]);
        let b = MetaTensor::new([1, 4, 8, 8]);
        assert!(meta.concat(&[&a, &b], 1).is_err());
        let c = meta.concat(&[&a, &a], 1).unwrap();
        assert_eq!(c.shape(), &[1, 8, 17, 17]);
    }

    #[test]
    fn test_no_host_data() {
        let meta = MetaBackend::new();
        let t = MetaTensor::new([3]);
        assert!(matches!(meta.to_host(&t), Err(InceptionError::MissingHostData(_))));
    }
}
