//! Inception-v3.
//!
//! The network is a stem of plain convolutions followed by eleven branch-and-merge blocks
//! (`mixed_0` to `mixed_10`) of five kinds:
//!
//! | Block | Branches, in concat order | Output channels |
//! |---|---|---|
//! | A | 1x1; 1x1→5x5; 1x1→3x3→3x3; avgpool→1x1 | 224 + (32 at index 0, else 64) |
//! | B | 3x3/2; 1x1→3x3→3x3/2; maxpool/2 | 480 + C_in |
//! | C | 1x1; 1x1→1x7→7x1; 1x1→7x1→1x7→7x1→1x7; avgpool→1x1 | 768 |
//! | D | 1x1→3x3/2; 1x1→1x7→7x1→3x3/2; maxpool/2 | 512 + C_in |
//! | E | 1x1; 1x1→(1x3 ‖ 3x1); 1x1→3x3→(1x3 ‖ 3x1); pool→1x1 | 2048 |
//!
//! Every branch reads the block input. Only the inner splits of E share a tensor: both
//! halves read the same reduced intermediate. The `/2` convolutions and pools are VALID, so
//! B and D take 35 to 17 and 17 to 8.
//!
//! Parameter names mirror the structure, e.g. `InceptionV3/mixed_4/branch7x7/conv1-weight`.

use crate::backend::Backend;
use crate::error::{InceptionError, Result};
use crate::graph::GraphBuilder;
use crate::models::traits::Classifier;
use crate::names::NamePath;
use crate::nn::{ConvSpec, DenseSpec, PoolKind, PoolSpec};
use crate::params::Initializer;
use crate::shape::{Layout, Padding, Size2, window_output};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level scope of every Inception-v3 parameter.
pub const SCOPE: &str = "InceptionV3";

/// Standard deviation of the classifier's truncated-normal weights.
pub const FC_STDDEV: f32 = 0.816_496_6;

/// Bottleneck widths of the four C blocks.
pub const C_WIDTHS: [usize; 4] = [128, 160, 160, 192];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InceptionConfig {
    pub num_classes: usize,
    /// Batch-normalize every convolution unit.
    pub batch_norm: bool,
    /// Dropout on the pooled features before `fc1`. Zero disables it.
    pub dropout_rate: f32,
}

impl InceptionConfig {
    /// The reference network: 1000 classes, no batch norm, no dropout.
    pub fn v3() -> Self {
        Self {
            num_classes: 1000,
            batch_norm: false,
            dropout_rate: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(InceptionError::Config("num_classes must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(InceptionError::Config(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }

    /// Template every convolution unit of the network starts from.
    pub fn conv_template(&self) -> ConvSpec {
        ConvSpec::new(0, 1).batch_norm(self.batch_norm)
    }
}

impl Default for InceptionConfig {
    fn default() -> Self {
        Self::v3()
    }
}

/// `template` with the given width and kernel, stride 1 and SAME padding.
fn unit(template: &ConvSpec, filters: usize, kernel: impl Into<Size2>) -> ConvSpec {
    ConvSpec {
        filters,
        kernel: kernel.into(),
        stride: Size2::from(1),
        padding: Padding::Same,
        ..*template
    }
}

/// `template` as a stride-2 VALID 3x3 convolution.
fn reduction(template: &ConvSpec, filters: usize) -> ConvSpec {
    unit(template, filters, 3).stride(2).padding(Padding::Valid)
}

const fn downsample_pool() -> PoolSpec {
    PoolSpec {
        kind: PoolKind::Max,
        kernel: Size2::new(3, 3),
        stride: Size2::new(2, 2),
        padding: Padding::Valid,
    }
}

const fn branch_pool(kind: PoolKind) -> PoolSpec {
    PoolSpec {
        kind,
        kernel: Size2::new(3, 3),
        stride: Size2::new(1, 1),
        padding: Padding::Same,
    }
}

/// Block A under `scope/mixed_{index}`. The pool branch has 32 filters at index 0 and 64
/// everywhere else.
pub fn inception_a<B: Backend>(
    g: &mut GraphBuilder<'_, B>,
    scope: &NamePath,
    x: &B::Tensor<4>,
    index: usize,
    template: &ConvSpec,
) -> Result<B::Tensor<4>> {
    let scope = scope.child(format!("mixed_{index}"));

    let path = scope.child("branch1x1");
    let branch1x1 = g.conv_unit(&path.child("conv0"), x, &unit(template, 64, 1))?;

    let path = scope.child("branch5x5");
    let branch5x5 = g.conv_unit(&path.child("conv0"), x, &unit(template, 48, 1))?;
    let branch5x5 = g.conv_unit(&path.child("conv1"), &branch5x5, &unit(template, 64, 5))?;

    let path = scope.child("branch3x3dbl");
    let branch3x3dbl = g.conv_unit(&path.child("conv0"), x, &unit(template, 64, 1))?;
    let branch3x3dbl = g.conv_unit(&path.child("conv1"), &branch3x3dbl, &unit(template, 96, 3))?;
    let branch3x3dbl = g.conv_unit(&path.child("conv2"), &branch3x3dbl, &unit(template, 96, 3))?;

    let path = scope.child("branch_pool");
    let pool_filters = if index == 0 { 32 } else { 64 };
    let pooled = g.pool(x, &branch_pool(PoolKind::Avg))?;
    let branch_pool = g.conv_unit(&path.child("conv"), &pooled, &unit(template, pool_filters, 1))?;

    g.concat_branches(&scope, &[&branch1x1, &branch5x5, &branch3x3dbl, &branch_pool])
}

/// Block B: halves the grid and adds 480 channels to the input's.
pub fn inception_b<B: Backend>(
    g: &mut GraphBuilder<'_, B>,
    scope: &NamePath,
    x: &B::Tensor<4>,
    index: usize,
    template: &ConvSpec,
) -> Result<B::Tensor<4>> {
    let scope = scope.child(format!("mixed_{index}"));

    let path = scope.child("branch3x3");
    let branch3x3 = g.conv_unit(&path.child("conv0"), x, &reduction(template, 384))?;

    let path = scope.child("branch3x3dbl");
    let branch3x3dbl = g.conv_unit(&path.child("conv0"), x, &unit(template, 64, 1))?;
    let branch3x3dbl = g.conv_unit(&path.child("conv1"), &branch3x3dbl, &unit(template, 96, 3))?;
    let branch3x3dbl = g.conv_unit(&path.child("conv2"), &branch3x3dbl, &reduction(template, 96))?;

    let branch_pool = g.pool(x, &downsample_pool())?;

    g.concat_branches(&scope, &[&branch3x3, &branch3x3dbl, &branch_pool])
}

/// Block C with factorized 7x7 paths of bottleneck width `filters`.
pub fn inception_c<B: Backend>(
    g: &mut GraphBuilder<'_, B>,
    scope: &NamePath,
    x: &B::Tensor<4>,
    index: usize,
    filters: usize,
    template: &ConvSpec,
) -> Result<B::Tensor<4>> {
    let scope = scope.child(format!("mixed_{index}"));

    let path = scope.child("branch1x1");
    let branch1x1 = g.conv_unit(&path.child("conv0"), x, &unit(template, 192, 1))?;

    let path = scope.child("branch7x7");
    let branch7x7 = g.conv_unit(&path.child("conv0"), x, &unit(template, filters, 1))?;
    let branch7x7 = g.conv_unit(&path.child("conv1"), &branch7x7, &unit(template, filters, [1, 7]))?;
    let branch7x7 = g.conv_unit(&path.child("conv2"), &branch7x7, &unit(template, 192, [7, 1]))?;

    let path = scope.child("branch7x7dbl");
    let widths = [filters, filters, filters, filters, 192];
    let kernels: [[usize; 2]; 5] = [[1, 1], [7, 1], [1, 7], [7, 1], [1, 7]];
    let mut branch7x7dbl = x.clone();
    for (i, (width, kernel)) in widths.into_iter().zip(kernels).enumerate() {
        branch7x7dbl = g.conv_unit(
            &path.child(format!("conv{i}")),
            &branch7x7dbl,
            &unit(template, width, kernel),
        )?;
    }

    let path = scope.child("branch_pool");
    let pooled = g.pool(x, &branch_pool(PoolKind::Avg))?;
    let branch_pool = g.conv_unit(&path.child("conv"), &pooled, &unit(template, 192, 1))?;

    g.concat_branches(&scope, &[&branch1x1, &branch7x7, &branch7x7dbl, &branch_pool])
}

/// Block D: halves the grid and adds 512 channels to the input's.
pub fn inception_d<B: Backend>(
    g: &mut GraphBuilder<'_, B>,
    scope: &NamePath,
    x: &B::Tensor<4>,
    index: usize,
    template: &ConvSpec,
) -> Result<B::Tensor<4>> {
    let scope = scope.child(format!("mixed_{index}"));

    let path = scope.child("branch3x3");
    let branch3x3 = g.conv_unit(&path.child("conv0"), x, &unit(template, 192, 1))?;
    let branch3x3 = g.conv_unit(&path.child("conv1"), &branch3x3, &reduction(template, 320))?;

    let path = scope.child("branch7x7x3");
    let branch7x7x3 = g.conv_unit(&path.child("conv0"), x, &unit(template, 192, 1))?;
    let branch7x7x3 = g.conv_unit(&path.child("conv1"), &branch7x7x3, &unit(template, 192, [1, 7]))?;
    let branch7x7x3 = g.conv_unit(&path.child("conv2"), &branch7x7x3, &unit(template, 192, [7, 1]))?;
    let branch7x7x3 = g.conv_unit(&path.child("conv3"), &branch7x7x3, &reduction(template, 192))?;

    let branch_pool = g.pool(x, &downsample_pool())?;

    g.concat_branches(&scope, &[&branch3x3, &branch7x7x3, &branch_pool])
}

/// Block E. `pool` picks the reduction of the pool branch; the network uses `Avg` for
/// `mixed_9` and `Max` for `mixed_10`.
pub fn inception_e<B: Backend>(
    g: &mut GraphBuilder<'_, B>,
    scope: &NamePath,
    x: &B::Tensor<4>,
    index: usize,
    pool: PoolKind,
    template: &ConvSpec,
) -> Result<B::Tensor<4>> {
    let scope = scope.child(format!("mixed_{index}"));

    let path = scope.child("branch1x1");
    let branch1x1 = g.conv_unit(&path.child("conv0"), x, &unit(template, 320, 1))?;

    let path = scope.child("branch3x3");
    let reduced = g.conv_unit(&path.child("conv0"), x, &unit(template, 384, 1))?;
    let left = g.conv_unit(&path.child("conv1"), &reduced, &unit(template, 384, [1, 3]))?;
    let right = g.conv_unit(&path.child("conv2"), &reduced, &unit(template, 384, [3, 1]))?;
    let branch3x3 = g.concat_branches(&path, &[&left, &right])?;

    let path = scope.child("branch3x3dbl");
    let reduced = g.conv_unit(&path.child("conv0"), x, &unit(template, 448, 1))?;
    let reduced = g.conv_unit(&path.child("conv1"), &reduced, &unit(template, 384, 3))?;
    let left = g.conv_unit(&path.child("conv2"), &reduced, &unit(template, 384, [1, 3]))?;
    let right = g.conv_unit(&path.child("conv3"), &reduced, &unit(template, 384, [3, 1]))?;
    let branch3x3dbl = g.concat_branches(&path, &[&left, &right])?;

    let path = scope.child("branch_pool");
    let pooled = g.pool(x, &branch_pool(pool))?;
    let branch_pool = g.conv_unit(&path.child("conv"), &pooled, &unit(template, 192, 1))?;

    g.concat_branches(&scope, &[&branch1x1, &branch3x3, &branch3x3dbl, &branch_pool])
}

fn valid(n: usize, kernel: usize, stride: usize) -> Result<usize> {
    window_output(n, [0, 0], kernel, stride)
}

fn halve(n: usize) -> Result<usize> {
    valid(n, 3, 2)
}

fn grid([h, w]: [usize; 2], f: impl Fn(usize) -> Result<usize>) -> Result<[usize; 2]> {
    Ok([f(h)?, f(w)?])
}

/// Expected output of one stage, without the batch dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub shape: Vec<usize>,
}

/// Per-stage output shapes of the network for a given input size.
///
/// Computed in closed form from the block definitions, independently of the runtime, and
/// checked against the actual tensors while the network is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Plan for an `[h, w]` input.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the input is too small for the final 8x8 pool.
    pub fn new(input: [usize; 2], num_classes: usize) -> Result<Self> {
        let mut stages = Vec::new();
        let mut push = |name: &str, channels: usize, [h, w]: [usize; 2]| {
            stages.push(Stage {
                name: name.to_string(),
                shape: vec![channels, h, w],
            })
        };

        // conv0 (VALID/2), conv1 (VALID), conv2 (SAME), pool1, conv3 (1x1), conv4 (VALID), pool2
        let hw = grid(input, halve)?;
        let hw = grid(hw, |n| valid(n, 3, 1))?;
        let hw = grid(hw, halve)?;
        let hw = grid(hw, |n| valid(n, 3, 1))?;
        let hw = grid(hw, halve)?;
        push("stem", 192, hw);

        push("mixed_0", 256, hw);
        push("mixed_1", 288, hw);
        push("mixed_2", 288, hw);

        let hw = grid(hw, halve)?;
        push("mixed_3", 768, hw);
        for index in 4..8 {
            push(&format!("mixed_{index}"), 768, hw);
        }

        let hw = grid(hw, halve)?;
        push("mixed_8", 1280, hw);
        push("mixed_9", 2048, hw);
        push("mixed_10", 2048, hw);

        let hw = grid(hw, |n| valid(n, 8, 1))?;
        push("pool3", 2048, hw);

        stages.push(Stage {
            name: "fc1".to_string(),
            shape: vec![num_classes],
        });
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Checks a `[N, ...]` shape against stage `name`.
    pub fn check(&self, name: &str, shape: &[usize]) -> Result<()> {
        let stage = self
            .get(name)
            .ok_or_else(|| InceptionError::InvalidInput(format!("no stage named {name}")))?;
        let got = shape.get(1..).unwrap_or_default();
        if got != stage.shape.as_slice() {
            return Err(InceptionError::UnexpectedStageShape {
                stage: name.to_string(),
                expected: stage.shape.clone(),
                got: got.to_vec(),
            });
        }
        debug!(stage = name, shape = ?shape, "stage");
        Ok(())
    }
}

/// The Inception-v3 image classifier.
#[derive(Debug, Clone, Default)]
pub struct InceptionV3 {
    pub config: InceptionConfig,
}

impl InceptionV3 {
    pub fn new(config: InceptionConfig) -> Self {
        Self { config }
    }

    /// Stem: five convolutions and two max pools, strictly in series.
    fn stem<B: Backend>(
        &self,
        g: &mut GraphBuilder<'_, B>,
        scope: &NamePath,
        x: &B::Tensor<4>,
    ) -> Result<B::Tensor<4>> {
        let t = self.config.conv_template();
        let x = g.conv_unit(&scope.child("conv0"), x, &reduction(&t, 32))?;
        let x = g.conv_unit(&scope.child("conv1"), &x, &unit(&t, 32, 3).padding(Padding::Valid))?;
        let x = g.conv_unit(&scope.child("conv2"), &x, &unit(&t, 64, 3))?;
        let x = g.pool(&x, &downsample_pool())?;
        let x = g.conv_unit(&scope.child("conv3"), &x, &unit(&t, 80, 1).padding(Padding::Valid))?;
        let x = g.conv_unit(&scope.child("conv4"), &x, &unit(&t, 192, 3).padding(Padding::Valid))?;
        g.pool(&x, &downsample_pool())
    }
}

impl Classifier for InceptionV3 {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn build<B: Backend>(
        &self,
        g: &mut GraphBuilder<'_, B>,
        input: &B::Tensor<4>,
        layout: Layout,
    ) -> Result<B::Tensor<2>> {
        self.config.validate()?;
        let x = g.to_channel_first(input, layout)?;
        let [_, channels, h, w] = g.shape(&x);
        if channels != 3 {
            return Err(InceptionError::InvalidInput(format!(
                "expected 3 input channels, got {channels}"
            )));
        }
        let plan = StagePlan::new([h, w], self.config.num_classes)?;
        let scope = NamePath::root(SCOPE);
        let t = self.config.conv_template();

        let x = self.stem(g, &scope, &x)?;
        plan.check("stem", &g.shape(&x))?;

        let mut x = x;
        for index in 0..3 {
            x = inception_a(g, &scope, &x, index, &t)?;
            plan.check(&format!("mixed_{index}"), &g.shape(&x))?;
        }

        x = inception_b(g, &scope, &x, 3, &t)?;
        plan.check("mixed_3", &g.shape(&x))?;

        for (index, filters) in (4..8).zip(C_WIDTHS) {
            x = inception_c(g, &scope, &x, index, filters, &t)?;
            plan.check(&format!("mixed_{index}"), &g.shape(&x))?;
        }

        x = inception_d(g, &scope, &x, 8, &t)?;
        plan.check("mixed_8", &g.shape(&x))?;

        x = inception_e(g, &scope, &x, 9, PoolKind::Avg, &t)?;
        plan.check("mixed_9", &g.shape(&x))?;
        x = inception_e(g, &scope, &x, 10, PoolKind::Max, &t)?;
        plan.check("mixed_10", &g.shape(&x))?;

        let x = g.pool(&x, &PoolSpec::avg(8, 1, Padding::Valid))?;
        plan.check("pool3", &g.shape(&x))?;

        let features = g.flatten(&x)?;
        let features = g.dropout(&features, self.config.dropout_rate)?;
        let fc = DenseSpec::new(self.config.num_classes).weight_init(Initializer::TruncatedNormal {
            mean: 0.0,
            std: FC_STDDEV,
        });
        let logits = g.dense(&scope.child("fc1"), &features, &fc)?;
        plan.check("fc1", &g.shape(&logits))?;
        Ok(logits)
    }
}

/// Builds the reference Inception-v3 on `input` and returns `[N, num_classes]` logits.
pub fn build_classifier<B: Backend>(
    g: &mut GraphBuilder<'_, B>,
    input: &B::Tensor<4>,
    layout: Layout,
) -> Result<B::Tensor<2>> {
    InceptionV3::default().build(g, input, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MetaBackend, MetaTensor};
    use crate::graph::Mode;
    use crate::params::ParamStore;

    #[test]
    fn test_stage_plan_299() {
        let plan = StagePlan::new([299, 299], 1000).unwrap();
        let shape = |name: &str| plan.get(name).unwrap().shape.clone();
        assert_eq!(shape("stem"), vec![192, 35, 35]);
        assert_eq!(shape("mixed_0"), vec![256, 35, 35]);
        assert_eq!(shape("mixed_2"), vec![288, 35, 35]);
        assert_eq!(shape("mixed_3"), vec![768, 17, 17]);
        assert_eq!(shape("mixed_7"), vec![768, 17, 17]);
        assert_eq!(shape("mixed_8"), vec![1280, 8, 8]);
        assert_eq!(shape("mixed_10"), vec![2048, 8, 8]);
        assert_eq!(shape("pool3"), vec![2048, 1, 1]);
        assert_eq!(shape("fc1"), vec![1000]);
        assert_eq!(plan.stages().len(), 14);
    }

    #[test]
    fn test_stage_plan_too_small() {
        assert!(matches!(
            StagePlan::new([64, 64], 1000),
            Err(InceptionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_stage_check_mismatch() {
        let plan = StagePlan::new([299, 299], 10).unwrap();
        let err = plan.check("mixed_3", &[1, 768, 18, 18]).unwrap_err();
        assert!(matches!(err, InceptionError::UnexpectedStageShape { ref stage, .. } if stage == "mixed_3"));
        plan.check("mixed_3", &[4, 768, 17, 17]).unwrap();
    }

    #[test]
    fn test_unit_resets_geometry() {
        let template = ConvSpec::new(0, 1).stride(2).padding(Padding::Valid).batch_norm(true);
        let spec = unit(&template, 96, [1, 7]);
        assert_eq!(spec.filters, 96);
        assert_eq!(spec.kernel, Size2::new(1, 7));
        assert_eq!(spec.stride, Size2::new(1, 1));
        assert_eq!(spec.padding, Padding::Same);
        assert!(spec.batch_norm.is_some());
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let backend = MetaBackend::new();
        let mut store = ParamStore::new();
        let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
        let x = MetaTensor::new([1, 1, 299, 299]);
        let err = build_classifier(&mut g, &x, Layout::ChannelFirst).unwrap_err();
        assert!(matches!(err, InceptionError::InvalidInput(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let config = InceptionConfig {
            dropout_rate: 1.0,
            ..InceptionConfig::v3()
        };
        assert!(matches!(config.validate(), Err(InceptionError::Config(_))));
        InceptionConfig::v3().validate().unwrap();
    }
}
