//! Layer descriptors.
//!
//! Descriptors are immutable `Copy` values that say what a layer looks like. The
//! [`GraphBuilder`](crate::graph::GraphBuilder) turns them into parameters and tensor ops.

pub mod activation;
pub mod conv;
pub mod dense;
pub mod norm;
pub mod pool;

pub use activation::Activation;
pub use conv::ConvSpec;
pub use dense::DenseSpec;
pub use norm::BatchNormSpec;
pub use pool::{PoolKind, PoolSpec};
