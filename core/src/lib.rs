//! # inception-rs
//!
//! `inception-rs` assembles Inception-v3 out of convolution, pooling, normalization and dense
//! primitives. The topology is plain function composition over a [`graph::GraphBuilder`]:
//! every layer gets its name path explicitly and fetches its parameters from a shared
//! [`params::ParamStore`], creating them on first use.
//!
//! Tensors live in a runtime chosen through the [`backend::Backend`] trait: the eager
//! [`backend::CpuBackend`] computes values, the [`backend::MetaBackend`] only tracks shapes.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: contiguous N-dimensional `Tensor` and its CPU ops.
//! - [`backend`]: the runtime trait and its two implementations.
//! - [`nn`]: layer descriptors (`ConvSpec`, `PoolSpec`, `DenseSpec`, ...).
//! - [`graph`]: the builder that turns descriptors into parameters and ops.
//! - [`models`]: Inception-v3 and the BERT feed-forward block.
//! - [`params`], [`checkpoint`]: parameter storage and safetensors persistence.
//! - [`metrics`]: softmax and top-k accuracy.
//! - [`session`]: configuration plus runtime and parameters, opened and closed once.
//!
//! ## Example
//!
//! ```rust
//! use inception_rs::backend::MetaTensor;
//! use inception_rs::session::{Session, SessionConfig};
//! use inception_rs::shape::Layout;
//!
//! let mut session = Session::meta(SessionConfig::default()).unwrap();
//! let logits = session
//!     .classify(&MetaTensor::new([1, 3, 299, 299]), Layout::ChannelFirst)
//!     .unwrap();
//! assert_eq!(logits.shape(), &[1, 1000]);
//! println!("{} parameters", session.store().num_elements());
//! ```

pub mod backend;
pub mod checkpoint;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod models;
pub mod names;
pub mod nn;
pub mod params;
pub mod session;
pub mod shape;
pub mod tensor;

pub use error::{InceptionError, Result};
pub use graph::{GraphBuilder, Mode};
pub use names::NamePath;
pub use params::ParamStore;
pub use tensor::{Tensor, TensorElem, TensorError};
