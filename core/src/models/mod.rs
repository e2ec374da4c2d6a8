//! Pre-built networks.
//!
//! - **Inception-v3**: the image classifier, see [`inception`].
//! - **Position-wise feed-forward**: the BERT encoder FFN, see [`feed_forward`].
//!
//! # Example: Inspecting Inception-v3 without running it
//!
//! ```rust
//! use inception_rs::backend::{MetaBackend, MetaTensor};
//! use inception_rs::graph::{GraphBuilder, Mode};
//! use inception_rs::models::inception::build_classifier;
//! use inception_rs::params::ParamStore;
//! use inception_rs::shape::Layout;
//!
//! let backend = MetaBackend::new();
//! let mut store = ParamStore::new();
//! let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
//!
//! let images = MetaTensor::new([8, 3, 299, 299]);
//! let logits = build_classifier(&mut g, &images, Layout::ChannelFirst).unwrap();
//! assert_eq!(logits.shape(), &[8, 1000]);
//! ```

pub mod feed_forward;
pub mod inception;
pub mod traits;

pub use feed_forward::PositionwiseFeedForward;
pub use inception::{InceptionConfig, InceptionV3, StagePlan, build_classifier};
pub use traits::Classifier;
