use crate::backend::Backend;
use crate::error::Result;
use crate::graph::GraphBuilder;
use crate::shape::Layout;

/// An image classifier that can be assembled on any runtime.
///
/// Implementations register their parameters in the builder's store on first use and reuse
/// them on every later build, so building twice with the same store yields the same network.
pub trait Classifier {
    /// Width of the logits row.
    fn num_classes(&self) -> usize;

    /// Builds the network on an image batch.
    ///
    /// # Arguments
    ///
    /// * `input` - `[N, C, H, W]` or `[N, H, W, C]`, as given by `layout`.
    ///
    /// # Returns
    ///
    /// * `logits` - `[N, num_classes]`.
    fn build<B: Backend>(
        &self,
        g: &mut GraphBuilder<'_, B>,
        input: &B::Tensor<4>,
        layout: Layout,
    ) -> Result<B::Tensor<2>>;
}
