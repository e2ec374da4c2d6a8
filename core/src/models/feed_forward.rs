//! Position-wise feed-forward block of a BERT encoder layer.
//!
//! `FFN(x) = w_2(dropout(gelu(w_1(x))))`, applied to every token independently. Token
//! batches are flattened to `[tokens, d_model]` before they reach the block.

use crate::backend::Backend;
use crate::error::{InceptionError, Result};
use crate::graph::GraphBuilder;
use crate::names::NamePath;
use crate::nn::DenseSpec;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionwiseFeedForward {
    pub d_model: usize,
    pub d_ff: usize,
    pub dropout: f32,
}

impl PositionwiseFeedForward {
    pub fn new(d_model: usize, d_ff: usize) -> Self {
        Self {
            d_model,
            d_ff,
            dropout: 0.1,
        }
    }

    pub fn dropout(mut self, rate: f32) -> Self {
        self.dropout = rate;
        self
    }

    /// Builds the block under `scope` (`{scope}/w_1-weight`, `{scope}/w_2-bias`, ...).
    pub fn build<B: Backend>(
        &self,
        g: &mut GraphBuilder<'_, B>,
        scope: &NamePath,
        x: &B::Tensor<2>,
    ) -> Result<B::Tensor<2>> {
        let [_, features] = g.shape(x);
        if features != self.d_model {
            return Err(InceptionError::InvalidInput(format!(
                "feed-forward expects {} features, got {features}",
                self.d_model
            )));
        }
        let h = g.dense(&scope.child("w_1"), x, &DenseSpec::new(self.d_ff))?;
        let h = g.gelu(&h)?;
        let h = g.dropout(&h, self.dropout)?;
        g.dense(&scope.child("w_2"), &h, &DenseSpec::new(self.d_model))
    }
}
