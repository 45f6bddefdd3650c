use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::models::{Embed, Linear};

/// Morphological lexicon features: a frozen n-hot table per token followed
/// by a bias-free projection, so an all-zero vector contributes nothing.
#[derive(Debug, Clone)]
pub struct Morphlex {
    table: Embed,
    projection: Linear,
}

impl Morphlex {
    /// The table starts at zero; its values are set with `io::checkpoint::set_param`.
    pub fn new(
        vb: VarBuilder,
        vocab_size: usize,
        n_hot_size: usize,
        projection_size: usize,
    ) -> Result<Self> {
        let table =
            Embed::new_with_init(vb.pp("table"), vocab_size, n_hot_size, Init::Const(0.0))?.frozen();
        let projection = Linear::new(vb.pp("projection"), n_hot_size, projection_size, false)?;
        Ok(Morphlex { table, projection })
    }

    /// `(B, T)` ids to `(B, T, projection_size)`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        self.projection.forward(&self.table.forward(ids)?)
    }

    pub fn table(&self) -> &Embed {
        &self.table
    }

    pub fn out_size(&self) -> usize {
        self.projection.out_size()
    }
}
