use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::dataset::CharBatch;
use crate::models::{additive_mask, dropout, Conv1D, Embed};

/// A Convolutional Neural Network that encodes character level information
///
/// See "End-to-end Sequence Labeling via Bi-directional LSTM-CNNs-CRF" (Ma and Hovy, 2016.)
/// http://www.aclweb.org/anthology/P16-1101
#[derive(Debug, Clone)]
pub struct CharCNN {
    embed: Embed,
    conv: Conv1D,
    dropout_rate: f32,
}

impl CharCNN {
    pub fn new(
        vb: VarBuilder,
        vocab_size: usize,
        embed_size: usize,
        out_size: usize,
        window_size: usize,
        dropout_rate: f32,
    ) -> Result<Self> {
        if window_size % 2 != 1 {
            candle_core::bail!("`window_size` must be odd value");
        }
        Ok(CharCNN {
            embed: Embed::new(vb.pp("embed"), vocab_size, embed_size)?,
            conv: Conv1D::new(vb.pp("conv"), embed_size, out_size, window_size)?,
            dropout_rate,
        })
    }

    /// `(N, L)` character ids to `(N, out_size)` by max-pooling over real characters.
    pub fn forward(&self, chars: &CharBatch, train: bool) -> Result<Tensor> {
        let xs = dropout(&self.embed.forward(&chars.ids)?, self.dropout_rate, train)?;
        // padding must not leak into the windows of real characters
        let xs = xs.broadcast_mul(&chars.mask.unsqueeze(2)?)?;
        let hs = self.conv.forward(&xs.transpose(1, 2)?)?;
        let mask = additive_mask(&chars.mask)?.unsqueeze(1)?;
        hs.broadcast_add(&mask)?.max(2)
    }

    pub fn out_size(&self) -> usize {
        self.conv.out_channels()
    }
}
