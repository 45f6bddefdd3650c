use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::dataset::CharBatch;
use crate::models::{dropout, BiLSTM, BiLSTMOutput, Embed};

/// Character BiLSTM; a token is represented by the final forward and
/// backward states over its real characters.
#[derive(Debug, Clone)]
pub struct CharRNN {
    embed: Embed,
    bilstm: BiLSTM,
    dropout_rate: f32,
}

impl CharRNN {
    pub fn new(
        vb: VarBuilder,
        vocab_size: usize,
        embed_size: usize,
        hidden_size: usize,
        dropout_rate: f32,
    ) -> Result<Self> {
        Ok(CharRNN {
            embed: Embed::new(vb.pp("embed"), vocab_size, embed_size)?,
            bilstm: BiLSTM::new(vb.pp("bilstm"), 1, embed_size, hidden_size, 0.0)?,
            dropout_rate,
        })
    }

    pub fn encode(&self, ids: &Tensor, mask: &Tensor, train: bool) -> Result<BiLSTMOutput> {
        let xs = dropout(&self.embed.forward(ids)?, self.dropout_rate, train)?;
        self.bilstm.forward(&xs, mask, train)
    }

    /// `(N, L)` character ids to `(N, 2H)`.
    pub fn forward(&self, chars: &CharBatch, train: bool) -> Result<Tensor> {
        Ok(self.encode(&chars.ids, &chars.mask, train)?.last)
    }

    pub fn out_size(&self) -> usize {
        self.bilstm.out_size()
    }
}
