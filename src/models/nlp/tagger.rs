use candle_core::{DType, Result, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;

use crate::config::{TagDecoding, TaggerConfig};
use crate::dataset::Batch;
use crate::models::nlp::CRF;
use crate::models::{additive_mask, masked_nll_sum, Linear, LARGE_NEGATIVE};
use crate::preprocessing::Vocab;

#[derive(Debug, Clone)]
pub struct TagLoss {
    /// Weighted sum over the real tokens of the batch.
    pub loss: Tensor,
    pub correct: usize,
}

/// Coarse category head followed by a fine tag head that also sees the
/// coarse distribution.
#[derive(Debug, Clone)]
pub struct TagDecoder {
    coarse: Linear,
    fine: Linear,
    crf: Option<CRF>,
    /// `(C, V)`, 1.0 where fine tag `v` belongs to coarse category `c`.
    allowed: Tensor,
    reserved: Tensor,
    coarse_reserved: Tensor,
    config: TaggerConfig,
}

fn reserved_mask(size: usize, device: &candle_core::Device) -> Result<Tensor> {
    let values: Vec<f32> = (0..size)
        .map(|i| if Vocab::is_reserved(i as u32) { LARGE_NEGATIVE } else { 0.0 })
        .collect();
    Tensor::from_vec(values, size, device)
}

impl TagDecoder {
    pub fn new(
        vb: VarBuilder,
        in_size: usize,
        n_tags: usize,
        n_coarse: usize,
        coarse_of_tags: &[u32],
        config: &TaggerConfig,
    ) -> Result<Self> {
        if coarse_of_tags.len() != n_tags {
            candle_core::bail!(
                "coarse categories of {} tags given for {} tags",
                coarse_of_tags.len(),
                n_tags
            );
        }
        let device = vb.device().clone();
        let coarse = Linear::new(vb.pp("coarse"), in_size, n_coarse, true)?;
        let fine = Linear::new(vb.pp("fine"), in_size + n_coarse, n_tags, true)?;
        let crf = match config.decoding {
            TagDecoding::Crf => Some(CRF::new(vb.pp("crf"), n_tags)?),
            TagDecoding::Greedy => None,
        };
        let mut allowed = vec![0f32; n_coarse * n_tags];
        for (v, &c) in coarse_of_tags.iter().enumerate() {
            if !Vocab::is_reserved(v as u32) && (c as usize) < n_coarse {
                allowed[c as usize * n_tags + v] = 1.0;
            }
        }
        Ok(TagDecoder {
            coarse,
            fine,
            crf,
            allowed: Tensor::from_vec(allowed, (n_coarse, n_tags), &device)?,
            reserved: reserved_mask(n_tags, &device)?,
            coarse_reserved: reserved_mask(n_coarse, &device)?,
            config: config.clone(),
        })
    }

    /// Coarse `(B, T, C)` and fine `(B, T, V)` scores.
    pub fn scores(&self, hs: &Tensor) -> Result<(Tensor, Tensor)> {
        let coarse = self.coarse.forward(hs)?;
        let probs = softmax(&coarse, D::Minus1)?;
        let fine = self.fine.forward(&Tensor::cat(&[hs, &probs], 2)?)?;
        Ok((coarse, fine))
    }

    pub fn loss(&self, hs: &Tensor, batch: &Batch) -> Result<TagLoss> {
        let (tags, coarse_tags) = match (&batch.tags, &batch.coarse_tags) {
            (Some(t), Some(c)) => (t, c),
            _ => candle_core::bail!("batch carries no gold tags"),
        };
        let (coarse, fine) = self.scores(hs)?;
        let n = batch.batch_size() * batch.max_len;
        let mask = batch.mask.flatten_all()?;
        let smoothing = self.config.label_smoothing;
        let coarse_loss = masked_nll_sum(
            &coarse.reshape((n, ()))?,
            &coarse_tags.flatten_all()?,
            &mask,
            smoothing,
        )?;
        let fine_loss = match self.crf {
            Some(ref crf) => crf.nll(&fine, tags, &batch.mask, &batch.lengths)?,
            None => masked_nll_sum(&fine.reshape((n, ()))?, &tags.flatten_all()?, &mask, smoothing)?,
        };
        let loss = (coarse_loss.affine(self.config.coarse_weight as f64, 0.0)?
            + fine_loss.affine(self.config.weight as f64, 0.0)?)?;
        let correct = fine
            .argmax(D::Minus1)?
            .eq(tags)?
            .to_dtype(DType::F32)?
            .mul(&batch.mask)?
            .sum_all()?
            .to_scalar::<f32>()?;
        Ok(TagLoss {
            loss,
            correct: correct.round() as usize,
        })
    }

    /// Tag ids per sentence. Reserved ids are never produced.
    pub fn decode(&self, hs: &Tensor, batch: &Batch) -> Result<Vec<Vec<u32>>> {
        let (coarse, fine) = self.scores(hs)?;
        let mut fine = fine.broadcast_add(&self.reserved)?;
        if self.config.constrain_to_coarse {
            let predicted = coarse
                .broadcast_add(&self.coarse_reserved)?
                .argmax(D::Minus1)?
                .flatten_all()?;
            let allowed = self
                .allowed
                .index_select(&predicted, 0)?
                .reshape(fine.shape())?;
            fine = (fine + additive_mask(&allowed)?)?;
        }
        match self.crf {
            None => Ok(batch.unpad(&fine.argmax(D::Minus1)?.to_vec2::<u32>()?)),
            Some(ref crf) => {
                let emissions = fine.to_vec3::<f32>()?;
                let banned: Vec<bool> = (0..crf.n_tags())
                    .map(|i| Vocab::is_reserved(i as u32))
                    .collect();
                emissions
                    .iter()
                    .zip(&batch.lengths)
                    .map(|(e, &len)| crf.viterbi(&e[..len], &banned))
                    .collect()
            }
        }
    }

    pub fn crf(&self) -> Option<&CRF> {
        self.crf.as_ref()
    }
}
