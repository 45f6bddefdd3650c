use candle_core::{Device, Result, Tensor};

use crate::preprocessing::{Sample, EOS_ID, PAD_ID};

/// Characters of every token slot of a batch, flattened to `B * T` rows.
#[derive(Debug, Clone)]
pub struct CharBatch {
    /// `(B * T, L)` character ids.
    pub ids: Tensor,
    /// `(B * T, L)`, 1.0 on real characters.
    pub mask: Tensor,
    /// Characters per row; padding token slots count as one `PAD`.
    pub lengths: Vec<usize>,
}

/// Lemma targets for the real tokens of a batch.
#[derive(Debug, Clone)]
pub struct LemmaBatch {
    /// `(R, M)` lemma characters followed by `EOS`, then `PAD`.
    pub targets: Tensor,
    /// `(R, M)`, 1.0 on positions that carry a target.
    pub mask: Tensor,
}

/// Padded tensors for a list of samples.
///
/// Padding positions are excluded from every computation through `mask`,
/// and `unpad` recovers per-sentence results in the original order.
#[derive(Debug, Clone)]
pub struct Batch {
    pub lengths: Vec<usize>,
    pub max_len: usize,
    /// `(B, T)`, 1.0 on real tokens.
    pub mask: Tensor,
    /// `(B, T)` ids per embedding stream.
    pub words: Option<Tensor>,
    pub pretrained: Option<Tensor>,
    pub morphlex: Option<Tensor>,
    pub chars: CharBatch,
    /// `(B, T, D)` externally computed vectors.
    pub contextual: Option<Tensor>,
    pub tags: Option<Tensor>,
    pub coarse_tags: Option<Tensor>,
    pub lemmas: Option<LemmaBatch>,
    pub rules: Option<Tensor>,
    /// Flat `b * T + t` index of every real token, sentence by sentence.
    pub positions: Tensor,
    device: Device,
}

fn pad_ids(rows: &[&[u32]], width: usize) -> Vec<u32> {
    let mut ids = Vec::with_capacity(rows.len() * width);
    for row in rows {
        ids.extend_from_slice(row);
        ids.extend(std::iter::repeat(PAD_ID).take(width - row.len()));
    }
    ids
}

fn stream<F>(samples: &[&Sample], max_len: usize, device: &Device, f: F) -> Result<Option<Tensor>>
where
    F: Fn(&Sample) -> Option<&Vec<u32>>,
{
    let rows: Option<Vec<&[u32]>> = samples.iter().map(|s| f(*s).map(|v| v.as_slice())).collect();
    match rows {
        Some(rows) => {
            let ids = pad_ids(&rows, max_len);
            Ok(Some(Tensor::from_vec(ids, (samples.len(), max_len), device)?))
        }
        None => Ok(None),
    }
}

impl Batch {
    pub fn from_samples(samples: &[&Sample], device: &Device) -> Result<Batch> {
        if samples.is_empty() {
            candle_core::bail!("cannot build a batch from zero samples");
        }
        let batch_size = samples.len();
        let lengths: Vec<usize> = samples.iter().map(|s| s.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0).max(1);

        let mut mask = Vec::with_capacity(batch_size * max_len);
        let mut positions = Vec::new();
        for (b, &len) in lengths.iter().enumerate() {
            for t in 0..max_len {
                mask.push(if t < len { 1f32 } else { 0f32 });
                if t < len {
                    positions.push((b * max_len + t) as u32);
                }
            }
        }
        let mask = Tensor::from_vec(mask, (batch_size, max_len), device)?;
        let n_positions = positions.len();
        let positions = Tensor::from_vec(positions, n_positions, device)?;

        let pad_token = [PAD_ID];
        let mut char_rows: Vec<&[u32]> = Vec::with_capacity(batch_size * max_len);
        for sample in samples {
            for t in 0..max_len {
                char_rows.push(match sample.chars.get(t) {
                    Some(ids) if !ids.is_empty() => ids.as_slice(),
                    _ => &pad_token,
                });
            }
        }
        let char_lengths: Vec<usize> = char_rows.iter().map(|r| r.len()).collect();
        let char_width = char_lengths.iter().copied().max().unwrap_or(1);
        let char_mask: Vec<f32> = char_lengths
            .iter()
            .flat_map(|&len| (0..char_width).map(move |i| if i < len { 1f32 } else { 0f32 }))
            .collect();
        let chars = CharBatch {
            ids: Tensor::from_vec(
                pad_ids(&char_rows, char_width),
                (char_rows.len(), char_width),
                device,
            )?,
            mask: Tensor::from_vec(char_mask, (char_rows.len(), char_width), device)?,
            lengths: char_lengths,
        };

        let lemmas = match samples
            .iter()
            .map(|s| s.lemmas.as_ref())
            .collect::<Option<Vec<_>>>()
        {
            Some(lemmas) => {
                let targets: Vec<Vec<u32>> = lemmas
                    .iter()
                    .flat_map(|l| l.iter())
                    .map(|chars| {
                        let mut target = chars.clone();
                        target.push(EOS_ID);
                        target
                    })
                    .collect();
                let width = targets.iter().map(|t| t.len()).max().unwrap_or(1);
                let rows: Vec<&[u32]> = targets.iter().map(|t| t.as_slice()).collect();
                let target_mask: Vec<f32> = targets
                    .iter()
                    .flat_map(|t| (0..width).map(move |i| if i < t.len() { 1f32 } else { 0f32 }))
                    .collect();
                Some(LemmaBatch {
                    targets: Tensor::from_vec(pad_ids(&rows, width), (rows.len(), width), device)?,
                    mask: Tensor::from_vec(target_mask, (rows.len(), width), device)?,
                })
            }
            None => None,
        };

        Ok(Batch {
            words: stream(samples, max_len, device, |s| s.words.as_ref())?,
            pretrained: stream(samples, max_len, device, |s| s.pretrained.as_ref())?,
            morphlex: stream(samples, max_len, device, |s| s.morphlex.as_ref())?,
            tags: stream(samples, max_len, device, |s| s.tags.as_ref())?,
            coarse_tags: stream(samples, max_len, device, |s| s.coarse_tags.as_ref())?,
            rules: stream(samples, max_len, device, |s| s.rules.as_ref())?,
            contextual: None,
            chars,
            lemmas,
            positions,
            lengths,
            max_len,
            mask,
            device: device.clone(),
        })
    }

    /// Stacks per-sentence `(len, D)` vectors into a zero-padded `(B, T, D)` tensor.
    pub fn set_contextual(&mut self, vectors: &[Vec<Vec<f32>>], dim: usize) -> Result<()> {
        let mut values = Vec::with_capacity(self.batch_size() * self.max_len * dim);
        for (sentence, &len) in vectors.iter().zip(&self.lengths) {
            if sentence.len() != len || sentence.iter().any(|v| v.len() != dim) {
                candle_core::bail!(
                    "expected {} contextual vectors of dimension {}",
                    len,
                    dim
                );
            }
            for v in sentence {
                values.extend_from_slice(v);
            }
            values.extend(std::iter::repeat(0f32).take((self.max_len - len) * dim));
        }
        self.contextual = Some(Tensor::from_vec(
            values,
            (self.batch_size(), self.max_len, dim),
            &self.device,
        )?);
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn num_tokens(&self) -> usize {
        self.lengths.iter().sum()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Splits row-major `(B, T)` values into one vector per sentence.
    pub fn unpad<T: Clone>(&self, padded: &[Vec<T>]) -> Vec<Vec<T>> {
        padded
            .iter()
            .zip(&self.lengths)
            .map(|(row, &len)| row[..len].to_vec())
            .collect()
    }

    /// Splits values of the real tokens (`positions` order) into one vector per sentence.
    pub fn split_tokens<T>(&self, values: Vec<T>) -> Vec<Vec<T>> {
        let mut iter = values.into_iter();
        self.lengths
            .iter()
            .map(|&len| iter.by_ref().take(len).collect())
            .collect()
    }
}
