use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::models::{blend, logsumexp};

/// Linear-chain CRF over tag emissions. `transitions[i][j]` scores tag `i`
/// followed by tag `j`.
#[derive(Debug, Clone)]
pub struct CRF {
    transitions: Tensor,
    start: Tensor,
    end: Tensor,
    n_tags: usize,
}

impl CRF {
    pub fn new(vb: VarBuilder, n_tags: usize) -> Result<Self> {
        let init = Init::Uniform { lo: -0.1, up: 0.1 };
        Ok(CRF {
            transitions: vb.get_with_hints((n_tags, n_tags), "transitions", init)?,
            start: vb.get_with_hints(n_tags, "start", init)?,
            end: vb.get_with_hints(n_tags, "end", init)?,
            n_tags,
        })
    }

    /// Summed negative log-likelihood of the gold `tags` `(B, T)` given
    /// `emissions` `(B, T, V)`, over sentences of `lengths`.
    pub fn nll(
        &self,
        emissions: &Tensor,
        tags: &Tensor,
        mask: &Tensor,
        lengths: &[usize],
    ) -> Result<Tensor> {
        let (batch_size, max_len, n_tags) = emissions.dims3()?;
        let device = emissions.device();

        // score of the gold path
        let emitted = emissions
            .contiguous()?
            .gather(&tags.contiguous()?.unsqueeze(2)?, 2)?
            .squeeze(2)?;
        let mut gold = (emitted * mask)?.sum(1)?;
        let tag_ids = tags.to_vec2::<u32>()?;
        let first: Vec<u32> = tag_ids.iter().map(|row| row[0]).collect();
        let last: Vec<u32> = tag_ids
            .iter()
            .zip(lengths)
            .map(|(row, &len)| row[len.max(1) - 1])
            .collect();
        gold = (gold + self.start.index_select(&Tensor::from_vec(first, batch_size, device)?, 0)?)?;
        gold = (gold + self.end.index_select(&Tensor::from_vec(last, batch_size, device)?, 0)?)?;
        if max_len > 1 {
            let pairs: Vec<u32> = tag_ids
                .iter()
                .flat_map(|row| row.windows(2).map(|w| w[0] * n_tags as u32 + w[1]))
                .collect();
            let pairs = Tensor::from_vec(pairs, batch_size * (max_len - 1), device)?;
            let moved = self
                .transitions
                .flatten_all()?
                .index_select(&pairs, 0)?
                .reshape((batch_size, max_len - 1))?;
            gold = (gold + (moved * mask.narrow(1, 1, max_len - 1)?)?.sum(1)?)?;
        }

        // forward algorithm
        let transitions = self.transitions.unsqueeze(0)?;
        let mut alpha = emissions
            .narrow(1, 0, 1)?
            .squeeze(1)?
            .broadcast_add(&self.start)?;
        for t in 1..max_len {
            let scores = alpha.unsqueeze(2)?.broadcast_add(&transitions)?;
            let emit = emissions.narrow(1, t, 1)?.squeeze(1)?;
            let next = (logsumexp(&scores, 1)? + emit)?;
            alpha = blend(&mask.narrow(1, t, 1)?, &next, &alpha)?;
        }
        let log_z = logsumexp(&alpha.broadcast_add(&self.end)?, 1)?;
        (log_z - gold)?.sum_all()
    }

    /// Best tag path of one sentence; tags where `banned` is set are never chosen.
    pub fn viterbi(&self, emissions: &[Vec<f32>], banned: &[bool]) -> Result<Vec<u32>> {
        if emissions.is_empty() {
            return Ok(vec![]);
        }
        let transitions = self.transitions.to_vec2::<f32>()?;
        let start = self.start.to_vec1::<f32>()?;
        let end = self.end.to_vec1::<f32>()?;
        let n = self.n_tags;
        let allowed = |j: usize| !banned.get(j).copied().unwrap_or(false);

        let mut scores: Vec<f32> = (0..n)
            .map(|j| {
                if allowed(j) {
                    start[j] + emissions[0][j]
                } else {
                    f32::NEG_INFINITY
                }
            })
            .collect();
        let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(emissions.len());
        for emission in &emissions[1..] {
            let mut next = vec![f32::NEG_INFINITY; n];
            let mut pointers = vec![0; n];
            for j in (0..n).filter(|&j| allowed(j)) {
                let (best_i, best) = (0..n)
                    .map(|i| (i, scores[i] + transitions[i][j]))
                    .fold((0, f32::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc });
                next[j] = best + emission[j];
                pointers[j] = best_i;
            }
            scores = next;
            backpointers.push(pointers);
        }
        let mut best_last = 0;
        let mut best = f32::NEG_INFINITY;
        for j in 0..n {
            let s = scores[j] + end[j];
            if s > best {
                best = s;
                best_last = j;
            }
        }
        let mut path = vec![best_last as u32];
        let mut current = best_last;
        for pointers in backpointers.iter().rev() {
            current = pointers[current];
            path.push(current as u32);
        }
        path.reverse();
        Ok(path)
    }

    /// Unnormalized score of a tag path of one sentence.
    pub fn score_path(&self, emissions: &[Vec<f32>], path: &[u32]) -> Result<f32> {
        let transitions = self.transitions.to_vec2::<f32>()?;
        let start = self.start.to_vec1::<f32>()?;
        let end = self.end.to_vec1::<f32>()?;
        let (first, last) = match (path.first(), path.last()) {
            (Some(&f), Some(&l)) => (f as usize, l as usize),
            _ => return Ok(0.0),
        };
        let mut score = start[first] + end[last];
        for (t, &tag) in path.iter().enumerate() {
            score += emissions[t][tag as usize];
        }
        for w in path.windows(2) {
            score += transitions[w[0] as usize][w[1] as usize];
        }
        Ok(score)
    }

    pub fn n_tags(&self) -> usize {
        self.n_tags
    }
}
