use candle_core::{Result, Tensor, D};
use candle_nn::ops::log_softmax;
use candle_nn::Init;

/// Added to scores that must never win a max or survive a softmax.
/// Finite, so that masked sums never produce NaN.
pub const LARGE_NEGATIVE: f32 = -1e4;

/// Glorot/Xavier uniform initialization.
pub fn xavier_uniform(fan_in: usize, fan_out: usize) -> Init {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// Dropout that is active only when `train` is set.
pub fn dropout(x: &Tensor, rate: f32, train: bool) -> Result<Tensor> {
    if train && rate > 0.0 {
        candle_nn::ops::dropout(x, rate)
    } else {
        Ok(x.clone())
    }
}

/// `old` where `mask` is 0, `new` where it is 1. `mask` broadcasts over the last dim.
pub fn blend(mask: &Tensor, new: &Tensor, old: &Tensor) -> Result<Tensor> {
    old.broadcast_add(&(new - old)?.broadcast_mul(mask)?)
}

/// Additive mask: 0 where `mask` is 1, `LARGE_NEGATIVE` where it is 0.
pub fn additive_mask(mask: &Tensor) -> Result<Tensor> {
    mask.affine(-(LARGE_NEGATIVE as f64), LARGE_NEGATIVE as f64)
}

/// Numerically stable log-sum-exp over `dim`, which is removed.
pub fn logsumexp<Dim: candle_core::shape::Dim + Copy>(x: &Tensor, dim: Dim) -> Result<Tensor> {
    let max = x.max_keepdim(dim)?.detach();
    let sum = x.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?.log()?;
    (sum + max)?.squeeze(dim)
}

/// Summed negative log-likelihood of `targets` under `logits`, over rows
/// where `mask` is 1. `logits` is `(N, C)`, `targets` `(N,)` u32, `mask` `(N,)`.
pub fn masked_nll_sum(
    logits: &Tensor,
    targets: &Tensor,
    mask: &Tensor,
    label_smoothing: f32,
) -> Result<Tensor> {
    let log_probs = log_softmax(logits, D::Minus1)?;
    let picked = log_probs
        .contiguous()?
        .gather(&targets.contiguous()?.unsqueeze(1)?, 1)?
        .squeeze(1)?;
    let mut nll = picked.neg()?;
    if label_smoothing > 0.0 {
        let s = label_smoothing as f64;
        let uniform = log_probs.mean(1)?.neg()?;
        nll = (nll.affine(1.0 - s, 0.0)? + uniform.affine(s, 0.0)?)?;
    }
    (nll * mask)?.sum_all()
}
