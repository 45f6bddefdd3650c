use candle_core::{Device, Result, Tensor};
use candle_nn::ops::sigmoid;
use candle_nn::{Init, VarBuilder};

/// GRU cell:
///   r = sigmoid(W_ir . x + b_ir + W_hr . h + b_hr)
///   z = sigmoid(W_iz . x + b_iz + W_hz . h + b_hz)
///   n = tanh(W_in . x + b_in + r * (W_hn . h + b_hn))
///   h' = (1 - z) * n + z * h
#[derive(Debug, Clone)]
pub struct GRU {
    w_ih: Tensor,
    w_hh: Tensor,
    b_ih: Tensor,
    b_hh: Tensor,
    hidden_size: usize,
}

impl GRU {
    pub fn new(vb: VarBuilder, in_size: usize, hidden_size: usize) -> Result<Self> {
        let init = Init::Uniform { lo: -0.1, up: 0.1 };
        Ok(GRU {
            w_ih: vb.get_with_hints((3 * hidden_size, in_size), "w_ih", init)?,
            w_hh: vb.get_with_hints((3 * hidden_size, hidden_size), "w_hh", init)?,
            b_ih: vb.get_with_hints(3 * hidden_size, "b_ih", Init::Const(0.0))?,
            b_hh: vb.get_with_hints(3 * hidden_size, "b_hh", Init::Const(0.0))?,
            hidden_size,
        })
    }

    pub fn zero_state(&self, batch_size: usize, device: &Device) -> Result<Tensor> {
        Tensor::zeros((batch_size, self.hidden_size), self.w_ih.dtype(), device)
    }

    /// `(N, in)`, `(N, H)` to the next `(N, H)` state.
    pub fn step(&self, x: &Tensor, h: &Tensor) -> Result<Tensor> {
        let gi = x.matmul(&self.w_ih.t()?)?.broadcast_add(&self.b_ih)?;
        let gh = h.matmul(&self.w_hh.t()?)?.broadcast_add(&self.b_hh)?;
        let gi = gi.chunk(3, 1)?;
        let gh = gh.chunk(3, 1)?;
        let r = sigmoid(&(&gi[0] + &gh[0])?)?;
        let z = sigmoid(&(&gi[1] + &gh[1])?)?;
        let n = (&gi[2] + (r * &gh[2])?)?.tanh()?;
        let keep = z.affine(-1.0, 1.0)?;
        (keep * n)? + (z * h)?
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}
