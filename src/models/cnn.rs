use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::models::xavier_uniform;

/// 1-D convolution over `(N, C_in, L)` inputs with `same` padding.
#[derive(Debug, Clone)]
pub struct Conv1D {
    w: Tensor,
    b: Tensor,
    pub padding: usize,
}

impl Conv1D {
    pub fn new(vb: VarBuilder, in_channels: usize, out_channels: usize, window: usize) -> Result<Self> {
        let w = vb.get_with_hints(
            (out_channels, in_channels, window),
            "weight",
            xavier_uniform(in_channels * window, out_channels),
        )?;
        let b = vb.get_with_hints(out_channels, "bias", Init::Const(0.0))?;
        Ok(Conv1D {
            w,
            b,
            padding: window / 2,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let y = x.contiguous()?.conv1d(&self.w, self.padding, 1, 1, 1)?;
        y.broadcast_add(&self.b.reshape((1, self.out_channels(), 1))?)
    }

    pub fn out_channels(&self) -> usize {
        self.w.dims()[0]
    }
}
