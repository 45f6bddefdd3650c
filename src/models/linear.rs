use candle_core::{Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::models::xavier_uniform;

/// `y = x W^T + b` over the last dimension of `x`.
#[derive(Debug, Clone)]
pub struct Linear {
    w: Tensor,
    b: Option<Tensor>,
}

impl Linear {
    pub fn new(vb: VarBuilder, in_size: usize, out_size: usize, use_bias: bool) -> Result<Self> {
        let w = vb.get_with_hints((out_size, in_size), "weight", xavier_uniform(in_size, out_size))?;
        let b = if use_bias {
            Some(vb.get_with_hints(out_size, "bias", Init::Const(0.0))?)
        } else {
            None
        };
        Ok(Linear { w, b })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut dims = x.dims().to_vec();
        let in_size = self.in_size();
        let rows = x.elem_count() / in_size;
        let mut y = x.reshape((rows, in_size))?.matmul(&self.w.t()?)?;
        if let Some(ref b) = self.b {
            y = y.broadcast_add(b)?;
        }
        if let Some(last) = dims.last_mut() {
            *last = self.out_size();
        }
        y.reshape(dims)
    }

    pub fn in_size(&self) -> usize {
        self.w.dims()[1]
    }

    pub fn out_size(&self) -> usize {
        self.w.dims()[0]
    }
}
