use candle_core::{Device, Result, Tensor};
use candle_nn::ops::sigmoid;
use candle_nn::{Init, VarBuilder};

use crate::models::{blend, dropout};

#[derive(Debug, Clone)]
pub struct LSTMState {
    pub h: Tensor,
    pub c: Tensor,
}

/// Hand-written LSTM with input/forget/output gates and no peepholes.
/// Formulation:
///   i = sigmoid(W_xi . x[t] + W_hi . h[t-1] + b_i)
///   f = sigmoid(W_xf . x[t] + W_hf . h[t-1] + b_f)
///   o = sigmoid(W_xo . x[t] + W_ho . h[t-1] + b_o)
///   j = tanh   (W_xj . x[t] + W_hj . h[t-1] + b_j)
///   c[t] = i * j + f * c[t-1]
///   h[t] = o * tanh(c[t])
#[derive(Debug, Clone)]
pub struct LSTM {
    w: Tensor,
    b: Tensor,
    in_size: usize,
    hidden_size: usize,
}

impl LSTM {
    pub fn new(vb: VarBuilder, in_size: usize, hidden_size: usize) -> Result<Self> {
        let w = vb.get_with_hints(
            (4 * hidden_size, in_size + hidden_size),
            "w",
            Init::Uniform { lo: -0.1, up: 0.1 },
        )?;
        let b = vb.get_with_hints(4 * hidden_size, "b", Init::Const(1.0))?;
        Ok(LSTM {
            w,
            b,
            in_size,
            hidden_size,
        })
    }

    pub fn zero_state(&self, batch_size: usize, device: &Device) -> Result<LSTMState> {
        let h = Tensor::zeros((batch_size, self.hidden_size), self.w.dtype(), device)?;
        Ok(LSTMState { c: h.clone(), h })
    }

    /// Input projections of a whole `(N, T, in)` sequence, `(N, T, 4H)`.
    fn project_inputs(&self, xs: &Tensor) -> Result<Tensor> {
        let (n, t, _) = xs.dims3()?;
        let w_x = self.w.narrow(1, 0, self.in_size)?;
        xs.reshape((n * t, self.in_size))?
            .matmul(&w_x.t()?)?
            .broadcast_add(&self.b)?
            .reshape((n, t, 4 * self.hidden_size))
    }

    fn step_projected(&self, u_x: &Tensor, state: &LSTMState) -> Result<LSTMState> {
        let w_h = self.w.narrow(1, self.in_size, self.hidden_size)?;
        let u = (u_x + state.h.matmul(&w_h.t()?)?)?;
        let v = u.chunk(4, 1)?;
        let i = sigmoid(&v[0])?;
        let f = sigmoid(&v[1])?;
        let o = sigmoid(&v[2])?;
        let j = v[3].tanh()?;
        let c = ((i * j)? + (f * &state.c)?)?;
        let h = (o * c.tanh()?)?;
        Ok(LSTMState { h, c })
    }

    /// One step forwarding of a `(N, in)` input.
    pub fn step(&self, x: &Tensor, state: &LSTMState) -> Result<LSTMState> {
        let u_x = x
            .matmul(&self.w.narrow(1, 0, self.in_size)?.t()?)?
            .broadcast_add(&self.b)?;
        self.step_projected(&u_x, state)
    }

    /// Runs over `(N, T, in)` in one direction. At steps where `mask` `(N, T)`
    /// is 0 the state is carried over and the output is zero.
    /// Returns per-step outputs `(N, T, H)` and the final state.
    pub fn forward_masked(
        &self,
        xs: &Tensor,
        mask: &Tensor,
        reverse: bool,
    ) -> Result<(Tensor, LSTMState)> {
        let (n, len, _) = xs.dims3()?;
        let projected = self.project_inputs(xs)?;
        let mut state = self.zero_state(n, xs.device())?;
        let mut outputs = vec![None; len];
        for step in 0..len {
            let t = if reverse { len - 1 - step } else { step };
            let m = mask.narrow(1, t, 1)?;
            let u_x = projected.narrow(1, t, 1)?.squeeze(1)?;
            let next = self.step_projected(&u_x, &state)?;
            outputs[t] = Some(next.h.broadcast_mul(&m)?);
            state = LSTMState {
                h: blend(&m, &next.h, &state.h)?,
                c: blend(&m, &next.c, &state.c)?,
            };
        }
        let outputs: Vec<Tensor> = outputs.into_iter().flatten().collect();
        Ok((Tensor::stack(&outputs, 1)?, state))
    }

    pub fn in_size(&self) -> usize {
        self.in_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[derive(Debug, Clone)]
pub struct BiLSTMOutput {
    /// `(N, T, 2H)`, zero at masked positions.
    pub outputs: Tensor,
    /// `(N, 2H)`: forward state after the last real step ‖ backward state
    /// after the first, from the top layer.
    pub last: Tensor,
}

#[derive(Debug, Clone)]
pub struct BiLSTM {
    lstms: Vec<(LSTM, LSTM)>,
    dropout_rate: f32,
}

impl BiLSTM {
    pub fn new(
        vb: VarBuilder,
        n_layers: usize,
        in_size: usize,
        hidden_size: usize,
        dropout_rate: f32,
    ) -> Result<Self> {
        if n_layers == 0 {
            candle_core::bail!("BiLSTM needs at least one layer");
        }
        let mut lstms = Vec::with_capacity(n_layers);
        for i in 0..n_layers {
            let layer_in = if i == 0 { in_size } else { hidden_size * 2 };
            let f_lstm = LSTM::new(vb.pp(format!("f_lstm.{}", i)), layer_in, hidden_size)?;
            let b_lstm = LSTM::new(vb.pp(format!("b_lstm.{}", i)), layer_in, hidden_size)?;
            lstms.push((f_lstm, b_lstm));
        }
        Ok(BiLSTM {
            lstms,
            dropout_rate,
        })
    }

    pub fn forward(&self, xs: &Tensor, mask: &Tensor, train: bool) -> Result<BiLSTMOutput> {
        let mut xs_next = xs.clone();
        let mut last = None;
        for (i, (lstm_f, lstm_b)) in self.lstms.iter().enumerate() {
            let input = if i == 0 {
                xs_next
            } else {
                dropout(&xs_next, self.dropout_rate, train)?
            };
            let (hs_f, state_f) = lstm_f.forward_masked(&input, mask, false)?;
            let (hs_b, state_b) = lstm_b.forward_masked(&input, mask, true)?;
            xs_next = Tensor::cat(&[hs_f, hs_b], 2)?;
            last = Some(Tensor::cat(&[state_f.h, state_b.h], 1)?);
        }
        match last {
            Some(last) => Ok(BiLSTMOutput {
                outputs: xs_next,
                last,
            }),
            None => candle_core::bail!("BiLSTM has no layers"),
        }
    }

    pub fn out_size(&self) -> usize {
        self.lstms[0].0.hidden_size() * 2
    }
}
