use std::collections::HashSet;
use std::fmt::Debug;
use std::marker::PhantomData;

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW, VarMap, SGD};
use rand::Rng;
use slog::Logger;

use crate::config::{OptimizerKind, Schedule, TrainConfig};
use crate::dataset::Dataset;
use crate::error::{Error, Result};

pub use self::evaluate::*;

pub mod callbacks;
mod evaluate;

/// Trainable parameters of `varmap`, ordered by name, leaving out `frozen` ones.
pub fn trainable_vars(varmap: &VarMap, frozen: &[String]) -> Result<Vec<Var>> {
    let frozen: HashSet<&str> = frozen.iter().map(|s| s.as_str()).collect();
    let data = varmap
        .data()
        .lock()
        .map_err(|_| Error::Config("parameter store is poisoned".to_string()))?;
    let mut vars: Vec<(&String, &Var)> = data
        .iter()
        .filter(|(name, _)| !frozen.contains(name.as_str()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(b.0));
    Ok(vars.into_iter().map(|(_, var)| var.clone()).collect())
}

pub enum Optimizer {
    Sgd(SGD),
    Adam(AdamW),
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, vars: Vec<Var>, learning_rate: f64) -> Result<Self> {
        Ok(match kind {
            OptimizerKind::Sgd => Optimizer::Sgd(SGD::new(vars, learning_rate)?),
            OptimizerKind::Adam => Optimizer::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: 0.0,
                    ..ParamsAdamW::default()
                },
            )?),
        })
    }

    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match *self {
            Optimizer::Sgd(ref mut o) => o.step(grads)?,
            Optimizer::Adam(ref mut o) => o.step(grads)?,
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        match *self {
            Optimizer::Sgd(ref o) => o.learning_rate(),
            Optimizer::Adam(ref o) => o.learning_rate(),
        }
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        match *self {
            Optimizer::Sgd(ref mut o) => o.set_learning_rate(lr),
            Optimizer::Adam(ref mut o) => o.set_learning_rate(lr),
        }
    }
}

impl Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Optimizer::Sgd(_) => write!(f, "Sgd(lr={})", self.learning_rate()),
            Optimizer::Adam(_) => write!(f, "Adam(lr={})", self.learning_rate()),
        }
    }
}

/// Adds `strength * w` to the gradient of every parameter `w`.
fn apply_weight_decay(grads: &mut GradStore, vars: &[Var], strength: f64) -> Result<()> {
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            let decayed = (g + var.as_tensor().affine(strength, 0.0)?)?;
            grads.insert(var.as_tensor(), decayed);
        }
    }
    Ok(())
}

/// Rescales all gradients so that their global L2 norm is at most `threshold`.
fn clip_gradients(grads: &mut GradStore, vars: &[Var], threshold: f64) -> Result<f64> {
    let mut sq_sum = 0f64;
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            sq_sum += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = sq_sum.sqrt();
    if norm > threshold {
        let scale = threshold / norm;
        for var in vars {
            let scaled = match grads.get(var.as_tensor()) {
                Some(g) => g.affine(scale, 0.0)?,
                None => continue,
            };
            grads.insert(var.as_tensor(), scaled);
        }
    }
    Ok(norm)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Plateau {
    best: f32,
    bad_epochs: u32,
}

pub struct Trainer<'a, F, T> {
    optimizer: Optimizer,
    vars: Vec<Var>,
    forward: F,
    config: TrainConfig,
    plateau: Option<Plateau>,
    _sample_type: PhantomData<T>,
    logger: Logger,
    callbacks: Vec<(u32, usize, String, Box<dyn Callback + 'a>)>,
}

impl<'a, F, T> Trainer<'a, F, T>
where
    F: FnMut(&[&T], bool) -> Result<(Tensor, Accuracy)>,
{
    pub fn new(vars: Vec<Var>, config: TrainConfig, forward: F) -> Result<Self> {
        config.validate()?;
        let optimizer = Optimizer::new(config.optimizer, vars.clone(), config.learning_rate)?;
        Ok(Trainer {
            optimizer,
            vars,
            forward,
            config,
            plateau: None,
            _sample_type: PhantomData,
            logger: Logger::root(slog::Discard, o!()),
            callbacks: vec![],
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn fit<R: Rng>(
        &mut self,
        train_dataset: &Dataset<T>,
        valid_dataset: Option<&Dataset<T>>,
        rng: &mut R,
    ) -> Result<()> {
        self.callbacks
            .sort_by(|cb1, cb2| (-(cb1.0 as i64), cb1.1).cmp(&(-(cb2.0 as i64), cb2.1)));
        let n_epochs = self.config.epochs;
        let batch_size = self.config.batch_size;

        for epoch in 1..=n_epochs {
            let mut train_info = TrainingInfo::new(n_epochs, epoch, train_dataset.len(), true);
            train_info.learning_rate = self.learning_rate();
            self.notify(Event::EpochBegin, &train_info);
            self.notify(Event::EpochTrainBegin, &train_info);
            let loss =
                self.process_batches(&mut train_info, train_dataset, batch_size, Some(&mut *rng))?;
            train_info.loss = Some(loss);
            self.notify(Event::EpochTrainEnd, &train_info);
            let mut monitored = loss;

            let mut last_info = train_info;
            if let Some(v_data) = valid_dataset {
                let mut valid_info = TrainingInfo::new(n_epochs, epoch, v_data.len(), false);
                valid_info.learning_rate = self.learning_rate();
                self.notify(Event::EpochValidateBegin, &valid_info);
                let loss = self.process_batches::<R>(&mut valid_info, v_data, batch_size, None)?;
                valid_info.loss = Some(loss);
                self.notify(Event::EpochValidateEnd, &valid_info);
                monitored = loss;
                last_info = valid_info;
            }
            self.notify(Event::EpochEnd, &last_info);
            self.update_learning_rate(monitored);
        }
        Ok(())
    }

    fn update_learning_rate(&mut self, loss: f32) {
        let lr = self.optimizer.learning_rate();
        let next = match self.config.schedule {
            Schedule::Constant => lr,
            Schedule::Multiply { factor } => lr * factor,
            Schedule::Plateau { factor, patience } => {
                let state = self.plateau.get_or_insert(Plateau {
                    best: f32::INFINITY,
                    bad_epochs: 0,
                });
                if loss < state.best {
                    state.best = loss;
                    state.bad_epochs = 0;
                    lr
                } else {
                    state.bad_epochs += 1;
                    if state.bad_epochs >= patience {
                        state.bad_epochs = 0;
                        lr * factor
                    } else {
                        lr
                    }
                }
            }
        };
        if next != lr {
            debug!(self.logger, "learning rate updated"; "from" => lr, "to" => next);
            self.optimizer.set_learning_rate(next);
        }
    }

    fn process_batches<R: Rng>(
        &mut self,
        info: &mut TrainingInfo,
        dataset: &Dataset<T>,
        batch_size: usize,
        rng: Option<&mut R>,
    ) -> Result<f32> {
        let train = info.train;
        let batches: Vec<Vec<&T>> = match rng {
            Some(rng) if train => dataset.shuffled_batch(batch_size, rng).collect(),
            _ => dataset.batch(batch_size).collect(),
        };
        let mut total_loss = 0.0;
        for (index, batch) in batches.iter().enumerate() {
            info.batch_index = Some(index);
            info.batch_size = Some(batch.len());
            self.notify(Event::BatchBegin, info);
            let (loss, accuracy) = (self.forward)(batch.as_slice(), train)?;
            let batch_loss = loss.to_scalar::<f32>()?;
            if train {
                self.update(&loss)?;
            }
            total_loss += batch_loss * batch.len() as f32;
            info.batch_loss = Some(batch_loss);
            info.output = Some(accuracy);
            self.notify(Event::BatchEnd, info);
        }
        Ok(if dataset.is_empty() {
            0.0
        } else {
            total_loss / dataset.len() as f32
        })
    }

    /// One optimizer step from the gradients of a full batch.
    fn update(&mut self, loss: &Tensor) -> Result<()> {
        let mut grads = loss.backward()?;
        if self.config.weight_decay > 0.0 {
            apply_weight_decay(&mut grads, &self.vars, self.config.weight_decay)?;
        }
        if let Some(threshold) = self.config.gradient_clipping {
            if threshold > 0.0 {
                clip_gradients(&mut grads, &self.vars, threshold)?;
            }
        }
        self.optimizer.step(&grads)
    }

    pub fn add_callback<S, C>(&mut self, name: S, callback: C)
    where
        S: Into<String>,
        C: Callback + 'a,
    {
        self.add_callback_with_priority(name, callback, 1000);
    }

    pub fn add_callback_with_priority<S, C>(&mut self, name: S, callback: C, priority: u32)
    where
        S: Into<String>,
        C: Callback + 'a,
    {
        let name = name.into();
        self.remove_callback(&name);
        let index = self.callbacks.len();
        self.callbacks.push((priority, index, name, Box::new(callback)));
    }

    pub fn has_callback(&self, name: &str) -> bool {
        self.callbacks.iter().any(|cb| cb.2 == name)
    }

    pub fn remove_callback(&mut self, name: &str) {
        if let Some(i) = self.callbacks.iter().position(|cb| cb.2 == name) {
            self.callbacks.remove(i);
        }
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    pub fn show_progress(&mut self) {
        self.add_callback_with_priority("progressbar", callbacks::ProgressBar::stderr(), 900);
    }

    pub fn enable_report(&mut self, logger: Logger) {
        self.add_callback_with_priority("reporter", callbacks::Reporter::new(logger), 800);
    }

    fn notify(&mut self, event: Event, info: &TrainingInfo) {
        for cb in self.callbacks.iter_mut() {
            let callback = &mut cb.3;
            match event {
                Event::EpochBegin => callback.on_epoch_begin(info),
                Event::EpochEnd => callback.on_epoch_end(info),
                Event::EpochTrainBegin => callback.on_epoch_train_begin(info),
                Event::EpochTrainEnd => callback.on_epoch_train_end(info),
                Event::EpochValidateBegin => callback.on_epoch_validate_begin(info),
                Event::EpochValidateEnd => callback.on_epoch_validate_end(info),
                Event::BatchBegin => callback.on_batch_begin(info),
                Event::BatchEnd => callback.on_batch_end(info),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingInfo {
    pub n_epochs: u32,
    pub epoch: u32,
    pub data_size: usize,
    pub train: bool,
    pub learning_rate: f64,
    pub loss: Option<f32>,
    pub batch_size: Option<usize>,
    pub batch_index: Option<usize>,
    pub batch_loss: Option<f32>,
    pub output: Option<Accuracy>,
}

impl TrainingInfo {
    fn new(n_epochs: u32, epoch: u32, data_size: usize, train: bool) -> Self {
        TrainingInfo {
            n_epochs,
            epoch,
            data_size,
            train,
            learning_rate: 0.0,
            loss: None,
            batch_size: None,
            batch_index: None,
            batch_loss: None,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    EpochBegin,
    EpochEnd,
    EpochTrainBegin,
    EpochTrainEnd,
    EpochValidateBegin,
    EpochValidateEnd,
    BatchBegin,
    BatchEnd,
}

#[allow(unused_variables)]
pub trait Callback {
    fn on_epoch_begin(&mut self, info: &TrainingInfo) {}
    fn on_epoch_end(&mut self, info: &TrainingInfo) {}
    fn on_epoch_train_begin(&mut self, info: &TrainingInfo) {}
    fn on_epoch_train_end(&mut self, info: &TrainingInfo) {}
    fn on_epoch_validate_begin(&mut self, info: &TrainingInfo) {}
    fn on_epoch_validate_end(&mut self, info: &TrainingInfo) {}
    fn on_batch_begin(&mut self, info: &TrainingInfo) {}
    fn on_batch_end(&mut self, info: &TrainingInfo) {}
}
