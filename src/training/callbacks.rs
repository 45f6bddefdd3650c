use std::io::{stderr, stdout, Stderr, Stdout, Write};
use std::path::{Path, PathBuf};

use pbr::ProgressBar as ProgressBarImpl;
use slog::Logger;

use crate::api::Tagger;
use crate::training::{Accuracy, Callback, TrainingInfo};

/// Logs loss and accuracy at the end of every training and validation pass.
#[derive(Debug)]
pub struct Reporter {
    logger: Logger,
    accuracy: Accuracy,
}

impl Reporter {
    pub fn new(logger: Logger) -> Self {
        Reporter {
            logger,
            accuracy: Accuracy::default(),
        }
    }

    pub fn reset(&mut self) {
        self.accuracy = Accuracy::default();
    }

    pub fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    fn report(&self, label: &str, info: &TrainingInfo) {
        let loss = info.loss.unwrap_or(f32::NAN);
        match self.accuracy.value() {
            Some(acc) => info!(
                self.logger,
                "[{}] epoch {} - #samples: {}, loss: {:.8}, accuracy: {:.8}",
                label,
                info.epoch,
                info.data_size,
                loss,
                acc;
                "lr" => info.learning_rate
            ),
            None => info!(
                self.logger,
                "[{}] epoch {} - #samples: {}, loss: {:.8}, accuracy: NaN",
                label,
                info.epoch,
                info.data_size,
                loss;
                "lr" => info.learning_rate
            ),
        }
    }
}

impl Callback for Reporter {
    fn on_epoch_train_begin(&mut self, _info: &TrainingInfo) {
        self.reset();
    }

    fn on_epoch_train_end(&mut self, info: &TrainingInfo) {
        self.report("training", info);
    }

    fn on_epoch_validate_begin(&mut self, _info: &TrainingInfo) {
        self.reset();
    }

    fn on_epoch_validate_end(&mut self, info: &TrainingInfo) {
        self.report("validation", info);
    }

    fn on_batch_end(&mut self, info: &TrainingInfo) {
        if let Some(accuracy) = info.output {
            self.accuracy += accuracy;
        }
    }
}

pub struct ProgressBar<W: Write> {
    pbar: Option<ProgressBarImpl<W>>,
    handle: fn() -> W,
}

impl ProgressBar<Stdout> {
    pub fn stdout() -> Self {
        ProgressBar {
            pbar: None,
            handle: stdout,
        }
    }
}

impl ProgressBar<Stderr> {
    pub fn stderr() -> Self {
        ProgressBar {
            pbar: None,
            handle: stderr,
        }
    }
}

impl<W: Write> Callback for ProgressBar<W> {
    fn on_epoch_train_begin(&mut self, info: &TrainingInfo) {
        let mut pbar = ProgressBarImpl::on((self.handle)(), info.data_size as u64);
        pbar.message(&format!("epoch {}/{} ", info.epoch, info.n_epochs));
        pbar.tick();
        self.pbar = Some(pbar);
    }

    fn on_batch_end(&mut self, info: &TrainingInfo) {
        if let (Some(pbar), Some(size)) = (self.pbar.as_mut(), info.batch_size) {
            if info.train {
                pbar.add(size as u64);
            }
        }
    }

    fn on_epoch_train_end(&mut self, _info: &TrainingInfo) {
        if let Some(mut pbar) = self.pbar.take() {
            pbar.finish();
        }
    }
}

/// Saves the model every `interval` epochs from epoch `save_from` on, and
/// whenever the validation loss improves if `save_best` is set.
pub struct Saver<'a> {
    tagger: &'a Tagger,
    path: PathBuf,
    interval: u32,
    save_from: u32,
    save_best: bool,
    best_loss: f32,
    logger: Logger,
}

impl<'a> Saver<'a> {
    pub fn new<P: AsRef<Path>>(tagger: &'a Tagger, path: P, logger: Logger) -> Self {
        Saver {
            tagger,
            path: path.as_ref().to_path_buf(),
            interval: 0,
            save_from: 1,
            save_best: false,
            best_loss: f32::INFINITY,
            logger,
        }
    }

    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval;
    }

    pub fn save_from(&mut self, epoch: u32) {
        self.save_from = epoch;
    }

    pub fn save_best(&mut self, enabled: bool) {
        self.save_best = enabled;
    }

    /// `model.safetensors` becomes `model.epoch-3.safetensors`.
    fn epoch_path(&self, epoch: u32) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}.epoch-{}.{}", stem, epoch, ext.to_string_lossy()),
            None => format!("{}.epoch-{}", stem, epoch),
        };
        self.path.with_file_name(name)
    }

    fn save(&self, path: &Path) {
        info!(self.logger, "saving the model to {} ...", path.display());
        if let Err(e) = self.tagger.save(path) {
            error!(self.logger, "failed to save the model: {}", e);
        }
    }
}

impl<'a> Callback for Saver<'a> {
    fn on_epoch_end(&mut self, info: &TrainingInfo) {
        if self.interval > 0 && info.epoch >= self.save_from && info.epoch % self.interval == 0 {
            let path = self.epoch_path(info.epoch);
            self.save(&path);
        }
        if self.save_best && !info.train {
            if let Some(loss) = info.loss {
                if loss < self.best_loss {
                    self.best_loss = loss;
                    self.save(&self.path);
                }
            }
        }
    }
}
