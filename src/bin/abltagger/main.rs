#[macro_use]
extern crate abltagger;
#[macro_use]
extern crate slog;

use std::collections::HashSet;
use std::error::Error;
use std::fs;
use std::io::{self as std_io, Write as _};
use std::path::{Path, PathBuf};

use abltagger::app::prelude::*;
use abltagger::config::{
    CharEncoderKind, Hyperparameters, LemmaMode, ModelConfig, ModelVariant, MorphlexConfig,
    OptimizerKind, PretrainedConfig, Schedule, TagDecoding, TrainConfig,
};
use abltagger::dataset::{Load, TsvLoader};
use abltagger::io::embedding::{self, Embeddings, Format};
use abltagger::io::{self as abl_io, tsv};
use abltagger::lang::{Phrasal, Sentence, Token};
use abltagger::preprocessing::{Preprocessor, Sample, Vocab};
use abltagger::training::{self, callbacks, Accuracy, ExternalVocabularies, Trainer};
use abltagger::utils;
use abltagger::{Resources, Tagger};
use candle_core::Tensor;
use slog::Logger;

type CommandResult = Result<(), Box<dyn Error + Send + Sync>>;

static MODEL_FILE: &str = "model.safetensors";
static HYPERPARAMETERS_FILE: &str = "hyperparameters.json";

fn load_table<P: AsRef<Path>>(
    path: P,
    format: Format,
    logger: &Logger,
) -> std_io::Result<Embeddings> {
    info!(logger, "loading vectors from {} ...", path.as_ref().display());
    let table = embedding::load_embeddings(path, format)?;
    info!(logger, "loaded {} vectors of dimension {}", table.len(), table.dim());
    Ok(table)
}

fn train(c: &Train, output_dir: Option<PathBuf>, logger: &Logger) -> CommandResult {
    let device = utils::device::select_device(c.device)?;
    let (mut model_config, mut train_config) = match c.config {
        Some(ref path) => {
            info!(logger, "reading hyperparameters from {}", path.display());
            let h = Hyperparameters::read(path)?;
            (h.model, h.train)
        }
        None => (c.variant.config(), TrainConfig::default()),
    };
    c.override_config(&mut model_config, &mut train_config);
    let mut rng = utils::rand::rng_with_seed(train_config.seed);

    let mut resources = Resources::default();
    if let Some(ref path) = c.pretrained {
        let mut table = load_table(path, Format::Text, logger)?;
        table.randomize_unknown(&mut rng, 0.1);
        model_config.pretrained = Some(PretrainedConfig {
            dim: table.dim(),
            freeze: !c.tune_pretrained,
        });
        resources.pretrained = Some(table);
    }
    if let Some(ref path) = c.morphlex {
        let table = load_table(path, Format::Bracketed, logger)?;
        model_config.morphlex = Some(MorphlexConfig {
            n_hot_size: table.dim(),
            projection_size: c.morphlex_size,
        });
        resources.morphlex = Some(table);
    }
    model_config.validate()?;
    train_config.validate()?;

    let mut preprocessor = Preprocessor::new(&model_config, train_config.min_word_freq);
    if let Some(ref table) = resources.pretrained {
        preprocessor.set_pretrained(table.vocab().clone());
    }
    if let Some(ref table) = resources.morphlex {
        preprocessor.set_morphlex(table.vocab().clone());
    }
    if let Some(ref path) = c.known_chars {
        let chars = abl_io::read_known_chars(path)?;
        info!(logger, "{} known characters from {}", chars.len(), path.display());
        preprocessor.add_chars(chars);
    }
    let mut loader = TsvLoader::new(preprocessor);
    info!(logger, "train file: {}", c.input.display());
    let train_dataset = loader.load(&c.input)?;
    loader.fix();
    let valid_dataset = match c.valid_file {
        Some(ref path) => {
            info!(logger, "valid file: {}", path.display());
            Some(loader.load(path)?)
        }
        None => None,
    };
    let preprocessor = loader.into_preprocessor();
    info!(
        logger,
        "vocabularies";
        "chars" => preprocessor.chars().size(),
        "tags" => preprocessor.tags().size(),
        "coarse_tags" => preprocessor.coarse_tags().size(),
        "words" => preprocessor.words().map(Vocab::size),
        "rules" => preprocessor.rules().map(Vocab::size)
    );

    let tagger = Tagger::new(model_config.clone(), preprocessor, &resources, &device)?
        .with_logger(logger.new(o!("component" => "tagger")));
    if let Some(seed) = train_config.seed {
        tagger.model().reseed(seed);
    }
    let hyperparameters = Hyperparameters {
        model: model_config,
        train: train_config.clone(),
    };
    debug!(logger, "{:?}", hyperparameters);
    if let Some(ref dir) = output_dir {
        fs::create_dir_all(dir)?;
        let path = dir.join(HYPERPARAMETERS_FILE);
        info!(logger, "writing hyperparameters to {}", path.display());
        hyperparameters.write(path)?;
    }

    let vars = training::trainable_vars(tagger.varmap(), &tagger.model().frozen_params())?;
    info!(logger, "{} trainable tensors", vars.len());
    let forward = |batch: &[&Sample], train: bool| -> abltagger::Result<(Tensor, Accuracy)> {
        let output = tagger.loss(batch, train)?;
        let correct = output.tag_correct.or(output.lemma_correct).unwrap_or(0);
        Ok((output.loss, Accuracy::new(correct, output.tokens)))
    };
    let mut trainer = Trainer::new(vars, train_config.clone(), forward)?;
    trainer.set_logger(logger.new(o!("component" => "trainer")));
    if !c.no_progress {
        trainer.show_progress();
    }
    trainer.enable_report(logger.new(o!()));
    if let Some(ref dir) = output_dir {
        let mut saver = callbacks::Saver::new(&tagger, dir.join(MODEL_FILE), logger.new(o!()));
        if let Some(interval) = train_config.save_interval {
            saver.set_interval(interval);
        }
        saver.save_best(valid_dataset.is_some());
        trainer.add_callback("saver", saver);
    }

    trainer.fit(&train_dataset, valid_dataset.as_ref(), &mut rng)?;
    drop(trainer);

    if let Some(ref dir) = output_dir {
        // with a validation set the best model has already been saved
        if valid_dataset.is_none() {
            let path = dir.join(MODEL_FILE);
            info!(logger, "saving the model to {} ...", path.display());
            tagger.save(path)?;
        }
    }
    Ok(())
}

fn load_tagger(
    model: &Path,
    device: i32,
    logger: &Logger,
) -> Result<Tagger, Box<dyn Error + Send + Sync>> {
    let device = utils::device::select_device(device)?;
    let path = if model.is_dir() {
        model.join(MODEL_FILE)
    } else {
        model.to_path_buf()
    };
    info!(logger, "loading the model from {} ...", path.display());
    Ok(Tagger::load(path, &device)?.with_logger(logger.new(o!("component" => "tagger"))))
}

fn tag(c: &Tag, logger: &Logger) -> CommandResult {
    let tagger = load_tagger(&c.model, c.device, logger)?;
    info!(logger, "input file: {}", c.input.display());
    let sentences = tsv::read_file(&c.input)?;
    let forms: Vec<Vec<&str>> = sentences.iter().map(Sentence::forms).collect();
    let outputs = if c.given_tags {
        let tags: Vec<Vec<&str>> = sentences
            .iter()
            .map(|s| s.tags().ok_or("every token needs a tag with `--given-tags`"))
            .collect::<Result<_, _>>()?;
        tagger
            .lemmatize_bulk(&forms, &tags, c.batch_size)?
            .into_iter()
            .zip(&tags)
            .zip(&forms)
            .map(|((lemmas, tags), forms)| {
                forms
                    .iter()
                    .zip(tags)
                    .zip(lemmas)
                    .map(|((form, tag), lemma)| {
                        Token::new(form.to_string(), Some(tag.to_string()), Some(lemma.lemma))
                    })
                    .collect()
            })
            .collect::<Vec<Vec<Token>>>()
    } else {
        tagger
            .annotate_bulk(&forms, c.batch_size)?
            .into_iter()
            .map(|annotations| {
                annotations
                    .into_iter()
                    .map(|a| Token::new(a.form, a.tag, a.lemma.map(|l| l.lemma)))
                    .collect()
            })
            .collect()
    };

    let out: Box<dyn std_io::Write> = match c.output {
        Some(ref path) => {
            info!(logger, "writing annotations to {}", path.display());
            Box::new(std_io::BufWriter::new(fs::File::create(path)?))
        }
        None => Box::new(std_io::BufWriter::new(std_io::stdout())),
    };
    let mut writer = tsv::Writer::new(out);
    for tokens in outputs {
        writer.write_sentence(&Sentence::from_tokens(tokens))?;
    }
    writer.into_inner().flush()?;
    info!(logger, "annotated {} sentences", sentences.len());
    Ok(())
}

fn read_vocab(path: &Path, logger: &Logger) -> std_io::Result<Vocab> {
    let symbols = abl_io::read_symbols(path)?;
    info!(logger, "read {} symbols from {}", symbols.len(), path.display());
    Ok(Vocab::from_symbols(symbols))
}

fn evaluate(c: &Evaluate, logger: &Logger) -> CommandResult {
    let tagger = load_tagger(&c.model, c.device, logger)?;
    let mut external = ExternalVocabularies::from_preprocessor(tagger.preprocessor());
    if let Some(ref path) = c.morphlex_vocab {
        external.morphlex = Some(read_vocab(path, logger)?);
    }
    if let Some(ref path) = c.pretrained_vocab {
        external.pretrained = Some(read_vocab(path, logger)?);
    }
    info!(logger, "test file: {}", c.input.display());
    let sentences = tsv::read_file(&c.input)?;
    let report = training::evaluate_with(&tagger, &sentences, c.batch_size, &external)?;
    if let Some(ref tagging) = report.tagging {
        let a = &tagging.accuracy;
        info!(logger, "tagging accuracy: {}", a.total);
        info!(logger, "tagging accuracy (known): {}", a.known);
        info!(logger, "tagging accuracy (unknown): {}", a.unknown);
        info!(logger, "tagging accuracy (unknown by coverage): {}", tagging.unknown_coverage);
        println!("tagging\t{}\t{}\t{}", a.total, a.known, a.unknown);
        let u = &tagging.unknown_coverage;
        println!(
            "tagging-unknown\t{}\t{}\t{}\t{}",
            u.both, u.morphlex, u.pretrained, u.neither
        );
        if let Some(n) = c.profile {
            print_profile("tag", &tagging.profile, n);
        }
    }
    if let Some(ref lemmatization) = report.lemmatization {
        let a = &lemmatization.accuracy;
        info!(logger, "lemmatization accuracy: {}", a.total);
        info!(logger, "lemmatization accuracy (known): {}", a.known);
        info!(logger, "lemmatization accuracy (unknown): {}", a.unknown);
        if lemmatization.truncated > 0 {
            warn!(logger, "{} lemmas hit the length limit", lemmatization.truncated);
        }
        println!("lemmatization\t{}\t{}\t{}", a.total, a.known, a.unknown);
        if let Some(n) = c.profile {
            print_profile("lemma", &lemmatization.profile, n);
        }
    }
    if c.confusion {
        match report.confusion {
            Some(ref confusion) => println!("{}", confusion),
            None => warn!(logger, "confusion needs both gold tags and gold lemmas"),
        }
    }
    Ok(())
}

fn print_profile(feature: &str, profile: &training::Profile, n: usize) {
    println!("{} errors\t{}", feature, profile.total());
    for (gold, predicted, count) in profile.most_common(n) {
        println!("{}\t{}\t{}", count, gold, predicted);
    }
}

fn filter_embedding(c: &FilterEmbedding, logger: &Logger) -> CommandResult {
    let mut forms = HashSet::new();
    for path in &c.inputs {
        info!(logger, "reading tokens from {}", path.display());
        for sentence in tsv::read_file(path)? {
            forms.extend(sentence.forms().into_iter().map(String::from));
        }
    }
    info!(logger, "{} distinct tokens", forms.len());
    let input = std_io::BufReader::new(fs::File::open(&c.embedding)?);
    let output = std_io::BufWriter::new(fs::File::create(&c.output)?);
    let written = embedding::filter_embeddings(input, output, c.format, &forms)?;
    info!(logger, "wrote {} vectors to {}", written, c.output.display());
    Ok(())
}

fn vocab(c: &VocabCommand, logger: &Logger) -> CommandResult {
    let tagger = load_tagger(&c.model, -1, logger)?;
    let preprocessor = tagger.preprocessor();
    let vocabs: Vec<(&str, Option<&Vocab>)> = vec![
        ("words", preprocessor.words()),
        ("pretrained", preprocessor.pretrained()),
        ("morphlex", preprocessor.morphlex()),
        ("chars", Some(preprocessor.chars())),
        ("tags", Some(preprocessor.tags())),
        ("coarse_tags", Some(preprocessor.coarse_tags())),
        ("rules", preprocessor.rules()),
    ];
    let stdout = std_io::stdout();
    let mut out = stdout.lock();
    for (name, vocab) in vocabs {
        let vocab = match vocab {
            Some(v) => v,
            None => continue,
        };
        match c.name {
            Some(ref wanted) if wanted != name => {}
            Some(_) if c.plain => {
                for (id, symbol) in vocab.symbols().iter().enumerate() {
                    if !Vocab::is_reserved(id as u32) {
                        writeln!(out, "{}", symbol)?;
                    }
                }
            }
            Some(_) => {
                for (id, symbol) in vocab.symbols().iter().enumerate() {
                    writeln!(out, "{}\t{}\t{}", id, symbol, vocab.freq(id as u32).unwrap_or(0))?;
                }
            }
            None => writeln!(out, "{}\t{}", name, vocab.size())?,
        }
    }
    Ok(())
}

#[derive(StructOpt, Debug)]
#[structopt(name = "abltagger")]
struct Args {
    #[structopt(flatten)]
    common: CommonArgs,
    #[structopt(subcommand)]
    command: Command,
}

impl FromArgs for Args {
    fn common_args(&self) -> &CommonArgs {
        &self.common
    }
}

#[derive(StructOpt, Debug)]
enum Command {
    #[structopt(name = "train", about = "Trains a model")]
    Train(Train),
    #[structopt(name = "tag", about = "Tags and lemmatizes sentences")]
    Tag(Tag),
    #[structopt(name = "evaluate", about = "Evaluates a model on labeled sentences")]
    Evaluate(Evaluate),
    #[structopt(name = "vocab", about = "Prints the vocabularies of a model")]
    Vocab(VocabCommand),
    #[structopt(
        name = "filter-embedding",
        about = "Keeps the vectors of tokens that occur in labeled data"
    )]
    FilterEmbedding(FilterEmbedding),
}

#[derive(StructOpt, Debug)]
struct Train {
    /// A training data file
    #[structopt(name = "INPUT", parse(from_os_str))]
    input: PathBuf,
    /// A validation data file
    #[structopt(name = "VFILE", parse(from_os_str))]
    valid_file: Option<PathBuf>,
    /// A hyperparameter file; overrides `--variant`
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,
    /// Model size (small or large)
    #[structopt(long = "variant", default_value = "small")]
    variant: ModelVariant,
    /// Number of examples in each mini-batch
    #[structopt(long = "batch")]
    batch_size: Option<usize>,
    /// GPU device ID (negative value indicates CPU)
    #[structopt(long = "device", default_value = "-1")]
    device: i32,
    /// A file of pretrained word embeddings
    #[structopt(long = "embed", parse(from_os_str))]
    pretrained: Option<PathBuf>,
    /// Update pretrained embeddings during training
    #[structopt(long = "tune-embed")]
    tune_pretrained: bool,
    /// A morphological lexicon of n-hot vectors (`word;[b1,b2,...]`)
    #[structopt(long = "morphlex", parse(from_os_str))]
    morphlex: Option<PathBuf>,
    /// A file of whitespace-separated characters added to the character vocabulary
    #[structopt(long = "known-chars", parse(from_os_str))]
    known_chars: Option<PathBuf>,
    /// Projected size of morphological lexicon vectors
    #[structopt(long = "morphlex-size", default_value = "64")]
    morphlex_size: usize,
    /// Character encoder: `lstm` or a CNN window such as `cnn3`
    #[structopt(long = "chars")]
    char_encoder: Option<String>,
    /// Decode tags with a CRF layer
    #[structopt(long = "crf")]
    crf: bool,
    /// Lemmatize with suffix edit rules instead of generating characters
    #[structopt(long = "edit-rules")]
    edit_rules: bool,
    /// Train the tagger only
    #[structopt(long = "no-lemmatizer")]
    no_lemmatizer: bool,
    /// Gradient clipping threshold
    #[structopt(long = "gclip")]
    gradient_clipping: Option<f64>,
    /// Learning rate for an optimizer
    #[structopt(long = "lrate")]
    learning_rate: Option<f64>,
    /// Optimizer (sgd or adam)
    #[structopt(long = "optimizer")]
    optimizer: Option<OptimizerKind>,
    /// Multiply the learning rate by this factor after every epoch
    #[structopt(long = "lrdecay")]
    lr_decay: Option<f64>,
    /// Number of sweeps over the dataset to train
    #[structopt(long = "epoch")]
    n_epochs: Option<u32>,
    /// Words seen fewer times are mapped to the unknown word
    #[structopt(long = "min-freq")]
    min_word_freq: Option<u32>,
    /// Random seed
    #[structopt(long = "seed")]
    seed: Option<u64>,
    /// Directory for saved models
    #[structopt(long = "save", parse(from_os_str))]
    save_to: Option<PathBuf>,
    /// Save every N epochs
    #[structopt(long = "save-interval")]
    save_interval: Option<u32>,
    /// Weight decay strength
    #[structopt(long = "wdecay")]
    weight_decay: Option<f64>,
    /// Do not show a progress bar
    #[structopt(long = "no-progress")]
    no_progress: bool,
}

impl Train {
    fn override_config(&self, model: &mut ModelConfig, train: &mut TrainConfig) {
        if let (Some(kind), Some(chars)) = (self.char_encoder.as_ref(), model.chars.as_mut()) {
            chars.encoder = match kind.trim_start_matches("cnn").parse::<usize>() {
                Ok(window) if kind.starts_with("cnn") => CharEncoderKind::Cnn { window },
                _ if kind == "cnn" => CharEncoderKind::Cnn { window: 3 },
                _ => CharEncoderKind::BiLstm,
            };
        }
        if let Some(tagger) = model.tagger.as_mut() {
            if self.crf {
                tagger.decoding = TagDecoding::Crf;
            }
        }
        if self.no_lemmatizer {
            model.lemmatizer = None;
        }
        if let Some(lemmatizer) = model.lemmatizer.as_mut() {
            if self.edit_rules {
                lemmatizer.mode = LemmaMode::EditRule;
            }
        }
        if let Some(v) = self.batch_size {
            train.batch_size = v;
        }
        if let Some(v) = self.gradient_clipping {
            train.gradient_clipping = Some(v);
        }
        if let Some(v) = self.learning_rate {
            train.learning_rate = v;
        }
        if let Some(v) = self.optimizer {
            train.optimizer = v;
        }
        if let Some(factor) = self.lr_decay {
            train.schedule = Schedule::Multiply { factor };
        }
        if let Some(v) = self.n_epochs {
            train.epochs = v;
        }
        if let Some(v) = self.min_word_freq {
            train.min_word_freq = v;
        }
        if let Some(v) = self.weight_decay {
            train.weight_decay = v;
        }
        if self.seed.is_some() {
            train.seed = self.seed;
        }
        if self.save_interval.is_some() {
            train.save_interval = self.save_interval;
        }
    }
}

#[derive(StructOpt, Debug)]
struct Tag {
    /// Sentences to annotate, one token per line
    #[structopt(name = "INPUT", parse(from_os_str))]
    input: PathBuf,
    /// A model file or the directory it was saved to
    #[structopt(name = "MODEL", parse(from_os_str))]
    model: PathBuf,
    /// Lemmatize with the tags in the input instead of predicting them
    #[structopt(long = "given-tags")]
    given_tags: bool,
    /// Output file; standard output when omitted
    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,
    /// Number of sentences in each mini-batch
    #[structopt(long = "batch", default_value = "32")]
    batch_size: usize,
    /// GPU device ID (negative value indicates CPU)
    #[structopt(long = "device", default_value = "-1")]
    device: i32,
}

#[derive(StructOpt, Debug)]
struct Evaluate {
    /// A labeled data file
    #[structopt(name = "INPUT", parse(from_os_str))]
    input: PathBuf,
    /// A model file or the directory it was saved to
    #[structopt(name = "MODEL", parse(from_os_str))]
    model: PathBuf,
    /// Number of sentences in each mini-batch
    #[structopt(long = "batch", default_value = "32")]
    batch_size: usize,
    /// GPU device ID (negative value indicates CPU)
    #[structopt(long = "device", default_value = "-1")]
    device: i32,
    /// Print the N most frequent errors of every feature
    #[structopt(long = "profile")]
    profile: Option<usize>,
    /// Print how often tags and lemmas are right together
    #[structopt(long = "confusion")]
    confusion: bool,
    /// Lexicon vocabulary to split unknown tokens by, one token per line
    #[structopt(long = "morphlex-vocab", parse(from_os_str))]
    morphlex_vocab: Option<PathBuf>,
    /// Pretrained vocabulary to split unknown tokens by, one token per line
    #[structopt(long = "pretrained-vocab", parse(from_os_str))]
    pretrained_vocab: Option<PathBuf>,
}

#[derive(StructOpt, Debug)]
struct VocabCommand {
    /// A model file or the directory it was saved to
    #[structopt(name = "MODEL", parse(from_os_str))]
    model: PathBuf,
    /// Print the entries of one vocabulary (words, pretrained, morphlex, chars, tags, coarse_tags, rules)
    #[structopt(name = "NAME")]
    name: Option<String>,
    /// Print symbols only, one per line, leaving out reserved entries
    #[structopt(long = "plain")]
    plain: bool,
}

#[derive(StructOpt, Debug)]
struct FilterEmbedding {
    /// An embedding file
    #[structopt(name = "EMBEDDING", parse(from_os_str))]
    embedding: PathBuf,
    /// Output file, in the format of the input
    #[structopt(name = "OUTPUT", parse(from_os_str))]
    output: PathBuf,
    /// Labeled data files whose tokens are kept
    #[structopt(name = "INPUTS", parse(from_os_str), required = true)]
    inputs: Vec<PathBuf>,
    /// Format of the embedding file (text or bracketed)
    #[structopt(long = "format", default_value = "text")]
    format: Format,
}

main!(|args: Args, context: Context| match args.command {
    Command::Train(ref c) => {
        info!(&context.logger, "execute subcommand: {:?}", c);
        let output_dir = c.save_to.as_ref().map(|dir| {
            let mut path = dir.clone();
            path.push(format!(
                "{}-{}",
                context.accesstime.format("%Y%m%d"),
                context.accessid
            ));
            path
        });
        train(c, output_dir, &context.logger)
    }
    Command::Tag(ref c) => {
        info!(&context.logger, "execute subcommand: {:?}", c);
        tag(c, &context.logger)
    }
    Command::Evaluate(ref c) => {
        info!(&context.logger, "execute subcommand: {:?}", c);
        evaluate(c, &context.logger)
    }
    Command::Vocab(ref c) => vocab(c, &context.logger),
    Command::FilterEmbedding(ref c) => {
        info!(&context.logger, "execute subcommand: {:?}", c);
        filter_embedding(c, &context.logger)
    }
});
