extern crate abltagger;
extern crate candle_core;
extern crate rand;
extern crate tempfile;

use std::collections::HashMap;
use std::sync::OnceLock;

use abltagger::config::{
    CharConfig, CharEncoderKind, ContextualConfig, EncoderConfig, LemmaMode, LemmatizerConfig,
    ModelConfig, OptimizerKind, Schedule, TagDecoding, TaggerConfig, TrainConfig,
};
use abltagger::dataset::Dataset;
use abltagger::error::{Error, ValidationError};
use abltagger::io::checkpoint::{self, Header};
use abltagger::io::embedding::Embeddings;
use abltagger::lang::{Phrasal, Sentence, Token, Tokenized};
use abltagger::models::nlp::TableEmbedder;
use abltagger::preprocessing::{Preprocess, Preprocessor, Sample, Vocab};
use abltagger::training::{self, Accuracy, Coverage, ExternalVocabularies, Trainer};
use abltagger::{Resources, Tagger};
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sentence(tokens: &[(&str, &str, &str)]) -> Sentence {
    Sentence::from_tokens(
        tokens
            .iter()
            .map(|&(form, tag, lemma)| Token::new(form, Some(tag), Some(lemma)))
            .collect(),
    )
}

fn corpus() -> Vec<Sentence> {
    vec![
        sentence(&[
            ("Þetta", "fahen", "þessi"),
            ("er", "sfg3en", "vera"),
            ("setning", "nven", "setning"),
            (".", "pl", "."),
        ]),
        sentence(&[
            ("Hundurinn", "nkeng", "hundur"),
            ("er", "sfg3en", "vera"),
            ("góður", "lkensf", "góður"),
            (".", "pl", "."),
        ]),
        sentence(&[
            ("Hún", "fpven", "hún"),
            ("sefur", "sfg3en", "sofa"),
            (".", "pl", "."),
        ]),
    ]
}

fn tiny_config() -> ModelConfig {
    ModelConfig {
        variant: None,
        max_sentence_len: 8,
        word_embed_size: Some(16),
        pretrained: None,
        morphlex: None,
        chars: Some(CharConfig {
            embed_size: 8,
            hidden_size: 8,
            encoder: CharEncoderKind::BiLstm,
        }),
        contextual: None,
        encoder: EncoderConfig {
            hidden_size: 16,
            num_layers: 1,
            dropout: 0.0,
            input_dropout: 0.0,
        },
        tagger: Some(TaggerConfig::default()),
        lemmatizer: Some(LemmatizerConfig {
            mode: LemmaMode::EditRule,
            char_embed_size: 8,
            hidden_size: 16,
            source_hidden_size: 8,
            tag_embed_size: 4,
            max_length: 12,
            ..LemmatizerConfig::default()
        }),
    }
}

fn train_config() -> TrainConfig {
    TrainConfig {
        epochs: 60,
        batch_size: 1,
        learning_rate: 0.02,
        optimizer: OptimizerKind::Adam,
        schedule: Schedule::Constant,
        weight_decay: 0.0,
        gradient_clipping: Some(5.0),
        min_word_freq: 1,
        seed: Some(1),
        save_interval: None,
    }
}

fn fitted(config: &ModelConfig, sentences: &[Sentence]) -> (Preprocessor, Vec<Sample>) {
    let mut preprocessor = Preprocessor::new(config, 1);
    preprocessor.fit(sentences.iter());
    preprocessor.fix();
    let samples = preprocessor.transform(sentences.to_vec().into_iter()).collect();
    (preprocessor, samples)
}

fn train(tagger: &Tagger, samples: Vec<Sample>, config: TrainConfig) {
    let vars = training::trainable_vars(tagger.varmap(), &tagger.model().frozen_params()).unwrap();
    let forward = |batch: &[&Sample], train: bool| -> abltagger::Result<(Tensor, Accuracy)> {
        let output = tagger.loss(batch, train)?;
        let correct = output.tag_correct.unwrap_or(0);
        Ok((output.loss, Accuracy::new(correct, output.tokens)))
    };
    let mut trainer = Trainer::new(vars, config, forward).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    trainer
        .fit(&Dataset::from_items(samples), None, &mut rng)
        .unwrap();
}

/// Trained once and shared by the tests below.
fn trained() -> &'static Tagger {
    static TAGGER: OnceLock<Tagger> = OnceLock::new();
    TAGGER.get_or_init(|| {
        let config = tiny_config();
        let (preprocessor, samples) = fitted(&config, &corpus());
        let tagger = Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu).unwrap();
        train(&tagger, samples, train_config());
        tagger
    })
}

#[test]
fn test_tag_training_sentence() {
    let tagger = trained();
    let tags = tagger.tag(&["Þetta", "er", "setning", "."]).unwrap();
    assert_eq!(tags, vec!["fahen", "sfg3en", "nven", "pl"]);

    let annotations = tagger.annotate(&["Þetta", "er", "setning", "."]).unwrap();
    let lemmas: Vec<&str> = annotations
        .iter()
        .map(|a| a.lemma.as_ref().unwrap().lemma.as_str())
        .collect();
    assert_eq!(lemmas, vec!["þessi", "vera", "setning", "."]);
    assert!(annotations.iter().all(|a| !a.lemma.as_ref().unwrap().truncated));
}

#[test]
fn test_one_output_per_token() {
    let tagger = trained();
    let tags = tagger.tag(&["Köttur", "hleypur"]).unwrap();
    assert_eq!(tags.len(), 2);
    // every prediction is a tag seen in training
    for tag in &tags {
        assert!(tagger.preprocessor().tags().contains(tag.as_str()));
    }
    let annotations = tagger.annotate(&["Hún"]).unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].form, "Hún");
    assert!(annotations[0].tag.is_some());
}

#[test]
fn test_batch_invariance() {
    let tagger = trained();
    let sentences: Vec<Vec<&str>> = vec![
        vec!["Hún", "sefur", "."],
        vec!["Þetta", "er", "setning", "."],
        vec!["Hundurinn", "er", "góður", "og", "gamall", "."],
        vec!["Nei"],
    ];
    let one_by_one = tagger.annotate_bulk(&sentences, 1).unwrap();
    let together = tagger.annotate_bulk(&sentences, 3).unwrap();
    assert_eq!(one_by_one, together);
    assert_eq!(
        together.iter().map(|s| s.len()).collect::<Vec<_>>(),
        vec![3, 4, 6, 1]
    );
    assert_eq!(
        tagger.tag_bulk(&sentences, 4).unwrap(),
        tagger.tag_bulk(&sentences, 2).unwrap()
    );
}

#[test]
fn test_deterministic() {
    let tagger = trained();
    let sentence = ["Hundurinn", "sefur", "."];
    let first = tagger.annotate(&sentence).unwrap();
    for _ in 0..3 {
        assert_eq!(tagger.annotate(&sentence).unwrap(), first);
    }
}

#[test]
fn test_lemmatize_with_given_tags() {
    let tagger = trained();
    let lemmas = tagger
        .lemmatize(&["Hún", "sefur", "."], &["fpven", "sfg3en", "pl"])
        .unwrap();
    assert_eq!(lemmas.len(), 3);
    assert_eq!(lemmas[2].lemma, ".");
}

#[test]
fn test_validation_errors() {
    let tagger = trained();
    let empty: [&str; 0] = [];
    match tagger.tag(&empty) {
        Err(Error::Validation(ValidationError::EmptySentence)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    let long = vec!["er"; 9];
    match tagger.annotate(&long[..]) {
        Err(Error::Validation(ValidationError::SentenceTooLong { len: 9, max: 8 })) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(tagger.tag(&vec!["er"; 8][..]).unwrap().len(), 8);

    match tagger.lemmatize(&["Hún", "sefur"], &["fpven"]) {
        Err(Error::Validation(ValidationError::TagCountMismatch { tokens: 2, tags: 1 })) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    // one bad sentence rejects the whole call
    let sentences = vec![vec!["Hún", "sefur"], vec![]];
    assert!(tagger.tag_bulk(&sentences, 2).is_err());
}

#[test]
fn test_checkpoint_round_trip() {
    let tagger = trained();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.safetensors");
    tagger.save(&path).unwrap();

    let loaded = Tagger::load(&path, &Device::Cpu).unwrap();
    assert_eq!(loaded.config(), tagger.config());
    assert_eq!(
        loaded.preprocessor().tags().symbols(),
        tagger.preprocessor().tags().symbols()
    );
    let sentences: Vec<Vec<&str>> = vec![
        vec!["Þetta", "er", "setning", "."],
        vec!["Köttur", "sefur", "."],
    ];
    assert_eq!(
        loaded.annotate_bulk(&sentences, 2).unwrap(),
        tagger.annotate_bulk(&sentences, 2).unwrap()
    );
}

#[test]
fn test_checkpoint_mismatch() {
    let tagger = trained();
    let mut other_config = tiny_config();
    other_config.word_embed_size = Some(12);
    let other = Tagger::new(
        other_config,
        tagger.preprocessor().clone(),
        &Resources::default(),
        &Device::Cpu,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mismatch.safetensors");
    let header = Header::new(tagger.config().clone(), tagger.preprocessor().clone());
    checkpoint::save(&path, other.varmap(), &header).unwrap();
    match Tagger::load(&path, &Device::Cpu) {
        Err(Error::Checkpoint(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a mismatched checkpoint was accepted"),
    }

    let path = dir.path().join("headerless.safetensors");
    let mut tensors = HashMap::new();
    tensors.insert(
        "words.lookup".to_string(),
        Tensor::zeros((4, 2), candle_core::DType::F32, &Device::Cpu).unwrap(),
    );
    candle_core::safetensors::save(&tensors, &path).unwrap();
    match Tagger::load(&path, &Device::Cpu) {
        Err(Error::Checkpoint(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a checkpoint without header was accepted"),
    }
}

#[test]
fn test_evaluate_known_unknown() {
    let tagger = trained();
    let mut sentences = corpus();
    sentences.push(sentence(&[
        ("Hún", "fpven", "hún"),
        ("sefur", "sfg3en", "sofa"),
        ("vel", "aa", "vel"),
        (".", "pl", "."),
    ]));
    let report = training::evaluate(tagger, &sentences, 2).unwrap();

    let tagging = report.tagging.unwrap().accuracy;
    assert_eq!(tagging.total.total, 15);
    assert_eq!(tagging.known.total, 14);
    assert_eq!(tagging.unknown.total, 1);
    // `aa` was never seen, so it cannot be predicted
    assert_eq!(tagging.unknown.correct, 0);
    assert_eq!(tagging.known.correct, 14);

    let lemmas = report.lemmatization.unwrap();
    assert_eq!(lemmas.accuracy.total.total, 15);
    assert_eq!(lemmas.truncated, 0);
}

#[test]
fn test_evaluate_without_gold_lemmas() {
    let tagger = trained();
    let mut untagged = Sentence::from_forms(&["Hún", "sefur", "."]);
    for (token, tag) in untagged.tokens_mut().iter_mut().zip(&["fpven", "sfg3en", "pl"]) {
        token.set_tag(*tag);
    }
    let report = training::evaluate(tagger, &[untagged], 1).unwrap();
    assert_eq!(report.tagging.unwrap().accuracy.total.total, 3);
    assert!(report.lemmatization.is_none());
}

#[test]
fn test_new_requires_fixed_vocabularies() {
    let config = tiny_config();
    let preprocessor = Preprocessor::new(&config, 1);
    match Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu) {
        Err(Error::Config(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("an unfitted preprocessor was accepted"),
    }
}

#[test]
fn test_contextual_vectors() {
    let mut config = tiny_config();
    config.contextual = Some(ContextualConfig {
        dim: 3,
        bypass_encoder: false,
    });
    let (preprocessor, _) = fitted(&config, &corpus());
    let new_tagger = || {
        Tagger::new(
            config.clone(),
            preprocessor.clone(),
            &Resources::default(),
            &Device::Cpu,
        )
        .unwrap()
    };
    let table = |dim: usize| {
        let vocab = Vocab::from_symbols(vec!["Hún", "sefur"]);
        let values = (0..vocab.size() * dim).map(|i| i as f32 * 0.1).collect();
        TableEmbedder::new(Embeddings::new(vocab, dim, values).unwrap())
    };

    match new_tagger().tag(&["Hún", "sefur"]) {
        Err(Error::Contextual(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    match new_tagger().with_contextual(Box::new(table(2))) {
        Err(Error::Checkpoint(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("vectors of the wrong dimension were accepted"),
    }
    let tagger = new_tagger().with_contextual(Box::new(table(3))).unwrap();
    assert_eq!(tagger.tag(&["Hún", "sefur", "hratt"]).unwrap().len(), 3);

    // a model without contextual input refuses an embedder
    let plain = Tagger::new(
        tiny_config(),
        fitted(&tiny_config(), &corpus()).0,
        &Resources::default(),
        &Device::Cpu,
    )
    .unwrap();
    match plain.with_contextual(Box::new(table(3))) {
        Err(Error::Config(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("an embedder was attached to a model without contextual input"),
    }
}

#[test]
fn test_evaluate_profile_and_coverage() {
    let tagger = trained();
    let mut sentences = corpus();
    sentences.push(sentence(&[
        ("Hún", "fpven", "hún"),
        ("sefur", "sfg3en", "sofa"),
        ("vel", "aa", "vel"),
        ("úti", "aa", "úti"),
        (".", "pl", "."),
    ]));
    let external = ExternalVocabularies::new(
        Some(Vocab::from_symbols(vec!["vel", "hestur"])),
        Some(Vocab::from_symbols(vec!["vel"])),
    );
    assert_eq!(external.coverage("vel"), Coverage::Both);
    assert_eq!(external.coverage("hestur"), Coverage::Morphlex);
    assert_eq!(external.coverage("úti"), Coverage::Neither);

    let report = training::evaluate_with(tagger, &sentences, 2, &external).unwrap();
    let tagging = report.tagging.unwrap();
    assert_eq!(tagging.accuracy.unknown.total, 2);
    let coverage = tagging.unknown_coverage;
    assert_eq!(coverage.both.total, 1);
    assert_eq!(coverage.neither.total, 1);
    assert_eq!(coverage.morphlex.total + coverage.pretrained.total, 0);
    assert_eq!(coverage.both.correct + coverage.neither.correct, 0);

    // both unseen `aa` tokens are the only tagging errors
    assert_eq!(tagging.profile.total(), 2);
    let errors = tagging.profile.most_common(10);
    assert!(errors.iter().all(|&(gold, predicted, _)| gold == "aa" && predicted != "aa"));
    assert_eq!(errors.iter().map(|e| e.2).sum::<usize>(), 2);
    assert!(tagging.profile.most_common(0).is_empty());

    let lemmas = report.lemmatization.unwrap();
    assert_eq!(
        lemmas.profile.total(),
        lemmas.accuracy.total.total - lemmas.accuracy.total.correct
    );
    let confusion = report.confusion.unwrap();
    assert_eq!(confusion.total(), 16);
    assert_eq!(confusion.both_right + confusion.tag_right, 14);
    assert_eq!(
        confusion.both_right + confusion.lemma_right,
        lemmas.accuracy.total.correct
    );

    // without external vocabularies every unknown token is uncovered
    let report = training::evaluate(tagger, &sentences, 2).unwrap();
    assert_eq!(report.tagging.unwrap().unknown_coverage.neither.total, 2);
}

/// Sets a parameter to zeros, or to `value` at one index of a vector.
fn set_with_peak(tagger: &Tagger, name: &str, peaks: &[(u32, f32)]) {
    let dims = {
        let data = tagger.varmap().data().lock().unwrap();
        data.get(name).unwrap().as_tensor().dims().to_vec()
    };
    let mut values = vec![0f32; dims.iter().product()];
    for &(index, value) in peaks {
        values[index as usize] = value;
    }
    let tensor = Tensor::from_vec(values, dims, &Device::Cpu).unwrap();
    checkpoint::set_param(tagger.varmap(), name, &tensor).unwrap();
}

fn tagger_with(config: ModelConfig) -> Tagger {
    let (preprocessor, _) = fitted(&config, &corpus());
    Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu).unwrap()
}

#[test]
fn test_constrain_to_coarse() {
    for decoding in [TagDecoding::Greedy, TagDecoding::Crf] {
        for constrain in [false, true] {
            let mut config = tiny_config();
            config.tagger = Some(TaggerConfig {
                decoding,
                constrain_to_coarse: constrain,
                ..TaggerConfig::default()
            });
            let tagger = tagger_with(config);
            let preprocessor = tagger.preprocessor();
            let verb = preprocessor.tags().encode("sfg3en");
            let punct = preprocessor.tags().encode("pl");
            let p = preprocessor.coarse_tags().encode("p");

            // the coarse head always says `p`, the fine head prefers a verb
            set_with_peak(&tagger, "tagger.coarse.weight", &[]);
            set_with_peak(&tagger, "tagger.coarse.bias", &[(p, 10.0)]);
            set_with_peak(&tagger, "tagger.fine.weight", &[]);
            set_with_peak(&tagger, "tagger.fine.bias", &[(verb, 10.0), (punct, 1.0)]);

            let tags = tagger.tag(&["Hún", "sefur", "."]).unwrap();
            if constrain {
                assert_eq!(tags, vec!["pl"; 3]);
            } else if decoding == TagDecoding::Greedy {
                assert_eq!(tags, vec!["sfg3en"; 3]);
            }
        }
    }
}

#[test]
fn test_crf_tagger() {
    let mut config = tiny_config();
    config.tagger = Some(TaggerConfig {
        decoding: TagDecoding::Crf,
        ..TaggerConfig::default()
    });
    let (preprocessor, samples) = fitted(&config, &corpus());
    let tagger = Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu).unwrap();
    train(&tagger, samples, train_config());

    let tags = tagger.tag(&["Hundurinn", "er", "góður", "."]).unwrap();
    assert_eq!(tags, vec!["nkeng", "sfg3en", "lkensf", "pl"]);

    let sentences: Vec<Vec<&str>> = vec![
        vec!["Hún", "sefur", "."],
        vec!["Þetta", "er", "setning", "."],
        vec!["Nei"],
    ];
    assert_eq!(
        tagger.tag_bulk(&sentences, 1).unwrap(),
        tagger.tag_bulk(&sentences, 3).unwrap()
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crf.safetensors");
    tagger.save(&path).unwrap();
    let loaded = Tagger::load(&path, &Device::Cpu).unwrap();
    assert_eq!(
        loaded.tag_bulk(&sentences, 2).unwrap(),
        tagger.tag_bulk(&sentences, 2).unwrap()
    );
}

fn corpus_loss(tagger: &Tagger, samples: &[Sample]) -> f32 {
    tagger.model().reseed(7);
    let refs: Vec<&Sample> = samples.iter().collect();
    tagger.loss(&refs, false).unwrap().loss.to_scalar::<f32>().unwrap()
}

#[test]
fn test_generating_lemmatizer() {
    let mut config = tiny_config();
    if let Some(lemmatizer) = config.lemmatizer.as_mut() {
        lemmatizer.mode = LemmaMode::Generate;
        lemmatizer.teacher_forcing = 0.5;
    }
    let (preprocessor, samples) = fitted(&config, &corpus());
    assert!(preprocessor.rules().is_none());
    let tagger = Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu).unwrap();
    tagger.model().reseed(1);

    let before = corpus_loss(&tagger, &samples);
    assert_eq!(corpus_loss(&tagger, &samples), before);
    train(&tagger, samples.clone(), train_config());
    let after = corpus_loss(&tagger, &samples);
    assert!(after.is_finite());
    assert!(after < before, "loss {} -> {}", before, after);

    let annotations = tagger.annotate(&["Hún", "sefur", "."]).unwrap();
    assert_eq!(annotations.len(), 3);
    for annotation in &annotations {
        let lemma = annotation.lemma.as_ref().unwrap();
        assert!(lemma.lemma.chars().count() <= 12);
        assert_eq!(lemma.truncated, lemma.lemma.chars().count() == 12);
    }

    let sentences: Vec<Vec<&str>> = vec![
        vec!["Hún", "sefur", "."],
        vec!["Hundurinn", "er", "góður", "og", "gamall", "."],
        vec!["Nei"],
    ];
    let together = tagger.annotate_bulk(&sentences, 3).unwrap();
    assert_eq!(tagger.annotate_bulk(&sentences, 1).unwrap(), together);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("generate.safetensors");
    tagger.save(&path).unwrap();
    let loaded = Tagger::load(&path, &Device::Cpu).unwrap();
    assert_eq!(loaded.config(), tagger.config());
    assert_eq!(loaded.annotate_bulk(&sentences, 2).unwrap(), together);
}

#[test]
fn test_char_cnn_batch_invariance() {
    let mut config = tiny_config();
    if let Some(chars) = config.chars.as_mut() {
        chars.encoder = CharEncoderKind::Cnn { window: 3 };
    }
    let tagger = tagger_with(config);
    let sentences: Vec<Vec<&str>> = vec![
        vec!["Hún", "er", "."],
        vec!["Hundurinn", "sefur", "vel", "."],
        vec!["á"],
        vec!["Þetta", "er", "setning", "."],
    ];
    let one_by_one = tagger.annotate_bulk(&sentences, 1).unwrap();
    assert_eq!(tagger.annotate_bulk(&sentences, 4).unwrap(), one_by_one);
    assert_eq!(tagger.annotate_bulk(&sentences, 3).unwrap(), one_by_one);
}

#[test]
fn test_bypassed_contextual_needs_another_stream() {
    let mut config = tiny_config();
    config.word_embed_size = None;
    config.chars = None;
    config.lemmatizer = None;
    config.contextual = Some(ContextualConfig {
        dim: 3,
        bypass_encoder: true,
    });
    match config.validate() {
        Err(Error::Config(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    let preprocessor = fitted(&config, &corpus()).0;
    match Tagger::new(config.clone(), preprocessor, &Resources::default(), &Device::Cpu) {
        Err(Error::Config(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a model without encoder input was accepted"),
    }

    // through the encoder, contextual vectors alone are enough
    config.contextual = Some(ContextualConfig {
        dim: 3,
        bypass_encoder: false,
    });
    assert!(config.validate().is_ok());
}

#[test]
fn test_tagger_needs_tags() {
    let untagged: Vec<Sentence> = corpus()
        .iter()
        .map(|s| {
            Sentence::from_tokens(
                s.iter()
                    .map(|t| Token::new(t.form(), None::<&str>, t.lemma()))
                    .collect(),
            )
        })
        .collect();
    let config = tiny_config();
    let (preprocessor, _) = fitted(&config, &untagged);
    match Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu) {
        Err(Error::Config(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("a tagger without tags was accepted"),
    }

    let mut config = tiny_config();
    config.tagger = None;
    let (preprocessor, _) = fitted(&config, &untagged);
    let lemmatizer = Tagger::new(config, preprocessor, &Resources::default(), &Device::Cpu).unwrap();
    assert_eq!(lemmatizer.lemmatize(&["Hún"], &["fpven"]).unwrap().len(), 1);
}
