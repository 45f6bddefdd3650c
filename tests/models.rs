extern crate abltagger;
extern crate candle_core;
extern crate candle_nn;

use abltagger::config::{LemmaMode, LemmatizerConfig, ModelVariant};
use abltagger::dataset::{Batch, CharBatch};
use abltagger::io::checkpoint::set_param;
use abltagger::lang::{Phrasal, Sentence, Token};
use abltagger::models::nlp::{CharCNN, LemmaDecoder, Morphlex, RawLemma, CRF};
use abltagger::models::{BiLSTM, Conv1D, Embed};
use abltagger::preprocessing::{EditRule, Preprocess, Preprocessor, Sample, EOS_ID, UNK_ID};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

fn var_builder(varmap: &VarMap) -> VarBuilder<'_> {
    VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu)
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    (a - b)
        .unwrap()
        .abs()
        .unwrap()
        .flatten_all()
        .unwrap()
        .max(0)
        .unwrap()
        .to_scalar::<f32>()
        .unwrap()
}

#[test]
fn test_bilstm_padding() {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let bilstm = BiLSTM::new(var_builder(&varmap).pp("bilstm"), 2, 3, 4, 0.0).unwrap();
    assert_eq!(bilstm.out_size(), 8);

    let xs = Tensor::randn(0f32, 1.0, (2, 5, 3), &dev).unwrap();
    let mask = Tensor::new(
        &[[1f32, 1., 1., 1., 1.], [1., 1., 1., 0., 0.]],
        &dev,
    )
    .unwrap();
    let out = bilstm.forward(&xs, &mask, false).unwrap();
    assert_eq!(out.outputs.dims(), &[2, 5, 8]);
    assert_eq!(out.last.dims(), &[2, 8]);

    // zero at padded positions
    let padded = out.outputs.narrow(0, 1, 1).unwrap().narrow(1, 3, 2).unwrap();
    let zeros = padded.zeros_like().unwrap();
    assert_eq!(max_abs_diff(&padded, &zeros), 0.0);

    // real positions do not depend on how much padding follows
    let alone = xs.narrow(0, 1, 1).unwrap().narrow(1, 0, 3).unwrap();
    let alone_mask = Tensor::ones((1, 3), DType::F32, &dev).unwrap();
    let expected = bilstm.forward(&alone, &alone_mask, false).unwrap();
    let actual = out.outputs.narrow(0, 1, 1).unwrap().narrow(1, 0, 3).unwrap();
    assert!(max_abs_diff(&expected.outputs, &actual) < 1e-5);
    let last = out.last.narrow(0, 1, 1).unwrap();
    assert!(max_abs_diff(&expected.last, &last) < 1e-5);
}

#[test]
fn test_conv1d_keeps_length() {
    let varmap = VarMap::new();
    let conv = Conv1D::new(var_builder(&varmap).pp("conv"), 4, 6, 3).unwrap();
    let xs = Tensor::randn(0f32, 1.0, (2, 4, 7), &Device::Cpu).unwrap();
    let ys = conv.forward(&xs).unwrap();
    assert_eq!(ys.dims(), &[2, 6, 7]);
    assert_eq!(conv.out_channels(), 6);
}

#[test]
fn test_char_cnn_ignores_padding() {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let cnn = CharCNN::new(var_builder(&varmap).pp("chars"), 12, 4, 6, 3, 0.0).unwrap();
    assert_eq!(cnn.out_size(), 6);

    let alone = CharBatch {
        ids: Tensor::new(&[[5u32, 6]], &dev).unwrap(),
        mask: Tensor::new(&[[1f32, 1.]], &dev).unwrap(),
        lengths: vec![2],
    };
    let batched = CharBatch {
        ids: Tensor::new(&[[5u32, 6, 0, 0, 0], [7, 8, 9, 10, 11]], &dev).unwrap(),
        mask: Tensor::new(&[[1f32, 1., 0., 0., 0.], [1., 1., 1., 1., 1.]], &dev).unwrap(),
        lengths: vec![2, 5],
    };
    let expected = cnn.forward(&alone, false).unwrap();
    let actual = cnn.forward(&batched, false).unwrap();
    assert_eq!(actual.dims(), &[2, 6]);
    assert!(max_abs_diff(&expected, &actual.narrow(0, 0, 1).unwrap()) < 1e-6);
}

#[test]
fn test_embed() {
    let varmap = VarMap::new();
    let embed = Embed::new(var_builder(&varmap).pp("words"), 10, 5).unwrap();
    assert_eq!(embed.name(), "words.lookup");
    let ids = Tensor::new(&[[1u32, 2, 3], [4, 0, 0]], &Device::Cpu).unwrap();
    let ys = embed.forward(&ids).unwrap();
    assert_eq!(ys.dims(), &[2, 3, 5]);
    assert_eq!(embed.vocab_size(), 10);
    assert_eq!(embed.embed_size(), 5);
}

fn emissions(n: usize, n_tags: usize) -> Vec<Vec<f32>> {
    let t = Tensor::randn(0f32, 1.0, (n, n_tags), &Device::Cpu).unwrap();
    t.to_vec2::<f32>().unwrap()
}

fn all_paths(len: usize, n_tags: usize) -> Vec<Vec<u32>> {
    let mut paths = vec![vec![]];
    for _ in 0..len {
        paths = paths
            .into_iter()
            .flat_map(|p| {
                (0..n_tags as u32).map(move |tag| {
                    let mut next = p.clone();
                    next.push(tag);
                    next
                })
            })
            .collect();
    }
    paths
}

#[test]
fn test_crf_viterbi_matches_brute_force() {
    let varmap = VarMap::new();
    let crf = CRF::new(var_builder(&varmap).pp("crf"), 3).unwrap();
    for len in 1..5 {
        let em = emissions(len, 3);
        let path = crf.viterbi(&em, &[false; 3]).unwrap();
        assert_eq!(path.len(), len);
        let best = all_paths(len, 3)
            .into_iter()
            .map(|p| crf.score_path(&em, &p).unwrap())
            .fold(f32::NEG_INFINITY, f32::max);
        let score = crf.score_path(&em, &path).unwrap();
        assert!((score - best).abs() < 1e-4, "{} vs {}", score, best);
    }
}

#[test]
fn test_crf_viterbi_banned_tags() {
    let varmap = VarMap::new();
    let crf = CRF::new(var_builder(&varmap).pp("crf"), 3).unwrap();
    let mut em = emissions(4, 3);
    for row in em.iter_mut() {
        row[0] = 100.0;
    }
    assert_eq!(crf.viterbi(&em, &[false; 3]).unwrap(), vec![0; 4]);
    let path = crf.viterbi(&em, &[true, false, false]).unwrap();
    assert!(path.iter().all(|&tag| tag != 0));
    assert!(crf.viterbi(&[], &[false; 3]).unwrap().is_empty());
}

#[test]
fn test_crf_nll() {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let crf = CRF::new(var_builder(&varmap).pp("crf"), 3).unwrap();

    // a single sentence against enumeration of every path
    let em = emissions(3, 3);
    let gold = vec![2u32, 0, 1];
    let scores: Vec<f64> = all_paths(3, 3)
        .iter()
        .map(|p| crf.score_path(&em, p).unwrap() as f64)
        .collect();
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_z = max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln();
    let expected = log_z - crf.score_path(&em, &gold).unwrap() as f64;

    let flat: Vec<f32> = em.iter().flatten().copied().collect();
    let emissions = Tensor::from_vec(flat, (1, 3, 3), &dev).unwrap();
    let tags = Tensor::from_vec(gold, (1, 3), &dev).unwrap();
    let mask = Tensor::ones((1, 3), DType::F32, &dev).unwrap();
    let nll = crf
        .nll(&emissions, &tags, &mask, &[3])
        .unwrap()
        .to_scalar::<f32>()
        .unwrap();
    assert!((nll as f64 - expected).abs() < 1e-3, "{} vs {}", nll, expected);

    // padded batch
    let emissions = Tensor::randn(0f32, 1.0, (2, 4, 3), &dev).unwrap();
    let tags = Tensor::new(&[[1u32, 2, 0, 1], [2, 1, 0, 0]], &dev).unwrap();
    let mask = Tensor::new(&[[1f32, 1., 1., 1.], [1., 1., 0., 0.]], &dev).unwrap();
    let nll = crf
        .nll(&emissions, &tags, &mask, &[4, 2])
        .unwrap()
        .to_scalar::<f32>()
        .unwrap();
    assert!(nll.is_finite());
    assert!(nll >= -1e-4);
}

#[test]
fn test_morphlex_unknown_is_zero() {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let morphlex = Morphlex::new(var_builder(&varmap).pp("morphlex"), 6, 4, 3).unwrap();
    let mut table = vec![0f32; 6 * 4];
    table[4 * 4] = 1.0;
    table[4 * 4 + 3] = 1.0;
    table[5 * 4 + 1] = 1.0;
    let table = Tensor::from_vec(table, (6, 4), &dev).unwrap();
    set_param(&varmap, morphlex.table().name(), &table).unwrap();

    let ids = Tensor::new(&[[UNK_ID, 4, 5]], &dev).unwrap();
    let ys = morphlex.forward(&ids).unwrap().to_vec3::<f32>().unwrap();
    assert_eq!(ys[0][0], vec![0.0; 3]);
    assert!(ys[0][1].iter().any(|&v| v != 0.0));
    assert_eq!(morphlex.out_size(), 3);
}

fn lemma_samples(mode: LemmaMode) -> (Preprocessor, Vec<Sample>) {
    let mut config = ModelVariant::Small.config();
    if let Some(lemmatizer) = config.lemmatizer.as_mut() {
        lemmatizer.mode = mode;
    }
    let sentences = vec![
        Sentence::from_tokens(vec![
            Token::new("Hestarnir", Some("nkfng"), Some("hestur")),
            Token::new("hlaupa", Some("sfg3fn"), Some("hlaupa")),
        ]),
        Sentence::from_tokens(vec![Token::new("Já", Some("au"), Some("já"))]),
    ];
    let mut preprocessor = Preprocessor::new(&config, 1);
    preprocessor.fit(sentences.iter());
    preprocessor.fix();
    let samples = preprocessor.transform(sentences.into_iter()).collect();
    (preprocessor, samples)
}

fn lemma_config(mode: LemmaMode, max_length: usize) -> LemmatizerConfig {
    LemmatizerConfig {
        mode,
        char_embed_size: 4,
        hidden_size: 8,
        source_hidden_size: 4,
        tag_embed_size: 3,
        max_length,
        ..LemmatizerConfig::default()
    }
}

/// Makes the output layer of a generator always prefer `winner`.
fn force_output(varmap: &VarMap, n_chars: usize, hidden: usize, winner: u32) {
    let dev = Device::Cpu;
    let weight = Tensor::zeros((n_chars, hidden), DType::F32, &dev).unwrap();
    let mut bias = vec![0f32; n_chars];
    bias[winner as usize] = 10.0;
    let bias = Tensor::from_vec(bias, n_chars, &dev).unwrap();
    set_param(varmap, "lemmatizer.out.weight", &weight).unwrap();
    set_param(varmap, "lemmatizer.out.bias", &bias).unwrap();
}

#[test]
fn test_lemmatizer_inference_truncates() {
    let dev = Device::Cpu;
    let (preprocessor, samples) = lemma_samples(LemmaMode::Generate);
    let refs: Vec<&Sample> = samples.iter().collect();
    let batch = Batch::from_samples(&refs, &dev).unwrap();
    let n_chars = preprocessor.chars().size();
    let n_tags = preprocessor.tags().size();

    let varmap = VarMap::new();
    let config = lemma_config(LemmaMode::Generate, 5);
    let decoder = LemmaDecoder::new(
        var_builder(&varmap).pp("lemmatizer"),
        6,
        n_chars,
        n_tags,
        None,
        &config,
    )
    .unwrap();
    let hs = Tensor::randn(0f32, 1.0, (2, 2, 6), &dev).unwrap();
    let tags = Tensor::full(UNK_ID, 3, &dev).unwrap();

    // never emits `EOS`: every lemma is cut at `max_length`
    force_output(&varmap, n_chars, config.hidden_size, 4);
    let lemmas = decoder.decode(&hs, &batch, &tags).unwrap();
    assert_eq!(lemmas.len(), 3);
    for lemma in &lemmas {
        assert_eq!(
            lemma,
            &RawLemma::Chars {
                ids: vec![4; 5],
                truncated: true
            }
        );
    }
    let prediction = lemmas[0].clone().into_prediction("Hestarnir", &preprocessor);
    assert!(prediction.truncated);
    assert_eq!(prediction.lemma.chars().count(), 5);

    // emits `EOS` first: empty, complete lemmas
    force_output(&varmap, n_chars, config.hidden_size, EOS_ID);
    let lemmas = decoder.decode(&hs, &batch, &tags).unwrap();
    for lemma in &lemmas {
        assert_eq!(
            lemma,
            &RawLemma::Chars {
                ids: vec![],
                truncated: false
            }
        );
    }
}

#[test]
fn test_lemmatizer_teacher_forced_loss() {
    let dev = Device::Cpu;
    let (preprocessor, samples) = lemma_samples(LemmaMode::Generate);
    let refs: Vec<&Sample> = samples.iter().collect();
    let batch = Batch::from_samples(&refs, &dev).unwrap();
    let n_chars = preprocessor.chars().size();

    let varmap = VarMap::new();
    let config = lemma_config(LemmaMode::Generate, 5);
    let decoder = LemmaDecoder::new(
        var_builder(&varmap).pp("lemmatizer"),
        6,
        n_chars,
        preprocessor.tags().size(),
        None,
        &config,
    )
    .unwrap();
    let hs = Tensor::randn(0f32, 1.0, (2, 2, 6), &dev).unwrap();
    let tags = batch
        .tags
        .as_ref()
        .unwrap()
        .flatten_all()
        .unwrap()
        .index_select(&batch.positions, 0)
        .unwrap();

    let first = decoder.loss(&hs, &batch, &tags, true).unwrap();
    let second = decoder.loss(&hs, &batch, &tags, true).unwrap();
    let first_value = first.loss.to_scalar::<f32>().unwrap();
    assert!(first_value.is_finite() && first_value > 0.0);
    // gold characters are always fed, so the loss is deterministic
    assert_eq!(first_value, second.loss.to_scalar::<f32>().unwrap());

    let grads = first.loss.backward().unwrap();
    let data = varmap.data().lock().unwrap();
    let out_weight = data.get("lemmatizer.out.weight").unwrap();
    assert!(grads.get(out_weight.as_tensor()).is_some());
    drop(data);

    // a decoder that stops at once gets no lemma right; the targets are longer
    force_output(&varmap, n_chars, config.hidden_size, EOS_ID);
    let loss = decoder.loss(&hs, &batch, &tags, false).unwrap();
    assert_eq!(loss.correct, 0);
}

#[test]
fn test_lemmatizer_seeded_teacher_forcing() {
    let dev = Device::Cpu;
    let (preprocessor, samples) = lemma_samples(LemmaMode::Generate);
    let refs: Vec<&Sample> = samples.iter().collect();
    let batch = Batch::from_samples(&refs, &dev).unwrap();

    let varmap = VarMap::new();
    let config = LemmatizerConfig {
        teacher_forcing: 0.5,
        ..lemma_config(LemmaMode::Generate, 5)
    };
    let decoder = LemmaDecoder::new(
        var_builder(&varmap).pp("lemmatizer"),
        6,
        preprocessor.chars().size(),
        preprocessor.tags().size(),
        None,
        &config,
    )
    .unwrap();
    let hs = Tensor::randn(0f32, 1.0, (2, 2, 6), &dev).unwrap();
    let tags = Tensor::full(UNK_ID, 3, &dev).unwrap();

    let loss = |seed: u64| {
        decoder.reseed(seed);
        let out = decoder.loss(&hs, &batch, &tags, true).unwrap();
        (out.loss.to_scalar::<f32>().unwrap(), out.correct)
    };
    for seed in 0..4 {
        let first = loss(seed);
        assert!(first.0.is_finite());
        assert_eq!(loss(seed), first);
    }
}

#[test]
fn test_lemmatizer_edit_rules() {
    let dev = Device::Cpu;
    let (preprocessor, samples) = lemma_samples(LemmaMode::EditRule);
    let refs: Vec<&Sample> = samples.iter().collect();
    let batch = Batch::from_samples(&refs, &dev).unwrap();
    let n_rules = preprocessor.rules().unwrap().size();

    let varmap = VarMap::new();
    let config = lemma_config(LemmaMode::EditRule, 5);
    assert!(LemmaDecoder::new(
        var_builder(&varmap).pp("other"),
        6,
        preprocessor.chars().size(),
        preprocessor.tags().size(),
        None,
        &config,
    )
    .is_err());
    let decoder = LemmaDecoder::new(
        var_builder(&varmap).pp("lemmatizer"),
        6,
        preprocessor.chars().size(),
        preprocessor.tags().size(),
        Some(n_rules),
        &config,
    )
    .unwrap();
    assert_eq!(decoder.mode(), LemmaMode::EditRule);

    let hs = Tensor::randn(0f32, 1.0, (2, 2, 6), &dev).unwrap();
    let tags = Tensor::full(UNK_ID, 3, &dev).unwrap();
    let loss = decoder.loss(&hs, &batch, &tags, false).unwrap();
    assert!(loss.loss.to_scalar::<f32>().unwrap() > 0.0);

    // reserved rules are never predicted, even with the highest score
    let rule = EditRule::derive("Hestarnir", "hestur").to_string();
    let target = preprocessor.rules().unwrap().encode(rule.as_str());
    assert_ne!(target, UNK_ID);
    let weight = Tensor::zeros((n_rules, 6 + 3), DType::F32, &dev).unwrap();
    let mut bias = vec![0f32; n_rules];
    bias[UNK_ID as usize] = 100.0;
    bias[target as usize] = 10.0;
    let bias = Tensor::from_vec(bias, n_rules, &dev).unwrap();
    set_param(&varmap, "lemmatizer.rule.weight", &weight).unwrap();
    set_param(&varmap, "lemmatizer.rule.bias", &bias).unwrap();
    let lemmas = decoder.decode(&hs, &batch, &tags).unwrap();
    assert_eq!(lemmas, vec![RawLemma::Rule(target); 3]);
    let prediction = lemmas[0].clone().into_prediction("Hestarnir", &preprocessor);
    assert_eq!(prediction.lemma, "hestur");
    // a rule that cannot apply leaves the form as it is
    let prediction = lemmas[2].clone().into_prediction("Já", &preprocessor);
    assert_eq!(prediction.lemma, "Já");
}
