extern crate abltagger;
extern crate candle_core;
extern crate tempfile;

use std::io::Write;

use abltagger::config::ModelVariant;
use abltagger::dataset::{Batch, Dataset, Load, TsvLoader};
use abltagger::preprocessing::{Preprocessor, Sample, EOS_ID, PAD_ID, UNK_ID};
use abltagger::utils::rand::rng_with_seed;
use candle_core::Device;
use tempfile::NamedTempFile;

static TRAIN: &str = "Þetta\tfahen\tþessi
er\tsfg3en\tvera
setning\tnven\tsetning
.\tpl\t.

Hún\tfpven\thún
sefur\tsfg3en\tsofa
";

static TEST: &str = "Hundurinn\tnkeng\thundur
er\tsfg3en\tvera
";

fn temp_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

fn load() -> (Preprocessor, Dataset<Sample>) {
    let file = temp_file(TRAIN);
    let config = ModelVariant::Small.config();
    let mut loader = TsvLoader::new(Preprocessor::new(&config, 1));
    let dataset = loader.load(file.path()).unwrap();
    (loader.into_preprocessor(), dataset)
}

#[test]
fn test_loader() {
    let train_file = temp_file(TRAIN);
    let test_file = temp_file(TEST);
    let config = ModelVariant::Small.config();
    let mut loader = TsvLoader::new(Preprocessor::new(&config, 1));
    let dataset = loader.load(train_file.path()).unwrap();
    assert!(loader.preprocessor().is_fixed());
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset[0].words.as_ref().unwrap(), &[4, 5, 6, 7]);
    assert_eq!(dataset[1].words.as_ref().unwrap(), &[8, 9]);

    loader.fix();
    let dataset = loader.load(test_file.path()).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset[0].words.as_ref().unwrap(), &[UNK_ID, 5]);
    let words = loader.preprocessor().words().unwrap();
    assert!(!words.contains("Hundurinn"));

    let dataset = loader.load_until(train_file.path(), 1).unwrap();
    assert_eq!(dataset.len(), 1);
}

#[test]
fn test_dataset_batches() {
    let dataset = Dataset::from_items((0..10).collect::<Vec<u32>>());
    let batches: Vec<Vec<&u32>> = dataset.batch(4).collect();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0], vec![&0, &1, &2, &3]);
    assert_eq!(batches[2], vec![&8, &9]);

    let mut rng = rng_with_seed(Some(7));
    let mut seen: Vec<u32> = dataset
        .shuffled_batch(3, &mut rng)
        .flat_map(|batch| batch.into_iter().copied())
        .collect();
    seen.sort();
    assert_eq!(seen, (0..10).collect::<Vec<u32>>());

    let order = |seed| -> Vec<u32> {
        let mut rng = rng_with_seed(Some(seed));
        dataset
            .shuffled_batch(3, &mut rng)
            .flat_map(|batch| batch.into_iter().copied())
            .collect()
    };
    assert_eq!(order(11), order(11));
}

#[test]
fn test_batch() {
    let (preprocessor, dataset) = load();
    let samples: Vec<&Sample> = dataset.iter().collect();
    let batch = Batch::from_samples(&samples, &Device::Cpu).unwrap();

    assert_eq!(batch.batch_size(), 2);
    assert_eq!(batch.lengths, vec![4, 2]);
    assert_eq!(batch.max_len, 4);
    assert_eq!(batch.num_tokens(), 6);
    assert_eq!(
        batch.mask.to_vec2::<f32>().unwrap(),
        vec![vec![1.0, 1.0, 1.0, 1.0], vec![1.0, 1.0, 0.0, 0.0]]
    );
    assert_eq!(batch.positions.to_vec1::<u32>().unwrap(), vec![0, 1, 2, 3, 4, 5]);

    let words = batch.words.as_ref().unwrap().to_vec2::<u32>().unwrap();
    assert_eq!(words[1], vec![8, 9, PAD_ID, PAD_ID]);
    let tags = batch.tags.as_ref().unwrap().to_vec2::<u32>().unwrap();
    assert_eq!(preprocessor.decode_tag(tags[1][0]), Some("fpven"));
    assert_eq!(tags[1][3], PAD_ID);
    assert!(batch.pretrained.is_none());
    assert!(batch.morphlex.is_none());
    assert!(batch.contextual.is_none());
    assert!(batch.rules.is_none());

    // `setning` is the longest form
    assert_eq!(batch.chars.ids.dims(), &[8, 7]);
    assert_eq!(batch.chars.lengths, vec![5, 2, 7, 1, 3, 5, 1, 1]);
    let char_mask = batch.chars.mask.to_vec2::<f32>().unwrap();
    assert_eq!(char_mask[1], vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let char_ids = batch.chars.ids.to_vec2::<u32>().unwrap();
    assert_eq!(char_ids[6], vec![PAD_ID; 7]);

    let lemmas = batch.lemmas.as_ref().unwrap();
    // one row per real token; `setning` plus `EOS`
    assert_eq!(lemmas.targets.dims(), &[6, 8]);
    let targets = lemmas.targets.to_vec2::<u32>().unwrap();
    assert_eq!(targets[1][4], EOS_ID);
    assert_eq!(preprocessor.decode_chars(&targets[1][..4]), "vera");
    assert_eq!(targets[3], vec![targets[3][0], EOS_ID, 0, 0, 0, 0, 0, 0]);
    let target_mask = lemmas.mask.to_vec2::<f32>().unwrap();
    assert_eq!(target_mask[3], vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_batch_split_tokens() {
    let (_, dataset) = load();
    let samples: Vec<&Sample> = dataset.iter().collect();
    let batch = Batch::from_samples(&samples, &Device::Cpu).unwrap();
    let split = batch.split_tokens(vec!["a", "b", "c", "d", "e", "f"]);
    assert_eq!(split, vec![vec!["a", "b", "c", "d"], vec!["e", "f"]]);
    let unpadded = batch.unpad(&[vec![1, 2, 3, 4], vec![5, 6, 0, 0]]);
    assert_eq!(unpadded, vec![vec![1, 2, 3, 4], vec![5, 6]]);
}

#[test]
fn test_batch_contextual() {
    let (_, dataset) = load();
    let samples: Vec<&Sample> = dataset.iter().collect();
    let mut batch = Batch::from_samples(&samples, &Device::Cpu).unwrap();
    let vectors = vec![
        vec![vec![1.0, 1.0]; 4],
        vec![vec![2.0, 2.0], vec![3.0, 3.0]],
    ];
    batch.set_contextual(&vectors, 2).unwrap();
    let contextual = batch.contextual.as_ref().unwrap().to_vec3::<f32>().unwrap();
    assert_eq!(contextual[1][1], vec![3.0, 3.0]);
    assert_eq!(contextual[1][2], vec![0.0, 0.0]);

    let wrong = vec![vec![vec![1.0, 1.0]; 4], vec![vec![2.0, 2.0]]];
    assert!(batch.set_contextual(&wrong, 2).is_err());
}

#[test]
fn test_batch_of_nothing() {
    let samples: Vec<&Sample> = vec![];
    assert!(Batch::from_samples(&samples, &Device::Cpu).is_err());
}
