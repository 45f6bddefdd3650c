extern crate abltagger;
extern crate tempfile;

use std::collections::HashSet;
use std::io::{BufReader, ErrorKind, Write};

use abltagger::io::embedding::{filter_embeddings, load_embeddings, Format};
use abltagger::io::tsv::{self, Writer};
use abltagger::io::{read_known_chars, read_symbols};
use abltagger::lang::{Phrasal, Tokenized};
use abltagger::preprocessing::{NUM_RESERVED, UNK_ID};
use tempfile::NamedTempFile;

static CORPUS: &str = "Þetta\tfahen\tþessi
er\tsfg3en\tvera
setning\tnven\tsetning
.\tpl\t.

Hundurinn\tnkeng\thundur
geltir\tsfg3en\tgelta


Nei
";

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_tsv_read() {
    let file = write_temp(CORPUS);
    let sentences = tsv::read_file(file.path()).unwrap();
    assert_eq!(sentences.len(), 3);
    assert_eq!(sentences[0].len(), 4);
    assert_eq!(sentences[0].forms(), vec!["Þetta", "er", "setning", "."]);
    assert_eq!(
        sentences[0].tags().unwrap(),
        vec!["fahen", "sfg3en", "nven", "pl"]
    );
    assert_eq!(
        sentences[1].lemmas().unwrap(),
        vec!["hundur", "gelta"]
    );
    assert_eq!(sentences[2].forms(), vec!["Nei"]);
    assert!(sentences[2].tags().is_none());
    assert_eq!(sentences[2][0].form(), "Nei");
}

#[test]
fn test_tsv_round_trip() {
    let file = write_temp(CORPUS);
    let sentences = tsv::read_file(file.path()).unwrap();

    let out = NamedTempFile::new().unwrap();
    {
        let mut writer = Writer::create(out.path()).unwrap();
        for sentence in &sentences {
            writer.write_sentence(sentence).unwrap();
        }
        writer.into_inner().flush().unwrap();
    }
    let restored = tsv::read_file(out.path()).unwrap();
    assert_eq!(restored, sentences);
}

#[test]
fn test_tsv_rejects_extra_fields() {
    let file = write_temp("a\tb\tc\td\n");
    let err = tsv::read_file(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn test_tsv_writer_output() {
    let file = write_temp("Nei\tau\tnei\n!\tpl\t!\n");
    let sentences = tsv::read_file(file.path()).unwrap();
    let mut writer = Writer::new(Vec::new());
    writer.write_sentence(&sentences[0]).unwrap();
    let text = String::from_utf8(writer.into_inner()).unwrap();
    assert_eq!(text, "Nei\tau\tnei\n!\tpl\t!\n\n");
}

#[test]
fn test_load_text_embeddings() {
    let file = write_temp("3 2\nhestur 0.5 -0.5\nköttur 1 2\nhestur 9 9\n");
    let embeddings = load_embeddings(file.path(), Format::Text).unwrap();
    assert_eq!(embeddings.dim(), 2);
    assert_eq!(embeddings.len(), NUM_RESERVED + 2);
    assert_eq!(embeddings.lookup("hestur"), &[0.5, -0.5]);
    assert_eq!(embeddings.lookup("köttur"), &[1.0, 2.0]);
    // reserved rows are zero
    assert_eq!(embeddings.lookup("mús"), &[0.0, 0.0]);
    assert_eq!(embeddings.get(UNK_ID), Some(&[0.0f32, 0.0][..]));
}

#[test]
fn test_load_text_embeddings_without_header() {
    let file = write_temp("hestur 0.5 -0.5 1\nköttur 1 2 3\n");
    let embeddings = load_embeddings(file.path(), Format::Text).unwrap();
    assert_eq!(embeddings.dim(), 3);
    assert_eq!(embeddings.vocab().encode("hestur"), NUM_RESERVED as u32);
}

#[test]
fn test_load_embeddings_inconsistent_dim() {
    let file = write_temp("hestur 0.5 -0.5\nköttur 1 2 3\n");
    let err = load_embeddings(file.path(), Format::Text).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn test_load_morphlex() {
    let file = write_temp("hestur;[1,0,0,1]\nhesti;[0,1,0,1]\n");
    let lexicon = load_embeddings(file.path(), Format::Bracketed).unwrap();
    assert_eq!(lexicon.dim(), 4);
    assert_eq!(lexicon.lookup("hesti"), &[0.0, 1.0, 0.0, 1.0]);
    assert_eq!(lexicon.lookup("kýr"), &[0.0; 4]);

    let file = write_temp("hestur;1,0,0,1\n");
    assert!(load_embeddings(file.path(), Format::Bracketed).is_err());
}

#[test]
fn test_load_morphlex_punctuation_entries() {
    let file = write_temp(";;[1,0,1]\nhestur;[0,1,0]\n;-);[0,0,1]\n");
    let lexicon = load_embeddings(file.path(), Format::Bracketed).unwrap();
    assert_eq!(lexicon.len(), NUM_RESERVED + 3);
    assert_eq!(lexicon.lookup(";"), &[1.0, 0.0, 1.0]);
    assert_eq!(lexicon.lookup(";-)"), &[0.0, 0.0, 1.0]);
    assert_eq!(lexicon.lookup("hestur"), &[0.0, 1.0, 0.0]);
    assert!(!lexicon.vocab().contains(""));
}

#[test]
fn test_filter_embeddings() {
    let keep: HashSet<String> = vec!["hestur", ";", "3"].into_iter().map(String::from).collect();

    let text = "3 2\nhestur 0.5 -0.5\nköttur 1 2\n; 0 1\n";
    let mut out = Vec::new();
    let n = filter_embeddings(BufReader::new(text.as_bytes()), &mut out, Format::Text, &keep).unwrap();
    assert_eq!(n, 2);
    assert_eq!(String::from_utf8(out).unwrap(), "hestur 0.5 -0.5\n; 0 1\n");

    let lexicon = ";;[1,0]\nköttur;[0,1]\nhestur;[1,1]\n";
    let mut out = Vec::new();
    let n = filter_embeddings(
        BufReader::new(lexicon.as_bytes()),
        &mut out,
        Format::Bracketed,
        &keep,
    )
    .unwrap();
    assert_eq!(n, 2);
    let filtered = write_temp(&String::from_utf8(out).unwrap());
    let table = load_embeddings(filtered.path(), Format::Bracketed).unwrap();
    assert_eq!(table.len(), NUM_RESERVED + 2);
    assert_eq!(table.lookup(";"), &[1.0, 0.0]);
    assert!(!table.vocab().contains("köttur"));
}

#[test]
fn test_randomize_unknown() {
    let file = write_temp("hestur 0.5 -0.5\n");
    let mut embeddings = load_embeddings(file.path(), Format::Text).unwrap();
    let mut rng = abltagger::utils::rand::rng_with_seed(Some(1));
    embeddings.randomize_unknown(&mut rng, 0.1);
    let unk = embeddings.lookup("mús");
    assert!(unk.iter().all(|v| v.abs() <= 0.1));
    assert!(unk.iter().any(|&v| v != 0.0));
    assert_eq!(embeddings.lookup("hestur"), &[0.5, -0.5]);
}

#[test]
fn test_read_symbols() {
    let file = write_temp("hestur\r\n\nköttur\n;\n");
    assert_eq!(read_symbols(file.path()).unwrap(), vec!["hestur", "köttur", ";"]);
}

#[test]
fn test_read_known_chars() {
    let file = write_temp("a b ð\nÞ xy\n");
    assert_eq!(
        read_known_chars(file.path()).unwrap(),
        vec!['a', 'b', 'ð', 'Þ', 'x', 'y']
    );
}
