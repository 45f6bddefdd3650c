use std::fs::File;
use std::io as std_io;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub enum Format {
    Json,
    JsonPretty,
}

pub fn serialize<T: Serialize>(data: &T, format: Format) -> std_io::Result<Vec<u8>> {
    let result = match format {
        Format::Json => serde_json::to_vec(data),
        Format::JsonPretty => serde_json::to_vec_pretty(data),
    };
    result.map_err(|e| std_io::Error::new(std_io::ErrorKind::InvalidData, e))
}

pub fn deserialize<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> std_io::Result<T> {
    serde_json::from_slice(bytes).map_err(|e| std_io::Error::new(std_io::ErrorKind::InvalidData, e))
}

pub fn write_file<T: Serialize, P: AsRef<Path>>(
    path: P,
    data: &T,
    format: Format,
) -> std_io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&serialize(data, format)?)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

pub fn read_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> std_io::Result<T> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| std_io::Error::new(std_io::ErrorKind::InvalidData, e))
}
