use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::{lowercase_extension, open_input_file, open_output_file, Result};

pub mod binary;
pub mod json;
pub mod xml;
pub mod yaml;

pub const CHANNEL_COUNT_KEY: &str = "channels";

type CodecResult<T> = std::result::Result<T, String>;

/// A container format able to carry a [`FactorStore`].
pub trait FactorCodec {
    fn decode<R: BufRead>(&self, source: R) -> CodecResult<FactorStore>;
    fn encode<W: Write>(&self, store: &FactorStore, sink: W) -> CodecResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactorFileFormat {
    Json,
    Yaml,
    Xml,
    Binary,
}

impl FactorFileFormat {
    pub const EXTENSIONS: [&'static str; 4] = ["json", "yaml", "xml", "bin"];

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" => Some(Self::Yaml),
            "xml" => Some(Self::Xml),
            "bin" => Some(Self::Binary),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        lowercase_extension(path).and_then(|extension| Self::from_extension(&extension))
    }

    fn decode<R: BufRead>(&self, source: R) -> CodecResult<FactorStore> {
        match self {
            Self::Json => json::JsonCodec.decode(source),
            Self::Yaml => yaml::YamlCodec.decode(source),
            Self::Xml => xml::XmlCodec.decode(source),
            Self::Binary => binary::BinaryCodec.decode(source),
        }
    }

    fn encode<W: Write>(&self, store: &FactorStore, sink: W) -> CodecResult<()> {
        match self {
            Self::Json => json::JsonCodec.encode(store, sink),
            Self::Yaml => yaml::YamlCodec.encode(store, sink),
            Self::Xml => xml::XmlCodec.encode(store, sink),
            Self::Binary => binary::BinaryCodec.encode(store, sink),
        }
    }
}

/// Dense matrix in row-major order, the on-disk shape of every factor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl StoredMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        Self { rows, cols, data }
    }

    pub fn from_matrix(matrix: &DMatrix<f64>) -> Self {
        let (rows, cols) = matrix.shape();
        // column-major storage of the transpose is the row-major order of the matrix
        let data = matrix.transpose().as_slice().to_vec();
        Self { rows, cols, data }
    }

    pub fn from_vector(vector: &DVector<f64>) -> Self {
        Self {
            rows: vector.len(),
            cols: 1,
            data: vector.as_slice().to_vec(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// True when the matrix has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn check_size(&self, key: &str) -> Result<()> {
        match self.rows.checked_mul(self.cols) {
            Some(len) if len == self.data.len() => Ok(()),
            _ => Err(Error::InconsistentMatrixSize(
                key.to_owned(),
                self.rows,
                self.cols,
                self.data.len(),
            )),
        }
    }

    pub fn to_matrix(&self, key: &str) -> Result<DMatrix<f64>> {
        self.check_size(key)?;
        Ok(DMatrix::from_row_slice(self.rows, self.cols, &self.data))
    }

    /// Accepts both column (`r×1`) and row (`1×r`) vectors.
    pub fn to_vector(&self, key: &str) -> Result<DVector<f64>> {
        self.check_size(key)?;
        if self.rows > 1 && self.cols > 1 {
            return Err(Error::FactorIsNotAVector(key.to_owned(), self.rows, self.cols));
        }
        Ok(DVector::from_column_slice(&self.data))
    }
}

/// Ordered key-value store of factor matrices, plus the number of channels it
/// describes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FactorStore {
    channel_count: Option<usize>,
    entries: Vec<(String, StoredMatrix)>,
}

impl FactorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_count(&self) -> Option<usize> {
        self.channel_count
    }

    pub fn set_channel_count(&mut self, count: usize) {
        self.channel_count = Some(count);
    }

    pub fn insert(&mut self, key: impl Into<String>, matrix: StoredMatrix) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = matrix,
            None => self.entries.push((key, matrix)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&StoredMatrix> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, matrix)| matrix)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &StoredMatrix)> {
        self.entries
            .iter()
            .map(|(key, matrix)| (key.as_str(), matrix))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn read(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let format = FactorFileFormat::from_path(path)
            .ok_or_else(|| Error::UnrecognizedFileExtension(display.clone()))?;
        let file = open_input_file(path)?;
        let store = format
            .decode(BufReader::new(file))
            .map_err(|reason| Error::UnableToParseFactorFile(display.clone(), reason))?;
        log::info!("Read {} factor matrices from '{}'", store.len(), display);
        Ok(store)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let display = path.display().to_string();
        let format = FactorFileFormat::from_path(path)
            .ok_or_else(|| Error::UnrecognizedFileExtension(display.clone()))?;
        let file = open_output_file(path)?;
        let mut sink = BufWriter::new(file);
        format
            .encode(self, &mut sink)
            .and_then(|_| sink.flush().map_err(|e| e.to_string()))
            .map_err(|reason| Error::UnableToWriteFactorFile(display.clone(), reason))?;
        log::info!("Wrote {} factor matrices to '{}'", self.len(), display);
        Ok(())
    }
}

impl Serialize for FactorStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let count_entries = usize::from(self.channel_count.is_some());
        let mut map = serializer.serialize_map(Some(self.entries.len() + count_entries))?;
        if let Some(count) = self.channel_count {
            map.serialize_entry(CHANNEL_COUNT_KEY, &count)?;
        }
        for (key, matrix) in &self.entries {
            map.serialize_entry(key, matrix)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FactorStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FactorStoreVisitor)
    }
}

struct FactorStoreVisitor;

impl<'de> Visitor<'de> for FactorStoreVisitor {
    type Value = FactorStore;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map of factor matrices")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<FactorStore, A::Error> {
        let mut store = FactorStore::new();
        while let Some(key) = access.next_key::<String>()? {
            if key == CHANNEL_COUNT_KEY {
                store.set_channel_count(access.next_value()?);
            } else {
                let matrix = access.next_value::<StoredMatrix>()?;
                store.insert(key, matrix);
            }
        }
        Ok(store)
    }
}
