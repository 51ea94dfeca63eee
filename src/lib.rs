use std::{
    fs::{File, OpenOptions},
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};

use error::Error;
use threadpool::ThreadPool;

pub use channel::Channel;
pub use cli::CLIParser;
pub use compressor::{is_factor_file, is_image, is_valid, Compressor, InputKind};
pub use error::ErrorKind;
pub use factor_file::{FactorFileFormat, FactorStore, StoredMatrix};
pub use raster::Raster;

pub mod channel;
mod cli;
pub mod compressor;
pub mod error;
pub mod factor_file;
mod logger;
pub mod raster;

pub type Result<T> = std::result::Result<T, error::Error>;

/// How many singular values survive a compression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Truncation {
    /// Keep the singular values strictly greater than the threshold.
    Threshold(f64),
    /// Keep the leading singular values, zero keeps all.
    Rank(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Compress {
        input_file: PathBuf,
        output_file: PathBuf,
        truncation: Truncation,
    },
    Extract {
        input_file: PathBuf,
        output_file: PathBuf,
    },
}

pub struct Arguments {
    operation: Operation,
    number_of_threads: usize,
}

impl Arguments {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn number_of_threads(&self) -> usize {
        self.number_of_threads
    }
}

/// Lower-cased text after the last dot of the file name, so `.PNG` yields
/// `png`.
pub(crate) fn lowercase_extension(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let (_, extension) = file_name.rsplit_once('.')?;
    Some(extension.to_ascii_lowercase())
}

fn open_input_file(file_path: &Path) -> Result<File> {
    File::open(file_path).map_err(|e| {
        let display = file_path.display().to_string();
        if e.kind() == IoErrorKind::NotFound {
            Error::InputFileNotFound(display)
        } else {
            Error::UnableToOpenInputFileForReading(display, e)
        }
    })
}

fn open_output_file(file_path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(file_path)
        .map_err(|e| Error::UnableToOpenOutputFileForWriting(file_path.display().to_string(), e))
}

fn file_size(file_path: &Path) -> Result<u64> {
    let metadata = open_input_file(file_path)?.metadata().map_err(|e| {
        Error::UnableToOpenInputFileForReading(file_path.display().to_string(), e)
    })?;
    Ok(metadata.len())
}

/// Share of bytes saved by `compressed` relative to `original`, negative when
/// the output grew.
pub fn compression_rate(original: &Path, compressed: &Path) -> Result<f64> {
    let original_size = file_size(original)?;
    let compressed_size = file_size(compressed)?;
    if original_size == 0 {
        return Ok(0.0);
    }
    Ok(1.0 - compressed_size as f64 / original_size as f64)
}

pub fn compress(
    input_file: &Path,
    output_file: &Path,
    truncation: Truncation,
    threadpool: &ThreadPool,
) -> Result<()> {
    let compressor = Compressor::open_with(input_file, threadpool)?;
    let raster = match truncation {
        Truncation::Threshold(threshold) => compressor.compose(threshold)?,
        Truncation::Rank(rank) => compressor.compose_rank(rank)?,
    };
    raster.save(output_file)?;
    if is_image(input_file) {
        let rate = compression_rate(input_file, output_file)?;
        log::info!(
            "Compressed '{}' to '{}', compression rate {:.2}%",
            input_file.display(),
            output_file.display(),
            rate * 100.0
        );
    }
    Ok(())
}

pub fn extract(input_file: &Path, output_file: &Path, threadpool: &ThreadPool) -> Result<()> {
    Compressor::open_with(input_file, threadpool)?.save_channels(output_file)
}

pub fn run(arguments: &Arguments) -> Result<()> {
    let threadpool = ThreadPool::new(arguments.number_of_threads.max(1));
    match &arguments.operation {
        Operation::Compress {
            input_file,
            output_file,
            truncation,
        } => compress(input_file, output_file, *truncation, &threadpool),
        Operation::Extract {
            input_file,
            output_file,
        } => extract(input_file, output_file, &threadpool),
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::{compression_rate, lowercase_extension};
    use crate::error::ErrorKind;

    #[test]
    fn take_text_after_last_dot() {
        assert_eq!(lowercase_extension(Path::new("a/b/photo.JPEG")), Some("jpeg".to_owned()));
        assert_eq!(lowercase_extension(Path::new(".PNG")), Some("png".to_owned()));
        assert_eq!(lowercase_extension(Path::new("archive.tar.gz")), Some("gz".to_owned()));
        assert_eq!(lowercase_extension(Path::new("dir.d/README")), None);
        assert_eq!(lowercase_extension(Path::new("trailing.")), Some(String::new()));
    }

    #[test]
    fn compute_compression_rate() {
        let directory = tempfile::tempdir().unwrap();
        let original = directory.path().join("original.bmp");
        let compressed = directory.path().join("compressed.png");
        std::fs::write(&original, [0_u8; 400]).unwrap();
        std::fs::write(&compressed, [0_u8; 100]).unwrap();
        let rate = compression_rate(&original, &compressed).unwrap();
        assert!((rate - 0.75).abs() < 1e-12);
    }

    #[test]
    fn report_missing_file_for_compression_rate() {
        let directory = tempfile::tempdir().unwrap();
        let error = compression_rate(
            &directory.path().join("missing.bmp"),
            &directory.path().join("missing.png"),
        )
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
    }
}
