use std::fmt::Display;

/// Coarse classification of every [`Error`], for callers that only need to
/// tell bad input apart from failed writes and inconsistent factor data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Io,
    MalformedFactorData,
}

#[derive(Debug)]
pub enum Error {
    UnrecognizedFileExtension(String),
    InputFileNotFound(String),
    UnableToOpenInputFileForReading(String, std::io::Error),
    UnableToOpenOutputFileForWriting(String, std::io::Error),
    NoCodecForImageFormat(String),
    NoCodecForOutputFormat(String),
    UnableToDecodeImage(String, image::ImageError),
    UnableToEncodeImage(String, image::ImageError),
    FailedToWriteImage(String, std::io::Error),
    EmptyImage(String),
    UnableToParseFactorFile(String, String),
    UnableToWriteFactorFile(String, String),
    NoChannelsInFactorFile(String),
    MissingFactor(String),
    InconsistentMatrixSize(String, usize, usize, usize),
    FactorIsNotAVector(String, usize, usize),
    MismatchOfFactorShapes {
        u: (usize, usize),
        w: usize,
        vt: (usize, usize),
    },
    MismatchOfPlaneShapes((usize, usize), (usize, usize)),
    UnsupportedPlaneCount(usize),
    ImageTooLarge(usize, usize),
    RankOutOfRange(usize, usize),
    DecompositionDidNotConverge,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnrecognizedFileExtension(_)
            | Self::InputFileNotFound(_)
            | Self::UnableToOpenInputFileForReading(..)
            | Self::NoCodecForImageFormat(_)
            | Self::UnableToDecodeImage(..)
            | Self::EmptyImage(_)
            | Self::UnableToParseFactorFile(..)
            | Self::NoChannelsInFactorFile(_)
            | Self::RankOutOfRange(..)
            | Self::DecompositionDidNotConverge => ErrorKind::InvalidInput,
            Self::UnableToOpenOutputFileForWriting(..)
            | Self::NoCodecForOutputFormat(_)
            | Self::UnableToEncodeImage(..)
            | Self::FailedToWriteImage(..)
            | Self::UnableToWriteFactorFile(..) => ErrorKind::Io,
            Self::MissingFactor(_)
            | Self::InconsistentMatrixSize(..)
            | Self::FactorIsNotAVector(..)
            | Self::MismatchOfFactorShapes { .. }
            | Self::MismatchOfPlaneShapes(..)
            | Self::UnsupportedPlaneCount(_)
            | Self::ImageTooLarge(..) => ErrorKind::MalformedFactorData,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnrecognizedFileExtension(path) => {
                write!(f, "File '{}' has neither an image nor a factor file extension", path)
            }
            Self::InputFileNotFound(path) => {
                write!(f, "Input file '{}' not found", path)
            }
            Self::UnableToOpenInputFileForReading(path, error) => {
                write!(
                    f,
                    "Unable to open input file '{}' for reading: {}",
                    path, error
                )
            }
            Self::UnableToOpenOutputFileForWriting(path, error) => {
                write!(
                    f,
                    "Unable to open output file '{}' for writing: {}",
                    path, error
                )
            }
            Self::NoCodecForImageFormat(path) => {
                write!(f, "No image codec available for '{}'", path)
            }
            Self::NoCodecForOutputFormat(path) => {
                write!(f, "No image codec available to write '{}'", path)
            }
            Self::UnableToDecodeImage(path, error) => {
                write!(f, "Unable to decode image '{}': {}", path, error)
            }
            Self::UnableToEncodeImage(path, error) => {
                write!(f, "Unable to encode image '{}': {}", path, error)
            }
            Self::FailedToWriteImage(path, error) => {
                write!(f, "Failed to write image '{}': {}", path, error)
            }
            Self::EmptyImage(path) => write!(f, "Image '{}' contains no pixels", path),
            Self::UnableToParseFactorFile(path, reason) => {
                write!(f, "Unable to parse factor file '{}': {}", path, reason)
            }
            Self::UnableToWriteFactorFile(path, reason) => {
                write!(f, "Unable to write factor file '{}': {}", path, reason)
            }
            Self::NoChannelsInFactorFile(path) => {
                write!(f, "Factor file '{}' does not contain any channel", path)
            }
            Self::MissingFactor(key) => {
                write!(f, "Factor '{}' is missing from the factor file", key)
            }
            Self::InconsistentMatrixSize(key, rows, cols, len) => {
                write!(
                    f,
                    "Factor '{}' declares {}x{} values but holds {}",
                    key, rows, cols, len
                )
            }
            Self::FactorIsNotAVector(key, rows, cols) => {
                write!(f, "Factor '{}' must be a vector, but is {}x{}", key, rows, cols)
            }
            Self::MismatchOfFactorShapes { u, w, vt } => {
                write!(
                    f,
                    "Factor shapes do not fit together: U is {}x{}, W has {} values, Vt is {}x{}",
                    u.0, u.1, w, vt.0, vt.1
                )
            }
            Self::MismatchOfPlaneShapes(expected, actual) => {
                write!(
                    f,
                    "Plane of size {}x{} does not match the image size of {}x{}",
                    actual.0, actual.1, expected.0, expected.1
                )
            }
            Self::UnsupportedPlaneCount(count) => {
                write!(f, "Images with {} planes can not be stored", count)
            }
            Self::ImageTooLarge(rows, cols) => {
                write!(f, "Image of {}x{} pixels exceeds the supported size", cols, rows)
            }
            Self::RankOutOfRange(rank, available) => {
                write!(
                    f,
                    "Cannot keep {} singular values, only {} are available",
                    rank, available
                )
            }
            Self::DecompositionDidNotConverge => {
                write!(f, "Singular value decomposition did not converge")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UnableToOpenInputFileForReading(_, error)
            | Self::UnableToOpenOutputFileForWriting(_, error)
            | Self::FailedToWriteImage(_, error) => Some(error),
            Self::UnableToDecodeImage(_, error) | Self::UnableToEncodeImage(_, error) => Some(error),
            _ => None,
        }
    }
}
