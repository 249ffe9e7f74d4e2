// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the access-key store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid access key: empty or null")]
    InvalidKey,

    /// Not a failure as far as the scanner is concerned, just a classified outcome.
    #[error("access key already recorded: {0}")]
    AlreadyExists(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed key file {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StoreError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Failures while turning an image or camera frame into decoded symbols.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("no QR code found in the image")]
    NotFound,

    #[error("invalid image: empty or corrupted")]
    EmptyImage,

    #[error("could not load image: {0}")]
    Image(#[from] image::ImageError),

    #[error("camera unavailable: {0}")]
    Device(String),
}

/// Failures while loading the indicator table.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("could not open indicator file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed indicator file: {0}")]
    Csv(#[from] csv::Error),

    #[error("indicator file has no `{0}` column")]
    MissingColumn(&'static str),
}

/// Failures while projecting one indicator row into a numeric series.
#[derive(Error, Debug, PartialEq)]
pub enum SeriesError {
    #[error("no row for locality `{locality}` and variable `{variable}`")]
    NoMatch { locality: String, variable: String },

    #[error("cell `{cell}` for year {year} is not a number")]
    Parse { year: String, cell: String },
}
