// src/scan/mod.rs

pub mod camera;
pub mod decode;

use std::{fmt, path::Path};
use tracing::{error, info, instrument, warn};

use crate::error::{ScanError, StoreError};
use crate::keys::{extract_access_key, KeyStore};
use decode::{Frame, Point, SymbolDecoder};

pub use camera::{Camera, DirectoryCamera, FrameGrabber, IterationReport, ScanLoop, ScanState};
pub use decode::{QrDecoder, Symbol};

/// What happened to one decoded symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A new key was extracted and written.
    Saved(String),
    /// Nothing new to write: either the key is already recorded or no key could be extracted.
    Duplicate(Option<String>),
    /// The symbol payload is not valid UTF-8.
    DecodeTextInvalid,
    /// A key was extracted but the store refused or failed to write it.
    Failed { key: String, reason: String },
}

impl ScanOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, ScanOutcome::Saved(_))
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Saved(key) => write!(f, "New access key saved: {}", key),
            ScanOutcome::Duplicate(Some(key)) => write!(f, "Duplicate detected: {}", key),
            ScanOutcome::Duplicate(None) => f.write_str("Duplicate detected: no key in QR data"),
            ScanOutcome::DecodeTextInvalid => f.write_str("Could not decode QR code data"),
            ScanOutcome::Failed { key, reason } => {
                write!(f, "Error saving access key {}: {}", key, reason)
            }
        }
    }
}

/// Outcome for one symbol together with where it sits in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolScan {
    pub outline: Vec<Point>,
    pub outcome: ScanOutcome,
}

/// Explicit per-session context: the key store plus the decoder feeding it.
pub struct ScanSession<D: SymbolDecoder> {
    store: KeyStore,
    decoder: D,
}

impl<D: SymbolDecoder> ScanSession<D> {
    pub fn new(store: KeyStore, decoder: D) -> Self {
        Self { store, decoder }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut KeyStore {
        &mut self.store
    }

    pub fn into_store(self) -> KeyStore {
        self.store
    }

    /// Extract a key from the raw bytes of one symbol and record it if new.
    pub fn handle_decoded_bytes(&mut self, data: &[u8]) -> ScanOutcome {
        match std::str::from_utf8(data) {
            Ok(text) => self.handle_decoded_text(text),
            Err(_) => {
                error!("Could not decode QR code data");
                ScanOutcome::DecodeTextInvalid
            }
        }
    }

    /// Extract a key from decoded text and record it if new.
    pub fn handle_decoded_text(&mut self, text: &str) -> ScanOutcome {
        let key = match extract_access_key(text) {
            Some(k) if !self.store.contains(&k) => k,
            other => {
                warn!(key = ?other, "duplicate detected");
                return ScanOutcome::Duplicate(other);
            }
        };

        match self.store.append(&key) {
            Ok(record) => ScanOutcome::Saved(record.access_key),
            Err(StoreError::AlreadyExists(k)) => ScanOutcome::Duplicate(Some(k)),
            Err(e) => {
                error!("Error saving access key: {}", e);
                ScanOutcome::Failed {
                    key,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Decode every symbol in `frame` and handle each one. An empty result is not an error here.
    pub fn scan_frame(&mut self, frame: &Frame) -> Vec<SymbolScan> {
        self.decoder
            .decode(frame)
            .into_iter()
            .map(|symbol| SymbolScan {
                outline: symbol.outline(),
                outcome: self.handle_decoded_bytes(&symbol.data),
            })
            .collect()
    }

    /// Upload flow: the image must be non-empty and hold at least one symbol.
    pub fn scan_image(&mut self, frame: &Frame) -> Result<Vec<SymbolScan>, ScanError> {
        if frame.is_empty() {
            return Err(ScanError::EmptyImage);
        }
        let scans = self.scan_frame(frame);
        if scans.is_empty() {
            return Err(ScanError::NotFound);
        }
        Ok(scans)
    }

    #[instrument(level = "info", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn scan_image_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<SymbolScan>, ScanError> {
        let frame = Frame::open(path.as_ref())?;
        let scans = self.scan_image(&frame)?;
        info!(
            symbols = scans.len(),
            saved = scans.iter().filter(|s| s.outcome.is_saved()).count(),
            "image processed"
        );
        Ok(scans)
    }
}
