//! Error types for PDF operations

use pades_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("Invalid PDF structure: {0}")]
    Structure(String),

    #[error("Signature not found: {0}")]
    SignatureNotFound(String),

    #[error("Invalid signature {name}: {reason}")]
    InvalidSignature { name: String, reason: String },

    #[error("Not enough space reserved for the signature: {needed} bytes needed, {available} available")]
    NotEnoughSpace { needed: usize, available: usize },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for PdfError {
    fn from(err: lopdf::Error) -> Self {
        Self::Structure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;
