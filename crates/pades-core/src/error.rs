//! Error types for the signing orchestrator

use pades_crypto::CryptoError;
use pades_pdf::PdfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PadesError {
    /// Invalid setup: temp directory, missing evidence source
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing revocation evidence or a rejected certificate
    #[error("Security error: {0}")]
    Security(String),

    #[error(transparent)]
    Crypto(CryptoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Request that makes no sense for the given document or settings
    #[error("{0}")]
    Domain(String),

    #[error(transparent)]
    Pdf(PdfError),
}

/// Broad category of a [`PadesError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Security,
    Io,
    Domain,
}

impl PadesError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Security(_) | Self::Crypto(_) => ErrorKind::Security,
            Self::Io(_) => ErrorKind::Io,
            Self::Domain(_) => ErrorKind::Domain,
            Self::Pdf(PdfError::InvalidSignature { .. }) => ErrorKind::Security,
            Self::Pdf(_) => ErrorKind::Domain,
        }
    }
}

impl From<CryptoError> for PadesError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Io(io) => Self::Io(io),
            other => Self::Crypto(other),
        }
    }
}

// I/O and crypto failures surface unchanged whichever layer raised them
impl From<PdfError> for PadesError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::Io(io) => Self::Io(io),
            PdfError::Crypto(crypto) => crypto.into(),
            other => Self::Pdf(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PadesError>;
