//! Error types for cryptographic operations

use thiserror::Error;

/// Errors raised by the crypto provider, certificate handling and the
/// TSA / OCSP / CRL clients.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("{0}")]
    UnsupportedInFipsMode(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("ASN.1 error: {0}")]
    Asn1(String),

    #[error("Invalid certificate: {0}")]
    Certificate(String),

    #[error("Timestamp authority error: {0}")]
    Tsa(String),

    #[error("OCSP error: {0}")]
    Ocsp(String),

    #[error("CRL error: {0}")]
    Crl(String),

    #[error("Key wrap error: {0}")]
    KeyWrap(String),

    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("Service responded with an HTTP error (status = {0}, content-type = {1})")]
    HttpStatus(u16, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    pub(crate) fn http(url: &str, err: ureq::Error) -> Self {
        // ureq::Error is large; keep only its description.
        Self::Http {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<x509_cert::der::Error> for CryptoError {
    fn from(err: x509_cert::der::Error) -> Self {
        Self::Asn1(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
