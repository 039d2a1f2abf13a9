//! Cryptography for PAdES signing
//!
//! This crate provides the crypto capability provider, certificates, CMS
//! signature containers, and the TSA / OCSP / CRL clients used to build
//! long-term-valid signatures.

pub mod asn1;
pub mod cert;
pub mod cms;
pub mod crl;
pub mod digest;
pub mod error;
pub mod keys;
pub mod ocsp;
pub mod provider;
pub mod tsa;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cert::Certificate;
pub use crl::{CrlClient, CrlClientOnline};
pub use digest::{DigestAlgorithm, ExternalDigest, ProviderDigest};
pub use error::{CryptoError, Result};
pub use keys::{EphemeralIdentity, ExternalSignature, PrivateKeySignature};
pub use ocsp::{OcspClient, OcspClientOnline};
pub use provider::{CryptoProvider, FipsProvider, GeneralProvider, ProviderKind};
pub use tsa::{HttpTsaClient, TsaClient};

// Re-exported so callers can hold keys without depending on p256 directly
pub use p256::ecdsa::SigningKey;
