//! Digest algorithms and the pluggable message-digest seam

use sha2::digest::DynDigest;
use std::fmt;
use std::sync::Arc;

use crate::error::{CryptoError, Result};
use crate::provider::CryptoProvider;

/// OID for SHA-1: 1.3.14.3.2.26
pub const OID_SHA1: &[u8] = &[0x2B, 0x0E, 0x03, 0x02, 0x1A];

/// OID for SHA-256: 2.16.840.1.101.3.4.2.1
pub const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// OID for SHA-384: 2.16.840.1.101.3.4.2.2
pub const OID_SHA384: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];

/// OID for SHA-512: 2.16.840.1.101.3.4.2.3
pub const OID_SHA512: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

/// Hash algorithms understood by the signing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Digest used by the private-key convenience overloads
    pub const DEFAULT: DigestAlgorithm = DigestAlgorithm::Sha512;

    /// DER content bytes of the algorithm OID
    pub fn oid(&self) -> &'static [u8] {
        match self {
            Self::Sha1 => OID_SHA1,
            Self::Sha256 => OID_SHA256,
            Self::Sha384 => OID_SHA384,
            Self::Sha512 => OID_SHA512,
        }
    }

    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == oid)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Parse names such as `SHA512`, `sha-256`
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "SHA1" => Some(Self::Sha1),
            "SHA256" => Some(Self::Sha256),
            "SHA384" => Some(Self::Sha384),
            "SHA512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Fresh incremental hasher for this algorithm
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha384 => Box::new(sha2::Sha384::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }

    /// One-shot digest over several byte slices
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut hasher = self.hasher();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into_vec()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supplies message digests to the signing pipeline.
///
/// Overridable so callers can route hashing through their own provider.
pub trait ExternalDigest: Send + Sync {
    fn message_digest(&self, algorithm: DigestAlgorithm) -> Result<Box<dyn DynDigest>>;

    fn digest(&self, algorithm: DigestAlgorithm, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut hasher = self.message_digest(algorithm)?;
        for part in parts {
            hasher.update(part);
        }
        Ok(hasher.finalize().into_vec())
    }
}

/// Default digest backed by the active crypto provider
pub struct ProviderDigest {
    provider: Arc<dyn CryptoProvider>,
}

impl ProviderDigest {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ExternalDigest for ProviderDigest {
    fn message_digest(&self, algorithm: DigestAlgorithm) -> Result<Box<dyn DynDigest>> {
        self.provider.message_digest(algorithm)
    }
}

pub(crate) fn unsupported_digest_oid(oid: &[u8]) -> CryptoError {
    CryptoError::UnsupportedAlgorithm(format!("digest OID {}", hex::encode(oid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GeneralProvider;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_oid_roundtrip() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_oid(alg.oid()), Some(alg));
            assert_eq!(alg.digest_parts(&[b"abc"]).len(), alg.output_len());
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(DigestAlgorithm::from_name("sha-512"), Some(DigestAlgorithm::Sha512));
        assert_eq!(DigestAlgorithm::from_name("SHA256"), Some(DigestAlgorithm::Sha256));
        assert_eq!(DigestAlgorithm::from_name("MD5"), None);
    }

    #[test]
    fn test_default_is_sha512() {
        assert_eq!(DigestAlgorithm::DEFAULT, DigestAlgorithm::Sha512);
    }

    #[test]
    fn test_parts_match_single_buffer() {
        let digest = ProviderDigest::new(Arc::new(GeneralProvider));
        let split = digest
            .digest(DigestAlgorithm::Sha256, &[b"hello ", b"world"])
            .unwrap();
        let whole = DigestAlgorithm::Sha256.digest_parts(&[b"hello world"]);
        assert_eq!(split, whole);
    }
}
