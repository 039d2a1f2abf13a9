//! Signing capabilities
//!
//! [`ExternalSignature`] performs the private-key operation without exposing
//! key material. [`PrivateKeySignature`] adapts a P-256 key to it, and
//! [`EphemeralIdentity`] generates throwaway identities.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use std::sync::Arc;

use crate::cert::{pem_blocks, Certificate, CertificateTemplate, OID_ECDSA_SHA256};
use crate::digest::{DigestAlgorithm, ExternalDigest};
use crate::error::{CryptoError, Result};

/// OID for ECDSA with SHA-1: 1.2.840.10045.4.1
const OID_ECDSA_SHA1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x01];
/// OID for ECDSA with SHA-384: 1.2.840.10045.4.3.3
const OID_ECDSA_SHA384: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x03];
/// OID for ECDSA with SHA-512: 1.2.840.10045.4.3.4
const OID_ECDSA_SHA512: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x04];

/// ecdsa-with-SHAx OID for a digest algorithm
pub fn ecdsa_signature_oid(digest: DigestAlgorithm) -> &'static [u8] {
    match digest {
        DigestAlgorithm::Sha1 => OID_ECDSA_SHA1,
        DigestAlgorithm::Sha256 => OID_ECDSA_SHA256,
        DigestAlgorithm::Sha384 => OID_ECDSA_SHA384,
        DigestAlgorithm::Sha512 => OID_ECDSA_SHA512,
    }
}

/// Digest algorithm implied by an ecdsa-with-SHAx OID
pub fn digest_for_ecdsa_oid(oid: &[u8]) -> Option<DigestAlgorithm> {
    [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ]
    .into_iter()
    .find(|alg| ecdsa_signature_oid(*alg) == oid)
}

/// A signing capability that hides the private key
pub trait ExternalSignature: Send + Sync {
    /// Digest applied to the message before signing
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// DER content bytes of the signature algorithm OID
    fn signature_algorithm_oid(&self) -> &'static [u8];

    /// Sign `message`, returning a DER-encoded signature value
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// ECDSA P-256 signature over a digest from an [`ExternalDigest`]
pub struct PrivateKeySignature {
    key: SigningKey,
    digest: DigestAlgorithm,
    hasher: Arc<dyn ExternalDigest>,
}

impl PrivateKeySignature {
    pub fn new(key: SigningKey, digest: DigestAlgorithm, hasher: Arc<dyn ExternalDigest>) -> Self {
        Self {
            key,
            digest,
            hasher,
        }
    }
}

impl ExternalSignature for PrivateKeySignature {
    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn signature_algorithm_oid(&self) -> &'static [u8] {
        ecdsa_signature_oid(self.digest)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let hash = self.hasher.digest(self.digest, &[message])?;
        let signature: Signature = self
            .key
            .sign_prehash(&hash)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// Verify a DER ECDSA signature over `message` hashed with `digest`
pub fn verify_ecdsa(
    key: &VerifyingKey,
    digest: DigestAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(sig) = Signature::from_der(signature) else {
        return false;
    };
    let hash = digest.digest_parts(&[message]);
    key.verify_prehash(&hash, &sig).is_ok()
}

/// Load a P-256 key from a PKCS#8 PEM document
pub fn signing_key_from_pem(pem: &str) -> Result<SigningKey> {
    let der = pem_blocks(pem, "PRIVATE KEY")?
        .into_iter()
        .next()
        .ok_or_else(|| {
            CryptoError::InvalidKey("Unsupported private key format. Use PKCS#8".to_string())
        })?;
    SigningKey::from_pkcs8_der(&der).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// An ephemeral identity for signing documents
pub struct EphemeralIdentity {
    signing_key: SigningKey,
    certificate: Certificate,
}

impl EphemeralIdentity {
    /// Generate a new random key with a self-signed certificate
    pub fn generate(common_name: &str) -> Result<Self> {
        let signing_key = SigningKey::random(&mut rand_core::OsRng);
        let certificate = CertificateTemplate::new(common_name, 1).issue(
            signing_key.verifying_key(),
            None,
            &signing_key,
        )?;

        Ok(Self {
            signing_key,
            certificate,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Uncompressed SEC1 public key
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    pub fn signature(
        &self,
        digest: DigestAlgorithm,
        hasher: Arc<dyn ExternalDigest>,
    ) -> PrivateKeySignature {
        PrivateKeySignature::new(self.signing_key.clone(), digest, hasher)
    }
}
