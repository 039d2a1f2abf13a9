//! Crypto capability provider
//!
//! The narrow set of primitives the signing, LTV and MAC code consume.
//! A provider is selected once ([`ProviderKind::build`]) and handed to
//! every component as an `Arc<dyn CryptoProvider>`.
//!
//! Two variants share the same surface:
//! - [`GeneralProvider`]: everything supported
//! - [`FipsProvider`]: rejects HKDF key derivation

use aes::cipher::generic_array::GenericArray;
use aes_kw::KekAes256;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::digest::DynDigest;
use sha2::Sha256;
use std::sync::Arc;

use crate::asn1::{self, TAG_ENUMERATED, TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE};
use crate::digest::DigestAlgorithm;
use crate::error::{CryptoError, Result};

/// OID for id-pkix-ocsp-basic: 1.3.6.1.5.5.7.48.1.1
pub const OID_OCSP_BASIC: &[u8] = &[0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, 0x01];

/// RFC 3394 integrity check block prepended to a wrapped key
const KEY_WRAP_OVERHEAD: usize = 8;

/// Capability surface consumed by the rest of the workspace
pub trait CryptoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_fips(&self) -> bool;

    fn message_digest(&self, algorithm: DigestAlgorithm) -> Result<Box<dyn DynDigest>>;

    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let mut hasher = self.message_digest(algorithm)?;
        hasher.update(data);
        Ok(hasher.finalize().into_vec())
    }

    /// HMAC-SHA-256
    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Mac::update(&mut mac, data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// HKDF-SHA-256 (RFC 5869) extract-then-expand
    fn hkdf_sha256(&self, ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>>;

    /// AES key wrap without padding (RFC 3394)
    fn aes_key_wrap(&self, kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        aes_key_wrap(kek, key)
    }

    fn aes_key_unwrap(&self, kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
        aes_key_unwrap(kek, wrapped)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        buf
    }

    /// Validate an OCSPResponse and return the embedded BasicOCSPResponse
    fn decode_ocsp_response(&self, der: &[u8]) -> Result<Vec<u8>> {
        basic_response_from_ocsp(der)
    }

    /// Validate a DER CertificateList and return it unchanged
    fn decode_crl(&self, der: &[u8]) -> Result<Vec<u8>> {
        let crl = asn1::read_single(der, "CertificateList")?.expect_tag(TAG_SEQUENCE, "CRL")?;
        let parts = crl.children()?;
        if parts.len() != 3 || parts[0].tag != TAG_SEQUENCE {
            return Err(CryptoError::Crl("malformed CertificateList".to_string()));
        }
        Ok(der.to_vec())
    }
}

/// General-purpose provider
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralProvider;

impl CryptoProvider for GeneralProvider {
    fn name(&self) -> &'static str {
        "general"
    }

    fn is_fips(&self) -> bool {
        false
    }

    fn message_digest(&self, algorithm: DigestAlgorithm) -> Result<Box<dyn DynDigest>> {
        Ok(algorithm.hasher())
    }

    fn hkdf_sha256(&self, ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
        hkdf_sha256(ikm, salt, info, len)
    }
}

/// FIPS-restricted provider
#[derive(Debug, Default, Clone, Copy)]
pub struct FipsProvider;

impl CryptoProvider for FipsProvider {
    fn name(&self) -> &'static str {
        "fips"
    }

    fn is_fips(&self) -> bool {
        true
    }

    fn message_digest(&self, algorithm: DigestAlgorithm) -> Result<Box<dyn DynDigest>> {
        Ok(algorithm.hasher())
    }

    fn hkdf_sha256(&self, _ikm: &[u8], _salt: &[u8], _info: &[u8], _len: usize) -> Result<Vec<u8>> {
        Err(CryptoError::UnsupportedInFipsMode(
            "HKDF algorithm is not supported in FIPS mode.".to_string(),
        ))
    }
}

/// Provider selection, made once at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    General,
    Fips,
}

impl ProviderKind {
    pub fn build(self) -> Arc<dyn CryptoProvider> {
        match self {
            Self::General => Arc::new(GeneralProvider),
            Self::Fips => Arc::new(FipsProvider),
        }
    }
}

fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::InvalidKey(format!("HKDF output of {} bytes is too long", len)))?;
    Ok(okm)
}

fn key_encryption_key(kek: &[u8]) -> Result<KekAes256> {
    if kek.len() != 32 {
        return Err(CryptoError::KeyWrap(format!(
            "key-encryption key must be 32 bytes, got {}",
            kek.len()
        )));
    }
    Ok(KekAes256::new(GenericArray::from_slice(kek)))
}

fn key_wrap_error(err: aes_kw::Error) -> CryptoError {
    match err {
        aes_kw::Error::IntegrityCheckFailed => {
            CryptoError::KeyWrap("integrity check failed".to_string())
        }
        other => CryptoError::KeyWrap(other.to_string()),
    }
}

fn aes_key_wrap(kek: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() < 16 || key.len() % 8 != 0 {
        return Err(CryptoError::KeyWrap(
            "key to wrap must be a multiple of 8 bytes, at least 16".to_string(),
        ));
    }
    let mut wrapped = vec![0u8; key.len() + KEY_WRAP_OVERHEAD];
    key_encryption_key(kek)?
        .wrap(key, &mut wrapped)
        .map_err(key_wrap_error)?;
    Ok(wrapped)
}

fn aes_key_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(CryptoError::KeyWrap("invalid wrapped key length".to_string()));
    }
    let mut key = vec![0u8; wrapped.len() - KEY_WRAP_OVERHEAD];
    key_encryption_key(kek)?
        .unwrap(wrapped, &mut key)
        .map_err(key_wrap_error)?;
    Ok(key)
}

/// OCSPResponse ::= SEQUENCE { responseStatus ENUMERATED, responseBytes [0] EXPLICIT ... }
fn basic_response_from_ocsp(der: &[u8]) -> Result<Vec<u8>> {
    let response = asn1::read_single(der, "OCSPResponse")?.expect_tag(TAG_SEQUENCE, "OCSPResponse")?;
    let parts = response.children()?;
    let status = parts
        .first()
        .ok_or_else(|| CryptoError::Ocsp("empty OCSPResponse".to_string()))?
        .expect_tag(TAG_ENUMERATED, "responseStatus")?;
    if status.content != [0u8].as_slice() {
        return Err(CryptoError::Ocsp(format!(
            "responder returned status {}",
            status.content.first().copied().unwrap_or(255)
        )));
    }

    let bytes = parts
        .get(1)
        .ok_or_else(|| CryptoError::Ocsp("missing responseBytes".to_string()))?
        .expect_tag(0xA0, "responseBytes")?;
    let bytes = asn1::read_single(bytes.content, "ResponseBytes")?.children()?;
    if bytes.len() != 2 {
        return Err(CryptoError::Ocsp("malformed ResponseBytes".to_string()));
    }
    let oid = bytes[0].expect_tag(TAG_OID, "responseType")?;
    if oid.content != OID_OCSP_BASIC {
        return Err(CryptoError::Ocsp("unsupported response type".to_string()));
    }
    let basic = bytes[1].expect_tag(TAG_OCTET_STRING, "response")?;
    Ok(basic.content.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hkdf_rfc5869_case1() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();
        let okm = GeneralProvider.hkdf_sha256(&ikm, &salt, &info, 42).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn test_key_wrap_rfc3394_256bit_kek() {
        let kek: Vec<u8> = (0x00..=0x1f).collect();
        let key = hex::decode("00112233445566778899AABBCCDDEEFF000102030405060708090A0B0C0D0E0F")
            .unwrap();
        let wrapped = GeneralProvider.aes_key_wrap(&kek, &key).unwrap();
        assert_eq!(
            hex::encode_upper(&wrapped),
            "28C9F404C4B810F4CBCCB35CFB87F8263F5786E2D80ED326CBC7F0E71A99F43BFB988B9B7A02DD21"
        );
        assert_eq!(GeneralProvider.aes_key_unwrap(&kek, &wrapped).unwrap(), key);
    }

    #[test]
    fn test_key_unwrap_detects_tampering() {
        let kek = [7u8; 32];
        let mut wrapped = GeneralProvider.aes_key_wrap(&kek, &[1u8; 32]).unwrap();
        wrapped[10] ^= 0x01;
        let err = GeneralProvider.aes_key_unwrap(&kek, &wrapped).unwrap_err();
        assert_eq!(err.to_string(), CryptoError::KeyWrap("integrity check failed".to_string()).to_string());
    }

    #[test]
    fn test_key_wrap_rejects_bad_lengths() {
        assert!(GeneralProvider.aes_key_wrap(&[0u8; 16], &[1u8; 32]).is_err());
        assert!(GeneralProvider.aes_key_wrap(&[0u8; 32], &[1u8; 12]).is_err());
        assert!(GeneralProvider.aes_key_unwrap(&[0u8; 32], &[1u8; 20]).is_err());
    }

    #[test]
    fn test_hkdf_output_length_limit() {
        assert_eq!(GeneralProvider.hkdf_sha256(b"ikm", b"", b"", 64).unwrap().len(), 64);
        assert!(GeneralProvider.hkdf_sha256(b"ikm", b"salt", b"", 255 * 32 + 1).is_err());
    }

    #[test]
    fn test_fips_rejects_hkdf() {
        let err = FipsProvider.hkdf_sha256(b"k", b"s", b"i", 32).unwrap_err();
        assert_eq!(err.to_string(), "HKDF algorithm is not supported in FIPS mode.");
    }

    #[test]
    fn test_fips_keeps_other_capabilities() {
        let provider = ProviderKind::Fips.build();
        assert!(provider.is_fips());
        assert_eq!(provider.digest(DigestAlgorithm::Sha256, b"abc").unwrap().len(), 32);
        assert_eq!(provider.hmac_sha256(b"key", b"data").unwrap().len(), 32);
    }

    #[test]
    fn test_ocsp_status_not_successful() {
        // OCSPResponse { responseStatus = tryLater(3) }
        let der = asn1::build_sequence(&[&asn1::build_enumerated(3)]);
        assert!(GeneralProvider.decode_ocsp_response(&der).is_err());
    }
}
