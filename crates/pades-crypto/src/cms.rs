//! CMS (Cryptographic Message Syntax) construction and parsing for PAdES
//!
//! Builds CAdES-style SignedData with the signed attributes PAdES baseline
//! signatures require:
//! - content-type
//! - message-digest
//! - signing-certificate-v2 (ESS)
//!
//! The signing time is carried by the PDF signature dictionary (`/M`), not by
//! a signed attribute. An optional unsigned `id-aa-timeStampToken` attribute
//! holds the RFC 3161 token over the signature value.
//!
//! Parsing goes through the `cms` crate.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use x509_cert::der::{Decode, Encode};

use crate::asn1::*;
use crate::cert::{order_chain, Certificate};
use crate::digest::{unsupported_digest_oid, DigestAlgorithm};
use crate::error::{CryptoError, Result};
use crate::keys::{digest_for_ecdsa_oid, verify_ecdsa};

/// OID for id-data (PKCS#7): 1.2.840.113549.1.7.1
pub const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];

/// OID for id-signedData (PKCS#7): 1.2.840.113549.1.7.2
pub const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];

/// OID for content-type attribute: 1.2.840.113549.1.9.3
const OID_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];

/// OID for message-digest attribute: 1.2.840.113549.1.9.4
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

/// OID for id-aa-signingCertificateV2: 1.2.840.113549.1.9.16.2.47
const OID_SIGNING_CERTIFICATE_V2: &[u8] = &[
    0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x02, 0x2F,
];

/// OID for id-smime-aa-timeStampToken: 1.2.840.113549.1.9.16.2.14
pub const OID_TIMESTAMP_TOKEN: &[u8] = &[
    0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x02, 0x0E,
];

/// OID for id-ct-TSTInfo: 1.2.840.113549.1.9.16.1.4
pub const OID_TST_INFO: &[u8] = &[
    0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x01, 0x04,
];

/// Assembles a single-signer SignedData
pub struct CmsBuilder<'a> {
    digest: DigestAlgorithm,
    signer: &'a Certificate,
    certificates: &'a [Certificate],
    content_type: &'a [u8],
    content: Option<&'a [u8]>,
}

impl<'a> CmsBuilder<'a> {
    /// Detached `id-data` signature by `signer`, embedding `certificates`
    pub fn detached(
        digest: DigestAlgorithm,
        signer: &'a Certificate,
        certificates: &'a [Certificate],
    ) -> Self {
        Self {
            digest,
            signer,
            certificates,
            content_type: OID_DATA,
            content: None,
        }
    }

    /// Encapsulate `content` of the given type (e.g. TSTInfo)
    pub fn with_content(mut self, content_type: &'a [u8], content: &'a [u8]) -> Self {
        self.content_type = content_type;
        self.content = Some(content);
        self
    }

    /// DER `SET OF Attribute` to be signed (tag 0x31)
    pub fn signed_attributes(&self, message_digest: &[u8]) -> Result<Vec<u8>> {
        let attrs = vec![
            build_attribute(OID_CONTENT_TYPE, &build_oid(self.content_type)),
            build_attribute(OID_MESSAGE_DIGEST, &build_octet_string(message_digest)),
            build_signing_certificate_v2(self.signer)?,
        ];
        Ok(build_set_of(&attrs))
    }

    /// Produce the ContentInfo. `signed_attrs` must be the exact bytes that
    /// were signed.
    pub fn build(
        &self,
        signed_attrs: &[u8],
        signature_algorithm_oid: &[u8],
        signature: &[u8],
        unsigned_attrs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let signer_info =
            self.build_signer_info(signed_attrs, signature_algorithm_oid, signature, unsigned_attrs)?;

        let mut content = Vec::new();

        // Version 3 whenever the encapsulated content is not id-data
        let version = if self.content_type == OID_DATA { 1 } else { 3 };
        content.extend(build_small_integer(version));

        content.extend(build_set(&build_algorithm_identifier(self.digest.oid())));

        let mut encap = build_oid(self.content_type);
        if let Some(data) = self.content {
            encap.extend(build_context_specific(0, &build_octet_string(data)));
        }
        content.extend(build_sequence(&[&encap]));

        let certs: Vec<Vec<u8>> = self.certificates.iter().map(|c| c.der().to_vec()).collect();
        content.extend(build_context_specific(0, &sorted_concat(&certs)));

        content.extend(build_set(&signer_info));

        let signed_data = build_sequence(&[&content]);
        Ok(build_sequence(&[
            &build_oid(OID_SIGNED_DATA),
            &build_context_specific(0, &signed_data),
        ]))
    }

    fn build_signer_info(
        &self,
        signed_attrs: &[u8],
        signature_algorithm_oid: &[u8],
        signature: &[u8],
        unsigned_attrs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let mut content = Vec::new();

        // Version (1 for issuerAndSerialNumber)
        content.extend(build_integer(&[1]));
        content.extend(build_sequence(&[
            &self.signer.issuer_der()?,
            &build_integer(self.signer.serial_number()),
        ]));
        content.extend(build_algorithm_identifier(self.digest.oid()));

        // Signed attributes, retagged [0] IMPLICIT
        let attrs = read_single(signed_attrs, "signed attributes")?
            .expect_tag(TAG_SET, "signed attributes")?;
        content.extend(build_context_specific(0, attrs.content));

        content.extend(build_algorithm_identifier_no_params(signature_algorithm_oid));
        content.extend(build_octet_string(signature));

        if !unsigned_attrs.is_empty() {
            content.extend(build_context_specific(1, &sorted_concat(unsigned_attrs)));
        }

        Ok(build_sequence(&[&content]))
    }
}

/// Build a single attribute (SEQUENCE of OID and SET of values)
pub fn build_attribute(oid: &[u8], value: &[u8]) -> Vec<u8> {
    let oid_encoded = build_oid(oid);
    let value_set = build_set(value);
    build_sequence(&[&oid_encoded, &value_set])
}

/// ESS signing-certificate-v2
///
/// ```text
/// SigningCertificateV2 ::= SEQUENCE { certs SEQUENCE OF ESSCertIDv2 }
/// ESSCertIDv2 ::= SEQUENCE {
///     hashAlgorithm AlgorithmIdentifier DEFAULT {algorithm id-sha256},
///     certHash Hash,
///     issuerSerial IssuerSerial OPTIONAL
/// }
/// ```
fn build_signing_certificate_v2(certificate: &Certificate) -> Result<Vec<u8>> {
    // SHA-256 is the DEFAULT hashAlgorithm, so it is omitted
    let cert_hash = DigestAlgorithm::Sha256.digest_parts(&[certificate.der()]);
    let hash_value = build_octet_string(&cert_hash);

    let general_names = build_sequence(&[&build_context_specific(4, &certificate.issuer_der()?)]);
    let issuer_serial = build_sequence(&[
        &general_names,
        &build_integer(certificate.serial_number()),
    ]);

    let ess_cert_id = build_sequence(&[&hash_value, &issuer_serial]);
    let certs = build_sequence(&[&ess_cert_id]);
    let signing_cert = build_sequence(&[&certs]);

    Ok(build_attribute(OID_SIGNING_CERTIFICATE_V2, &signing_cert))
}

/// Decoded view of a single-signer SignedData
#[derive(Debug, Clone)]
pub struct SignedDataInfo {
    pub digest_algorithm: DigestAlgorithm,
    pub signature_algorithm_oid: Vec<u8>,
    pub certificates: Vec<Certificate>,
    pub signer: Certificate,
    /// DER `SET OF Attribute`, as signed
    pub signed_attributes: Vec<u8>,
    pub content_type: Vec<u8>,
    pub message_digest: Vec<u8>,
    pub signature: Vec<u8>,
    pub encapsulated_content: Option<Vec<u8>>,
    /// Full ContentInfo of an embedded signature timestamp
    pub timestamp_token: Option<Vec<u8>>,
}

impl SignedDataInfo {
    /// Signer certificate followed by its issuers from the embedded set
    pub fn chain(&self) -> Vec<Certificate> {
        order_chain(&self.signer, &self.certificates)
    }

    /// Check the signature over the signed attributes
    pub fn verify_signature(&self) -> Result<bool> {
        let key = self.signer.verifying_key()?;
        let digest =
            digest_for_ecdsa_oid(&self.signature_algorithm_oid).unwrap_or(self.digest_algorithm);
        Ok(verify_ecdsa(
            &key,
            digest,
            &self.signed_attributes,
            &self.signature,
        ))
    }
}

/// Parse a ContentInfo holding SignedData. Trailing zero padding is ignored.
pub fn parse_signed_data(der: &[u8]) -> Result<SignedDataInfo> {
    let der = &der[..encoded_len(der)?];
    let content_info = ContentInfo::from_der(der)?;
    if content_info.content_type.as_bytes() != OID_SIGNED_DATA {
        return Err(CryptoError::Asn1("ContentInfo is not SignedData".to_string()));
    }
    let signed_data = SignedData::from_der(&content_info.content.to_der()?)?;

    let mut certificates = Vec::new();
    if let Some(set) = &signed_data.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(cert) = choice {
                certificates.push(Certificate::from_der(&cert.to_der()?)?);
            }
        }
    }

    let signer_info = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| CryptoError::Asn1("SignedData has no SignerInfo".to_string()))?;

    let signer = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(sid) => {
            let issuer = sid.issuer.to_der()?;
            let serial = sid.serial_number.as_bytes();
            certificates
                .iter()
                .find(|c| {
                    c.serial_number() == serial
                        && c.issuer_der().ok().as_deref() == Some(&issuer[..])
                })
                .cloned()
        }
        SignerIdentifier::SubjectKeyIdentifier(_) => None,
    }
    .ok_or_else(|| CryptoError::Certificate("signer certificate not embedded".to_string()))?;

    let digest_oid = signer_info.digest_alg.oid.as_bytes();
    let digest_algorithm =
        DigestAlgorithm::from_oid(digest_oid).ok_or_else(|| unsupported_digest_oid(digest_oid))?;

    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| CryptoError::Asn1("SignerInfo has no signed attributes".to_string()))?;

    let mut message_digest = None;
    let mut content_type = None;
    for attr in signed_attrs.iter() {
        let value = attr.values.iter().next();
        if attr.oid.as_bytes() == OID_MESSAGE_DIGEST {
            message_digest = value.map(|v| v.value().to_vec());
        } else if attr.oid.as_bytes() == OID_CONTENT_TYPE {
            content_type = value.map(|v| v.value().to_vec());
        }
    }

    let timestamp_token = match &signer_info.unsigned_attrs {
        Some(attrs) => attrs
            .iter()
            .find(|a| a.oid.as_bytes() == OID_TIMESTAMP_TOKEN)
            .and_then(|a| a.values.iter().next())
            .map(|v| v.to_der())
            .transpose()?,
        None => None,
    };

    Ok(SignedDataInfo {
        digest_algorithm,
        signature_algorithm_oid: signer_info.signature_algorithm.oid.as_bytes().to_vec(),
        certificates,
        signer,
        signed_attributes: signed_attrs.to_der()?,
        content_type: content_type
            .ok_or_else(|| CryptoError::Asn1("missing content-type attribute".to_string()))?,
        message_digest: message_digest
            .ok_or_else(|| CryptoError::Asn1("missing message-digest attribute".to_string()))?,
        signature: signer_info.signature.as_bytes().to_vec(),
        encapsulated_content: signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .map(|any| any.value().to_vec()),
        timestamp_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ProviderDigest;
    use crate::keys::{EphemeralIdentity, ExternalSignature};
    use crate::provider::GeneralProvider;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn sign_detached(identity: &EphemeralIdentity, digest: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
        let hasher = Arc::new(ProviderDigest::new(Arc::new(GeneralProvider)));
        let signer = identity.signature(digest, hasher);
        let certs = vec![identity.certificate().clone()];
        let builder = CmsBuilder::detached(digest, identity.certificate(), &certs);
        let attrs = builder
            .signed_attributes(&digest.digest_parts(&[data]))
            .unwrap();
        let signature = signer.sign(&attrs).unwrap();
        builder
            .build(&attrs, signer.signature_algorithm_oid(), &signature, &[])
            .unwrap()
    }

    #[test]
    fn test_detached_roundtrip() {
        let identity = EphemeralIdentity::generate("CMS Signer").unwrap();
        let cms = sign_detached(&identity, DigestAlgorithm::Sha512, b"document bytes");

        let info = parse_signed_data(&cms).unwrap();
        assert_eq!(info.digest_algorithm, DigestAlgorithm::Sha512);
        assert_eq!(info.signer, *identity.certificate());
        assert_eq!(info.content_type, OID_DATA.to_vec());
        assert_eq!(
            info.message_digest,
            DigestAlgorithm::Sha512.digest_parts(&[b"document bytes"])
        );
        assert!(info.encapsulated_content.is_none());
        assert!(info.timestamp_token.is_none());
        assert!(info.verify_signature().unwrap());
        assert_eq!(info.chain().len(), 1);
    }

    #[test]
    fn test_parse_ignores_zero_padding() {
        let identity = EphemeralIdentity::generate("CMS Signer").unwrap();
        let mut cms = sign_detached(&identity, DigestAlgorithm::Sha256, b"x");
        cms.extend(vec![0u8; 512]);
        assert!(parse_signed_data(&cms).is_ok());
    }

    #[test]
    fn test_signing_certificate_v2_hash() {
        let identity = EphemeralIdentity::generate("CMS Signer").unwrap();
        let attr = build_signing_certificate_v2(identity.certificate()).unwrap();
        let hash = DigestAlgorithm::Sha256.digest_parts(&[identity.certificate().der()]);
        assert!(attr.windows(32).any(|w| w == hash.as_slice()));
    }

    #[test]
    fn test_parse_rejects_non_signed_data() {
        let not_signed = build_sequence(&[
            &build_oid(OID_DATA),
            &build_context_specific(0, &build_null()),
        ]);
        assert!(parse_signed_data(&not_signed).is_err());
    }
}
