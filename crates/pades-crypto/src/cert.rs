//! X.509 certificate support
//!
//! Wraps a parsed [`x509_cert::Certificate`] together with its DER bytes and
//! exposes what the signing pipeline needs: issuer/subject matching for chain
//! ordering, the OCSP responder and CRL distribution point URLs, and the
//! P-256 verifying key.
//!
//! [`CertificateTemplate`] issues certificates signed with a P-256 key, used
//! for self-signed identities.

use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::ecdsa::signature::Signer;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{AuthorityInfoAccessSyntax, CrlDistributionPoints};
use x509_cert::spki::ObjectIdentifier;

use crate::asn1::*;
use crate::error::{CryptoError, Result};

/// id-pe-authorityInfoAccess
const OID_AUTHORITY_INFO_ACCESS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.1");

/// id-ce-cRLDistributionPoints
const OID_CRL_DISTRIBUTION_POINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.31");

/// id-ad-ocsp
const OID_AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

/// OID for ECDSA with SHA-256: 1.2.840.10045.4.3.2
pub const OID_ECDSA_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];

/// DER bytes of the same OIDs, for building extensions
const DER_OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1D, 0x13];
const DER_OID_CRL_DISTRIBUTION_POINTS: &[u8] = &[0x55, 0x1D, 0x1F];
const DER_OID_AUTHORITY_INFO_ACCESS: &[u8] = &[0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x01, 0x01];
const DER_OID_AD_OCSP: &[u8] = &[0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01];

/// A parsed X.509 certificate and its original encoding
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    inner: x509_cert::Certificate,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject_name())
            .field("serial", &hex::encode(self.serial_number()))
            .finish()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| CryptoError::Certificate(e.to_string()))?;
        Ok(Self {
            der: der.to_vec(),
            inner,
        })
    }

    /// Parse the first PEM-encoded certificate
    pub fn from_pem(pem: &str) -> Result<Self> {
        chain_from_pem(pem)?
            .into_iter()
            .next()
            .ok_or_else(|| CryptoError::Certificate("Missing BEGIN CERTIFICATE".to_string()))
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.subject.to_der()?)
    }

    pub fn issuer_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.issuer.to_der()?)
    }

    /// RFC 4514 rendering of the subject
    pub fn subject_name(&self) -> String {
        self.inner.tbs_certificate.subject.to_string()
    }

    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    /// Raw subjectPublicKey bits (SEC1 point for EC keys)
    pub fn public_key_bits(&self) -> &[u8] {
        self.inner
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(self.public_key_bits())
            .map_err(|e| CryptoError::InvalidKey(format!("{}: {}", self.subject_name(), e)))
    }

    /// Subject and issuer are the same name
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.subject == self.inner.tbs_certificate.issuer
    }

    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        self.inner.tbs_certificate.issuer == issuer.inner.tbs_certificate.subject
    }

    fn extension_value(&self, oid: &ObjectIdentifier) -> Option<&[u8]> {
        self.inner
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == *oid)
            .map(|ext| ext.extn_value.as_bytes())
    }

    /// OCSP responder URL from the Authority Information Access extension
    pub fn ocsp_url(&self) -> Option<String> {
        let value = self.extension_value(&OID_AUTHORITY_INFO_ACCESS)?;
        let aia = AuthorityInfoAccessSyntax::from_der(value).ok()?;
        aia.0
            .iter()
            .filter(|desc| desc.access_method == OID_AD_OCSP)
            .find_map(|desc| match &desc.access_location {
                GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                _ => None,
            })
    }

    /// URLs from the CRL Distribution Points extension
    pub fn crl_urls(&self) -> Vec<String> {
        let Some(value) = self.extension_value(&OID_CRL_DISTRIBUTION_POINTS) else {
            return Vec::new();
        };
        let Ok(points) = CrlDistributionPoints::from_der(value) else {
            return Vec::new();
        };

        points
            .0
            .iter()
            .filter_map(|point| match &point.distribution_point {
                Some(DistributionPointName::FullName(names)) => Some(names),
                _ => None,
            })
            .flatten()
            .filter_map(|name| match name {
                GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Whether any revocation service is advertised by this certificate
    pub fn has_revocation_urls(&self) -> bool {
        self.ocsp_url().is_some() || !self.crl_urls().is_empty()
    }
}

/// Order `certs` into a chain starting at `leaf`, following issuer links.
///
/// Certificates not reachable from the leaf are dropped; duplicates are ignored.
pub fn order_chain(leaf: &Certificate, certs: &[Certificate]) -> Vec<Certificate> {
    let mut chain = vec![leaf.clone()];
    loop {
        let Some(current) = chain.last() else { break };
        if current.is_self_issued() {
            break;
        }
        match certs
            .iter()
            .find(|c| current.is_issued_by(c) && !chain.contains(c))
        {
            Some(issuer) => chain.push(issuer.clone()),
            None => break,
        }
    }
    chain
}

/// Find the issuer of `cert` among `candidates`
pub fn find_issuer<'a>(cert: &Certificate, candidates: &'a [Certificate]) -> Option<&'a Certificate> {
    candidates
        .iter()
        .find(|c| *c != cert && cert.is_issued_by(c))
}

/// Parse every `CERTIFICATE` block in a PEM bundle
pub fn chain_from_pem(pem: &str) -> Result<Vec<Certificate>> {
    pem_blocks(pem, "CERTIFICATE")?
        .iter()
        .map(|der| Certificate::from_der(der))
        .collect()
}

/// Extract and base64-decode all PEM blocks of the given type
pub fn pem_blocks(pem: &str, expected_type: &str) -> Result<Vec<Vec<u8>>> {
    let begin_marker = format!("-----BEGIN {}-----", expected_type);
    let end_marker = format!("-----END {}-----", expected_type);

    let mut blocks = Vec::new();
    let mut rest = pem;
    while let Some(begin) = rest.find(&begin_marker) {
        let start = begin + begin_marker.len();
        let end = rest[start..]
            .find(&end_marker)
            .ok_or_else(|| CryptoError::Certificate(format!("Missing END {}", expected_type)))?
            + start;

        let base64_content: String = rest[start..end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let der =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &base64_content)
                .map_err(|e| CryptoError::Certificate(format!("Invalid base64: {}", e)))?;
        blocks.push(der);
        rest = &rest[end + end_marker.len()..];
    }
    Ok(blocks)
}

/// Parameters for issuing a P-256 certificate
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub common_name: String,
    pub serial: u64,
    pub is_ca: bool,
    pub ocsp_url: Option<String>,
    pub crl_url: Option<String>,
    pub valid_days: i64,
}

impl CertificateTemplate {
    pub fn new(common_name: impl Into<String>, serial: u64) -> Self {
        Self {
            common_name: common_name.into(),
            serial,
            is_ca: false,
            ocsp_url: None,
            crl_url: None,
            valid_days: 365,
        }
    }

    pub fn ca(mut self) -> Self {
        self.is_ca = true;
        self
    }

    pub fn with_ocsp_url(mut self, url: impl Into<String>) -> Self {
        self.ocsp_url = Some(url.into());
        self
    }

    pub fn with_crl_url(mut self, url: impl Into<String>) -> Self {
        self.crl_url = Some(url.into());
        self
    }

    /// Issue a certificate for `subject_key`, signed by `issuer_key`.
    ///
    /// `issuer` is `None` for self-signed certificates.
    pub fn issue(
        &self,
        subject_key: &VerifyingKey,
        issuer: Option<&Certificate>,
        issuer_key: &SigningKey,
    ) -> Result<Certificate> {
        let subject = build_name(&self.common_name);
        let issuer_name = match issuer {
            Some(cert) => cert.subject_der()?,
            None => subject.clone(),
        };

        let now = chrono::Utc::now();
        let not_before = now - chrono::Duration::days(1);
        let not_after = now + chrono::Duration::days(self.valid_days);

        let mut tbs = Vec::new();
        tbs.extend(build_context_specific(0, &build_integer(&[2])));
        tbs.extend(build_small_integer(self.serial.max(1)));
        tbs.extend(build_algorithm_identifier_no_params(OID_ECDSA_SHA256));
        tbs.extend(issuer_name);
        tbs.extend(build_sequence(&[
            &build_utc_time(&not_before),
            &build_utc_time(&not_after),
        ]));
        tbs.extend(subject);
        tbs.extend(build_subject_public_key_info(
            subject_key.to_encoded_point(false).as_bytes(),
        ));

        let extensions = self.build_extensions();
        if !extensions.is_empty() {
            let refs: Vec<&[u8]> = extensions.iter().map(|e| e.as_slice()).collect();
            tbs.extend(build_context_specific(3, &build_sequence(&refs)));
        }

        let tbs_cert = build_sequence(&[&tbs]);
        let signature: Signature = issuer_key.sign(&tbs_cert);

        let cert = build_sequence(&[
            &tbs_cert,
            &build_algorithm_identifier_no_params(OID_ECDSA_SHA256),
            &build_bit_string(signature.to_der().as_bytes()),
        ]);
        Certificate::from_der(&cert)
    }

    fn build_extensions(&self) -> Vec<Vec<u8>> {
        let mut extensions = Vec::new();

        if self.is_ca {
            // BasicConstraints { cA TRUE }, critical
            let value = build_sequence(&[&build_boolean(true)]);
            extensions.push(build_sequence(&[
                &build_oid(DER_OID_BASIC_CONSTRAINTS),
                &build_boolean(true),
                &build_octet_string(&value),
            ]));
        }

        if let Some(url) = &self.crl_url {
            // DistributionPoint { [0] { fullName [0] { URI } } }
            let uri = build_context_primitive(6, url.as_bytes());
            let full_name = build_context_specific(0, &uri);
            let point_name = build_context_specific(0, &full_name);
            let value = build_sequence(&[&build_sequence(&[&point_name])]);
            extensions.push(build_sequence(&[
                &build_oid(DER_OID_CRL_DISTRIBUTION_POINTS),
                &build_octet_string(&value),
            ]));
        }

        if let Some(url) = &self.ocsp_url {
            let uri = build_context_primitive(6, url.as_bytes());
            let access = build_sequence(&[&build_oid(DER_OID_AD_OCSP), &uri]);
            let value = build_sequence(&[&access]);
            extensions.push(build_sequence(&[
                &build_oid(DER_OID_AUTHORITY_INFO_ACCESS),
                &build_octet_string(&value),
            ]));
        }

        extensions
    }
}

/// Name with a single CN attribute
pub fn build_name(cn: &str) -> Vec<u8> {
    // RDN: SET { SEQUENCE { OID (CN), UTF8String } }
    let cn_oid = build_oid(&[0x55, 0x04, 0x03]); // 2.5.4.3 = CN
    let cn_value = build_utf8_string(cn);
    let attr = build_sequence(&[&cn_oid, &cn_value]);
    let rdn = build_set(&attr);
    build_sequence(&[&rdn])
}

fn build_subject_public_key_info(public_key: &[u8]) -> Vec<u8> {
    // OID for EC public key: 1.2.840.10045.2.1
    let ec_oid = build_oid(&[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01]);
    // OID for P-256: 1.2.840.10045.3.1.7
    let p256_oid = build_oid(&[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07]);
    let alg = build_sequence(&[&ec_oid, &p256_oid]);
    let pk_bits = build_bit_string(public_key);
    build_sequence(&[&alg, &pk_bits])
}
