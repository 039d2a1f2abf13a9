//! In-process PKI fixtures
//!
//! A three-level certificate chain, a TSA issuing real RFC 3161 tokens, and
//! OCSP / CRL clients answering from the chain's own keys. Nothing here
//! touches the network.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand_core::OsRng;

use crate::asn1::*;
use crate::cert::{Certificate, CertificateTemplate, OID_ECDSA_SHA256};
use crate::cms::{CmsBuilder, OID_TST_INFO};
use crate::crl::CrlClient;
use crate::digest::{DigestAlgorithm, ExternalDigest, ProviderDigest};
use crate::error::{CryptoError, Result};
use crate::keys::{ExternalSignature, PrivateKeySignature};
use crate::ocsp::{build_cert_id, OcspClient};
use crate::provider::GeneralProvider;
use crate::tsa::TsaClient;

/// Arbitrary TSA policy: 1.2.3.4.1
const TEST_TSA_POLICY: &[u8] = &[0x2A, 0x03, 0x04, 0x01];

/// Root, intermediate and leaf certificates with their keys
pub struct TestPki {
    pub root: Certificate,
    pub intermediate: Certificate,
    pub leaf: Certificate,
    pub root_key: SigningKey,
    pub intermediate_key: SigningKey,
    pub leaf_key: SigningKey,
}

impl TestPki {
    /// Chain whose leaf and intermediate advertise OCSP and CRL services
    pub fn generate() -> Result<Self> {
        Self::build(true)
    }

    /// Chain without any revocation service URL
    pub fn generate_without_urls() -> Result<Self> {
        Self::build(false)
    }

    fn build(with_urls: bool) -> Result<Self> {
        let root_key = SigningKey::random(&mut OsRng);
        let intermediate_key = SigningKey::random(&mut OsRng);
        let leaf_key = SigningKey::random(&mut OsRng);

        let root = CertificateTemplate::new("PAdES Test Root", 1)
            .ca()
            .issue(root_key.verifying_key(), None, &root_key)?;

        let mut template = CertificateTemplate::new("PAdES Test Intermediate", 2).ca();
        if with_urls {
            template = template
                .with_ocsp_url("http://ocsp.pades.test/root")
                .with_crl_url("http://crl.pades.test/root.crl");
        }
        let intermediate = template.issue(intermediate_key.verifying_key(), Some(&root), &root_key)?;

        let mut template = CertificateTemplate::new("PAdES Test Signer", 3);
        if with_urls {
            template = template
                .with_ocsp_url("http://ocsp.pades.test/intermediate")
                .with_crl_url("http://crl.pades.test/intermediate.crl");
        }
        let leaf = template.issue(leaf_key.verifying_key(), Some(&intermediate), &intermediate_key)?;

        Ok(Self {
            root,
            intermediate,
            leaf,
            root_key,
            intermediate_key,
            leaf_key,
        })
    }

    /// Leaf first, root last
    pub fn chain(&self) -> Vec<Certificate> {
        vec![
            self.leaf.clone(),
            self.intermediate.clone(),
            self.root.clone(),
        ]
    }

    /// Signing capability over the leaf key
    pub fn signature(&self, digest: DigestAlgorithm) -> PrivateKeySignature {
        PrivateKeySignature::new(self.leaf_key.clone(), digest, default_digest())
    }

    /// Issuing key for a certificate of this chain
    fn issuer_key(&self, issuer: &Certificate) -> Option<&SigningKey> {
        if *issuer == self.root {
            Some(&self.root_key)
        } else if *issuer == self.intermediate {
            Some(&self.intermediate_key)
        } else {
            None
        }
    }
}

fn default_digest() -> Arc<dyn ExternalDigest> {
    Arc::new(ProviderDigest::new(Arc::new(GeneralProvider)))
}

/// TSA issuing tokens signed by a certificate under the test root
pub struct TestTsaClient {
    certificate: Certificate,
    chain: Vec<Certificate>,
    key: SigningKey,
    digest: DigestAlgorithm,
    serial: AtomicU64,
    requests: AtomicUsize,
}

impl TestTsaClient {
    pub fn new(pki: &TestPki) -> Result<Self> {
        let key = SigningKey::random(&mut OsRng);
        let certificate = CertificateTemplate::new("PAdES Test TSA", 100).issue(
            key.verifying_key(),
            Some(&pki.root),
            &pki.root_key,
        )?;
        Ok(Self {
            chain: vec![certificate.clone(), pki.root.clone()],
            certificate,
            key,
            digest: DigestAlgorithm::Sha256,
            serial: AtomicU64::new(1),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn with_digest_algorithm(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Number of tokens issued so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn build_tst_info(&self, imprint: &[u8]) -> Vec<u8> {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let message_imprint = build_sequence(&[
            &build_algorithm_identifier(self.digest.oid()),
            &build_octet_string(imprint),
        ]);
        build_sequence(&[
            &build_integer(&[1]),
            &build_oid(TEST_TSA_POLICY),
            &message_imprint,
            &build_small_integer(serial),
            &build_generalized_time(&chrono::Utc::now()),
        ])
    }
}

impl TsaClient for TestTsaClient {
    fn token_size_estimate(&self) -> usize {
        4096
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    fn get_timestamp_token(&self, imprint: &[u8]) -> Result<Vec<u8>> {
        if imprint.len() != self.digest.output_len() {
            return Err(CryptoError::Tsa("imprint length does not match digest".to_string()));
        }
        self.requests.fetch_add(1, Ordering::SeqCst);

        let tst_info = self.build_tst_info(imprint);
        let builder = CmsBuilder::detached(DigestAlgorithm::Sha256, &self.certificate, &self.chain)
            .with_content(OID_TST_INFO, &tst_info);
        let attrs =
            builder.signed_attributes(&DigestAlgorithm::Sha256.digest_parts(&[&tst_info]))?;

        let signer = PrivateKeySignature::new(
            self.key.clone(),
            DigestAlgorithm::Sha256,
            default_digest(),
        );
        let signature = signer.sign(&attrs)?;
        builder.build(&attrs, signer.signature_algorithm_oid(), &signature, &[])
    }
}

/// TSA that always fails
#[derive(Debug, Default)]
pub struct FailingTsaClient;

impl TsaClient for FailingTsaClient {
    fn token_size_estimate(&self) -> usize {
        4096
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        DigestAlgorithm::Sha256
    }

    fn get_timestamp_token(&self, _imprint: &[u8]) -> Result<Vec<u8>> {
        Err(CryptoError::Tsa("TSA unavailable".to_string()))
    }
}

/// OCSP responder answering "good" for every certificate issued within a
/// [`TestPki`]
pub struct TestOcspClient {
    issuers: Vec<(Certificate, SigningKey)>,
    requests: AtomicUsize,
}

impl TestOcspClient {
    pub fn new(pki: &TestPki) -> Self {
        Self {
            issuers: vec![
                (pki.root.clone(), pki.root_key.clone()),
                (pki.intermediate.clone(), pki.intermediate_key.clone()),
            ],
            requests: AtomicUsize::new(0),
        }
    }

    /// Responder that never has an answer
    pub fn silent() -> Self {
        Self {
            issuers: Vec::new(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl OcspClient for TestOcspClient {
    fn get_encoded(
        &self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
        _url: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let Some(issuer) = issuer else {
            return Ok(None);
        };
        let Some((_, key)) = self.issuers.iter().find(|(c, _)| c == issuer) else {
            return Ok(None);
        };

        let now = chrono::Utc::now();
        let key_hash = DigestAlgorithm::Sha1.digest_parts(&[issuer.public_key_bits()]);
        let single = build_sequence(&[
            &build_cert_id(cert, issuer)?,
            &build_context_primitive(0, &[]),
            &build_generalized_time(&now),
        ]);
        let tbs = build_sequence(&[
            &build_context_specific(2, &build_octet_string(&key_hash)),
            &build_generalized_time(&now),
            &build_sequence(&[&single]),
        ]);
        Ok(Some(sign_structure(&tbs, key)))
    }
}

/// CRL issuer listing no revoked certificates
pub struct TestCrlClient {
    issuers: Vec<(Certificate, SigningKey)>,
    requests: AtomicUsize,
}

impl TestCrlClient {
    pub fn new(pki: &TestPki) -> Self {
        Self {
            issuers: vec![
                (pki.root.clone(), pki.root_key.clone()),
                (pki.intermediate.clone(), pki.intermediate_key.clone()),
            ],
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl CrlClient for TestCrlClient {
    fn get_encoded(&self, cert: &Certificate, _url: Option<&str>) -> Result<Vec<Vec<u8>>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let Some((issuer, key)) = self
            .issuers
            .iter()
            .find(|(c, _)| cert != c && cert.is_issued_by(c))
        else {
            return Ok(Vec::new());
        };

        let now = chrono::Utc::now();
        let tbs = build_sequence(&[
            &build_integer(&[1]),
            &build_algorithm_identifier_no_params(OID_ECDSA_SHA256),
            &issuer.subject_der()?,
            &build_utc_time(&now),
            &build_utc_time(&(now + chrono::Duration::days(7))),
        ]);
        Ok(vec![sign_structure(&tbs, key)])
    }
}

/// SEQUENCE { tbs, ecdsa-with-SHA256, BIT STRING signature }
fn sign_structure(tbs: &[u8], key: &SigningKey) -> Vec<u8> {
    let signature: Signature = key.sign(tbs);
    build_sequence(&[
        tbs,
        &build_algorithm_identifier_no_params(OID_ECDSA_SHA256),
        &build_bit_string(signature.to_der().as_bytes()),
    ])
}

/// OCSP responder that is always unreachable
#[derive(Debug, Default)]
pub struct FailingOcspClient {
    requests: AtomicUsize,
}

impl FailingOcspClient {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl OcspClient for FailingOcspClient {
    fn get_encoded(
        &self,
        _cert: &Certificate,
        _issuer: Option<&Certificate>,
        _url: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Err(CryptoError::Ocsp("OCSP responder unavailable".to_string()))
    }
}

/// CRL distribution point that is always unreachable
#[derive(Debug, Default)]
pub struct FailingCrlClient;

impl CrlClient for FailingCrlClient {
    fn get_encoded(&self, _cert: &Certificate, _url: Option<&str>) -> Result<Vec<Vec<u8>>> {
        Err(CryptoError::Crl("CRL download failed".to_string()))
    }
}
