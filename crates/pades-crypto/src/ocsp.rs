//! OCSP (RFC 6960) client
//!
//! Builds a single-certificate OCSPRequest, posts it to the responder and
//! returns the BasicOCSPResponse once its signature and certificate status
//! check out. Callers storing the response in a DSS wrap it back into a
//! full OCSPResponse with [`build_ocsp_response`].

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::asn1::*;
use crate::cert::{find_issuer, Certificate};
use crate::digest::DigestAlgorithm;
use crate::error::{CryptoError, Result};
use crate::keys::{digest_for_ecdsa_oid, verify_ecdsa};
use crate::provider::{CryptoProvider, OID_OCSP_BASIC};

const HTTP_CONTENT_TYPE_REQUEST: &str = "application/ocsp-request";
const HTTP_CONTENT_TYPE_RESPONSE: &str = "application/ocsp-response";

const MAX_RESPONSE_BYTES: u64 = 1_000_000;

/// Tag of CertStatus `good [0] IMPLICIT NULL`
const TAG_CERT_STATUS_GOOD: u8 = 0x80;
/// Tag of CertStatus `revoked [1] IMPLICIT RevokedInfo`
const TAG_CERT_STATUS_REVOKED: u8 = 0xA1;

/// Source of OCSP responses
pub trait OcspClient: Send + Sync {
    /// DER BasicOCSPResponse for `cert`, or `None` when no usable response
    /// can be obtained (no responder, no issuer, status not good).
    fn get_encoded(
        &self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
        url: Option<&str>,
    ) -> Result<Option<Vec<u8>>>;
}

/// OCSP client that talks to the responder named in the certificate's AIA
/// extension, or a fixed URL
pub struct OcspClientOnline {
    provider: Arc<dyn CryptoProvider>,
    url: Option<String>,
}

impl OcspClientOnline {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            provider,
            url: None,
        }
    }

    /// Always query `url`, ignoring AIA
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn post(&self, url: &str, request: &[u8]) -> Result<Vec<u8>> {
        let response = ureq::post(url)
            .set("Content-Type", HTTP_CONTENT_TYPE_REQUEST)
            .send_bytes(request)
            .map_err(|e| CryptoError::http(url, e))?;

        if response.status() != 200 || response.content_type() != HTTP_CONTENT_TYPE_RESPONSE {
            return Err(CryptoError::HttpStatus(
                response.status(),
                response.content_type().to_string(),
            ));
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut body)?;
        Ok(body)
    }
}

impl OcspClient for OcspClientOnline {
    #[instrument(skip_all, fields(subject = %cert.subject_name()))]
    fn get_encoded(
        &self,
        cert: &Certificate,
        issuer: Option<&Certificate>,
        url: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let Some(issuer) = issuer else {
            debug!("no issuer certificate, skipping OCSP");
            return Ok(None);
        };
        let Some(url) = url
            .map(str::to_string)
            .or_else(|| self.url.clone())
            .or_else(|| cert.ocsp_url())
        else {
            debug!("no OCSP responder URL");
            return Ok(None);
        };

        let request = build_ocsp_request(cert, issuer)?;
        let body = self.post(&url, &request)?;
        let basic = self.provider.decode_ocsp_response(&body)?;

        match check_basic_response(&basic, cert, issuer)? {
            CertStatus::Good => Ok(Some(basic)),
            status => {
                warn!(?status, "OCSP responder did not report the certificate as good");
                Ok(None)
            }
        }
    }
}

/// Status reported by a SingleResponse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked,
    Unknown,
}

/// CertID ::= SEQUENCE { hashAlgorithm, issuerNameHash, issuerKeyHash, serialNumber }
///
/// Hashed with SHA-1, which every responder accepts.
pub fn build_cert_id(cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
    let name_hash = DigestAlgorithm::Sha1.digest_parts(&[&issuer.subject_der()?]);
    let key_hash = DigestAlgorithm::Sha1.digest_parts(&[issuer.public_key_bits()]);
    Ok(build_sequence(&[
        &build_algorithm_identifier(DigestAlgorithm::Sha1.oid()),
        &build_octet_string(&name_hash),
        &build_octet_string(&key_hash),
        &build_integer(cert.serial_number()),
    ]))
}

/// OCSPRequest ::= SEQUENCE { tbsRequest SEQUENCE { requestList SEQUENCE OF Request } }
pub fn build_ocsp_request(cert: &Certificate, issuer: &Certificate) -> Result<Vec<u8>> {
    let request = build_sequence(&[&build_cert_id(cert, issuer)?]);
    let request_list = build_sequence(&[&request]);
    let tbs_request = build_sequence(&[&request_list]);
    Ok(build_sequence(&[&tbs_request]))
}

/// Wrap a BasicOCSPResponse into a successful OCSPResponse
pub fn build_ocsp_response(basic: &[u8]) -> Vec<u8> {
    let response_bytes = build_sequence(&[&build_oid(OID_OCSP_BASIC), &build_octet_string(basic)]);
    build_sequence(&[
        &build_enumerated(0),
        &build_context_specific(0, &response_bytes),
    ])
}

/// Verify the responder signature of a BasicOCSPResponse and return the
/// status of `cert`.
///
/// ```text
/// BasicOCSPResponse ::= SEQUENCE {
///    tbsResponseData ResponseData,
///    signatureAlgorithm AlgorithmIdentifier,
///    signature BIT STRING,
///    certs [0] EXPLICIT SEQUENCE OF Certificate OPTIONAL }
/// ```
pub fn check_basic_response(
    basic: &[u8],
    cert: &Certificate,
    issuer: &Certificate,
) -> Result<CertStatus> {
    let parts = read_single(basic, "BasicOCSPResponse")?
        .expect_tag(TAG_SEQUENCE, "BasicOCSPResponse")?
        .children()?;
    if parts.len() < 3 {
        return Err(CryptoError::Ocsp("truncated BasicOCSPResponse".to_string()));
    }
    let tbs = parts[0].expect_tag(TAG_SEQUENCE, "ResponseData")?;
    let alg = parts[1].expect_tag(TAG_SEQUENCE, "signatureAlgorithm")?.children()?;
    let alg_oid = alg
        .first()
        .ok_or_else(|| CryptoError::Ocsp("empty signatureAlgorithm".to_string()))?
        .expect_tag(TAG_OID, "signatureAlgorithm")?
        .content;
    let digest = digest_for_ecdsa_oid(alg_oid)
        .ok_or_else(|| CryptoError::UnsupportedAlgorithm(hex::encode(alg_oid)))?;
    let signature = parts[2].expect_tag(TAG_BIT_STRING, "signature")?.content;
    let signature = signature
        .get(1..)
        .ok_or_else(|| CryptoError::Ocsp("empty signature".to_string()))?;

    // Delegated responder certificate, else the issuer signs directly
    let embedded: Vec<Certificate> = match parts.get(3) {
        Some(certs) if certs.tag == 0xA0 => read_single(certs.content, "certs")?
            .children()?
            .iter()
            .map(|c| Certificate::from_der(c.raw))
            .collect::<Result<_>>()?,
        _ => Vec::new(),
    };
    let responder = match embedded.first() {
        Some(responder) if responder.is_issued_by(issuer) || responder == issuer => responder,
        Some(_) => {
            return Err(CryptoError::Ocsp(
                "responder certificate not issued by the certificate issuer".to_string(),
            ))
        }
        None => issuer,
    };
    if !verify_ecdsa(&responder.verifying_key()?, digest, tbs.raw, signature) {
        return Err(CryptoError::Ocsp("invalid responder signature".to_string()));
    }

    let expected_id = build_cert_id(cert, issuer)?;
    let fields = tbs.children()?;
    // version [0] is optional; responses is the first SEQUENCE after producedAt
    let responses = fields
        .iter()
        .skip_while(|f| f.tag != TAG_GENERALIZED_TIME)
        .find(|f| f.tag == TAG_SEQUENCE)
        .ok_or_else(|| CryptoError::Ocsp("missing responses".to_string()))?;

    for single in responses.children()? {
        let single = single.children()?;
        let (Some(cert_id), Some(status)) = (single.first(), single.get(1)) else {
            continue;
        };
        if cert_id.raw != expected_id.as_slice() {
            continue;
        }
        return Ok(match status.tag {
            TAG_CERT_STATUS_GOOD => CertStatus::Good,
            TAG_CERT_STATUS_REVOKED => CertStatus::Revoked,
            _ => CertStatus::Unknown,
        });
    }
    Err(CryptoError::Ocsp(format!(
        "no response for certificate {}",
        hex::encode(cert.serial_number())
    )))
}

/// Find the issuer of `cert` in `chain`, for callers holding a flat list
pub fn issuer_in_chain<'a>(cert: &Certificate, chain: &'a [Certificate]) -> Option<&'a Certificate> {
    find_issuer(cert, chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GeneralProvider;
    use crate::testing::{TestOcspClient, TestPki};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_structure() {
        let pki = TestPki::generate().unwrap();
        let request = build_ocsp_request(&pki.leaf, &pki.intermediate).unwrap();

        let tbs = read_single(&request, "req").unwrap().children().unwrap();
        let list = tbs[0].children().unwrap()[0].children().unwrap();
        assert_eq!(list.len(), 1);
        let cert_id = list[0].children().unwrap()[0];
        assert_eq!(cert_id.raw, build_cert_id(&pki.leaf, &pki.intermediate).unwrap().as_slice());
    }

    #[test]
    fn test_good_response_accepted() {
        let pki = TestPki::generate().unwrap();
        let client = TestOcspClient::new(&pki);
        let basic = client
            .get_encoded(&pki.leaf, Some(&pki.intermediate), None)
            .unwrap()
            .unwrap();
        assert_eq!(
            check_basic_response(&basic, &pki.leaf, &pki.intermediate).unwrap(),
            CertStatus::Good
        );
    }

    #[test]
    fn test_wrapped_response_decodes() {
        let pki = TestPki::generate().unwrap();
        let basic = TestOcspClient::new(&pki)
            .get_encoded(&pki.leaf, Some(&pki.intermediate), None)
            .unwrap()
            .unwrap();
        let full = build_ocsp_response(&basic);
        assert_eq!(GeneralProvider.decode_ocsp_response(&full).unwrap(), basic);
    }

    #[test]
    fn test_response_for_other_certificate_rejected() {
        let pki = TestPki::generate().unwrap();
        let basic = TestOcspClient::new(&pki)
            .get_encoded(&pki.leaf, Some(&pki.intermediate), None)
            .unwrap()
            .unwrap();
        assert!(check_basic_response(&basic, &pki.intermediate, &pki.root).is_err());
    }

    #[test]
    fn test_online_client_without_issuer_or_url() {
        let pki = TestPki::generate().unwrap();
        let client = OcspClientOnline::new(Arc::new(GeneralProvider));
        assert_eq!(client.get_encoded(&pki.leaf, None, None).unwrap(), None);

        let bare = TestPki::generate_without_urls().unwrap();
        assert_eq!(
            client
                .get_encoded(&bare.leaf, Some(&bare.intermediate), None)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_issuer_lookup() {
        let pki = TestPki::generate().unwrap();
        let chain = pki.chain();
        assert_eq!(issuer_in_chain(&pki.leaf, &chain), Some(&pki.intermediate));
        assert_eq!(issuer_in_chain(&pki.root, &chain), None);
    }
}
