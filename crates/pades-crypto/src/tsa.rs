//! RFC 3161 Time-Stamp Authority (TSA) support
//!
//! This module provides:
//! 1. TimeStampReq construction
//! 2. TimeStampResp parsing
//! 3. The unsigned attribute carrying a TimeStampToken inside CMS
//! 4. [`TsaClient`], with an HTTP implementation over `ureq`

use std::io::Read;
use std::time::Duration;

use rand_core::{OsRng, RngCore};
use tracing::{debug, instrument};

use crate::asn1::*;
use crate::cms::{build_attribute, parse_signed_data, OID_TIMESTAMP_TOKEN, OID_TST_INFO};
use crate::digest::{unsupported_digest_oid, DigestAlgorithm};
use crate::error::{CryptoError, Result};

const HTTP_CONTENT_TYPE_REQUEST: &str = "application/timestamp-query";
const HTTP_CONTENT_TYPE_RESPONSE: &str = "application/timestamp-reply";

/// Upper bound on a TSA response body
const MAX_RESPONSE_BYTES: u64 = 1_000_000;

/// Default reservation for a token inside a signature container
pub const DEFAULT_TOKEN_SIZE_ESTIMATE: usize = 4096;

/// Source of RFC 3161 timestamp tokens
pub trait TsaClient: Send + Sync {
    /// Bytes to reserve for one token in a signature container
    fn token_size_estimate(&self) -> usize;

    /// Hash algorithm for the message imprint
    fn digest_algorithm(&self) -> DigestAlgorithm;

    /// Request a token over `imprint` (already hashed with
    /// [`TsaClient::digest_algorithm`]). Returns the TimeStampToken
    /// ContentInfo.
    fn get_timestamp_token(&self, imprint: &[u8]) -> Result<Vec<u8>>;
}

/// TSA reached over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpTsaClient {
    url: url::Url,
    credentials: Option<(String, String)>,
    digest: DigestAlgorithm,
    token_size_estimate: usize,
    timeout: Option<Duration>,
}

impl HttpTsaClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = url::Url::parse(url).map_err(|e| CryptoError::Tsa(format!("{}: {}", url, e)))?;
        Ok(Self {
            url,
            credentials: None,
            digest: DigestAlgorithm::Sha256,
            token_size_estimate: DEFAULT_TOKEN_SIZE_ESTIMATE,
            timeout: None,
        })
    }

    /// HTTP basic authentication
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn with_digest_algorithm(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_token_size_estimate(mut self, size: usize) -> Self {
        self.token_size_estimate = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl TsaClient for HttpTsaClient {
    fn token_size_estimate(&self) -> usize {
        self.token_size_estimate
    }

    fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    #[instrument(skip(self, imprint), fields(url = %self.url))]
    fn get_timestamp_token(&self, imprint: &[u8]) -> Result<Vec<u8>> {
        let nonce = generate_nonce();
        let request = build_timestamp_request(self.digest, imprint, &nonce);

        let mut req = ureq::post(self.url.as_str()).set("Content-Type", HTTP_CONTENT_TYPE_REQUEST);
        if let Some((user, password)) = &self.credentials {
            let token = base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                format!("{}:{}", user, password),
            );
            req = req.set("Authorization", &format!("Basic {}", token));
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let response = req
            .send_bytes(&request)
            .map_err(|e| CryptoError::http(self.url.as_str(), e))?;

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
        debug!(bytes = body.len(), "received timestamp response");

        let token = parse_timestamp_response(&body)?;
        let info = parse_tst_info(&token)?;
        if info.hashed_message != imprint {
            return Err(CryptoError::Tsa("token imprint does not match request".to_string()));
        }
        if info.nonce.as_deref().is_some_and(|n| integer_value(n) != integer_value(&nonce)) {
            return Err(CryptoError::Tsa("nonce mismatch".to_string()));
        }
        Ok(token)
    }
}

/// Build an RFC 3161 TimeStampReq over an already-computed imprint
///
/// ```text
/// TimeStampReq ::= SEQUENCE {
///    version         INTEGER { v1(1) },
///    messageImprint  MessageImprint,
///    reqPolicy       TSAPolicyId OPTIONAL,
///    nonce           INTEGER OPTIONAL,
///    certReq         BOOLEAN DEFAULT FALSE,
///    extensions      [0] IMPLICIT Extensions OPTIONAL
/// }
/// ```
pub fn build_timestamp_request(digest: DigestAlgorithm, imprint: &[u8], nonce: &[u8]) -> Vec<u8> {
    let mut req_content = Vec::new();
    req_content.extend(build_integer(&[1]));
    req_content.extend(build_message_imprint(digest, imprint));
    req_content.extend(build_integer(nonce));

    // certReq: we want the TSA certificate in the token
    req_content.extend(build_boolean(true));

    build_sequence(&[&req_content])
}

/// MessageImprint ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier, hashedMessage OCTET STRING }
pub fn build_message_imprint(digest: DigestAlgorithm, hash: &[u8]) -> Vec<u8> {
    let alg_id = build_algorithm_identifier(digest.oid());
    let hashed_message = build_octet_string(hash);
    build_sequence(&[&alg_id, &hashed_message])
}

/// Parse a TimeStampResp and extract the TimeStampToken
///
/// ```text
/// TimeStampResp ::= SEQUENCE {
///    status          PKIStatusInfo,
///    timeStampToken  TimeStampToken OPTIONAL
/// }
/// ```
pub fn parse_timestamp_response(response: &[u8]) -> Result<Vec<u8>> {
    if response.is_empty() {
        return Err(CryptoError::Tsa("Empty timestamp response".to_string()));
    }

    let outer = read_single(response, "TimeStampResp")?.expect_tag(TAG_SEQUENCE, "TimeStampResp")?;
    let (status_info, remaining) = read_tlv(outer.content)?;
    let status_info = status_info.expect_tag(TAG_SEQUENCE, "PKIStatusInfo")?;

    let (status, _) = read_tlv(status_info.content)?;
    let status = status.expect_tag(TAG_INTEGER, "PKIStatus")?;

    // 0 = granted, 1 = grantedWithMods
    let status_code = status.content.last().copied().unwrap_or(255);
    if status.content.len() != 1 || status_code > 1 {
        return Err(CryptoError::Tsa(format!(
            "Timestamp request failed with status: {}",
            status_code
        )));
    }

    if remaining.is_empty() {
        return Err(CryptoError::Tsa("No TimeStampToken in response".to_string()));
    }

    let (token, _) = read_tlv(remaining)?;
    validate_timestamp_token(token.raw)?;
    Ok(token.raw.to_vec())
}

/// TimeStampResp for a granted request, as a TSA would send it
pub fn build_timestamp_response(token: &[u8]) -> Vec<u8> {
    let status = build_sequence(&[&build_integer(&[0])]);
    build_sequence(&[&status, token])
}

/// Unsigned attribute holding a timestamp token (id-aa-timeStampToken)
pub fn build_timestamp_unsigned_attr(timestamp_token: &[u8]) -> Vec<u8> {
    build_attribute(OID_TIMESTAMP_TOKEN, timestamp_token)
}

/// Basic structural check of a timestamp token
pub fn validate_timestamp_token(token: &[u8]) -> Result<()> {
    if token.is_empty() {
        return Err(CryptoError::Tsa("Empty timestamp token".to_string()));
    }

    // Should start with SEQUENCE (ContentInfo)
    if token[0] != TAG_SEQUENCE {
        return Err(CryptoError::Tsa(
            "Invalid timestamp token: expected SEQUENCE".to_string(),
        ));
    }

    if encoded_len(token)? > token.len() {
        return Err(CryptoError::Tsa("Timestamp token too short".to_string()));
    }

    Ok(())
}

/// Fields of a TSTInfo relevant to signature validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    pub digest_algorithm: DigestAlgorithm,
    pub hashed_message: Vec<u8>,
    pub serial_number: Vec<u8>,
    /// GeneralizedTime as encoded
    pub gen_time: String,
    pub nonce: Option<Vec<u8>>,
}

/// Decode the TSTInfo carried by a timestamp token
///
/// ```text
/// TSTInfo ::= SEQUENCE {
///    version INTEGER, policy OID, messageImprint MessageImprint,
///    serialNumber INTEGER, genTime GeneralizedTime,
///    accuracy Accuracy OPTIONAL, ordering BOOLEAN DEFAULT FALSE,
///    nonce INTEGER OPTIONAL, ... }
/// ```
pub fn parse_tst_info(token: &[u8]) -> Result<TstInfo> {
    let signed = parse_signed_data(token)?;
    if signed.content_type != OID_TST_INFO {
        return Err(CryptoError::Tsa("token does not carry TSTInfo".to_string()));
    }
    let content = signed
        .encapsulated_content
        .ok_or_else(|| CryptoError::Tsa("token has no TSTInfo content".to_string()))?;

    let tst = read_single(&content, "TSTInfo")?.expect_tag(TAG_SEQUENCE, "TSTInfo")?;
    let fields = tst.children()?;
    if fields.len() < 5 {
        return Err(CryptoError::Tsa("truncated TSTInfo".to_string()));
    }

    let imprint = fields[2].expect_tag(TAG_SEQUENCE, "messageImprint")?.children()?;
    let alg = imprint
        .first()
        .ok_or_else(|| CryptoError::Tsa("empty messageImprint".to_string()))?
        .children()?;
    let alg_oid = alg
        .first()
        .ok_or_else(|| CryptoError::Tsa("empty hashAlgorithm".to_string()))?
        .expect_tag(TAG_OID, "hashAlgorithm")?
        .content;
    let digest_algorithm =
        DigestAlgorithm::from_oid(alg_oid).ok_or_else(|| unsupported_digest_oid(alg_oid))?;
    let hashed_message = imprint
        .get(1)
        .ok_or_else(|| CryptoError::Tsa("missing hashedMessage".to_string()))?
        .expect_tag(TAG_OCTET_STRING, "hashedMessage")?
        .content
        .to_vec();

    let serial_number = fields[3].expect_tag(TAG_INTEGER, "serialNumber")?.content.to_vec();
    let gen_time = fields[4].expect_tag(TAG_GENERALIZED_TIME, "genTime")?.content;
    let gen_time = String::from_utf8_lossy(gen_time).into_owned();

    // The only INTEGER after genTime is the nonce
    let nonce = fields[5..]
        .iter()
        .find(|f| f.tag == TAG_INTEGER)
        .map(|f| f.content.to_vec());

    Ok(TstInfo {
        digest_algorithm,
        hashed_message,
        serial_number,
        gen_time,
        nonce,
    })
}

fn generate_nonce() -> Vec<u8> {
    let mut nonce = [0u8; 8];
    OsRng.fill_bytes(&mut nonce);
    // Keep it positive
    nonce[0] &= 0x7F;
    nonce.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_timestamp_request() {
        let imprint = DigestAlgorithm::Sha256.digest_parts(&[b"test signature data"]);
        let request = build_timestamp_request(DigestAlgorithm::Sha256, &imprint, &[1, 2, 3]);

        let fields = read_single(&request, "req").unwrap().children().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].content, &[1]);
        assert_eq!(fields[3].tag, TAG_BOOLEAN);
    }

    #[test]
    fn test_failed_status_is_rejected() {
        // PKIStatusInfo { status = rejection(2) }
        let response = build_sequence(&[&build_sequence(&[&build_integer(&[2])])]);
        let err = parse_timestamp_response(&response).unwrap_err();
        assert!(err.to_string().contains("status: 2"));
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let response = build_sequence(&[&build_sequence(&[&build_integer(&[0])])]);
        assert!(parse_timestamp_response(&response).is_err());
        assert!(parse_timestamp_response(&[]).is_err());
    }

    #[test]
    fn test_granted_response_returns_token() {
        let token = vec![0x30, 0x03, 0x02, 0x01, 0x00]; // Minimal SEQUENCE
        let response = build_timestamp_response(&token);
        assert_eq!(parse_timestamp_response(&response).unwrap(), token);
    }

    #[test]
    fn test_build_unsigned_attr() {
        let token = vec![0x30, 0x03, 0x02, 0x01, 0x00];
        let attr = build_timestamp_unsigned_attr(&token);
        assert_eq!(attr[0], TAG_SEQUENCE);
        assert!(attr.ends_with(&token));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(HttpTsaClient::new("not a url").is_err());
        let client = HttpTsaClient::new("http://tsa.example.test/tsr").unwrap();
        assert_eq!(client.token_size_estimate(), DEFAULT_TOKEN_SIZE_ESTIMATE);
        assert_eq!(client.digest_algorithm(), DigestAlgorithm::Sha256);
    }
}
