//! Reading and verifying the signatures embedded in a PDF

use lopdf::{Dictionary, Object};
use tracing::debug;

use pades_crypto::asn1::encoded_len;
use pades_crypto::cms::parse_signed_data;
use pades_crypto::tsa::parse_tst_info;
use pades_crypto::{Certificate, DigestAlgorithm};

use crate::document::PdfDocument;
use crate::error::{PdfError, Result};
use crate::signer::SUB_FILTER_RFC3161;

/// A signature dictionary bound to a form field
#[derive(Debug, Clone)]
pub struct EmbeddedSignature {
    pub name: String,
    pub sub_filter: Vec<u8>,
    pub byte_range: [usize; 4],
    /// Raw `/Contents`, including zero padding
    pub contents: Vec<u8>,
}

impl EmbeddedSignature {
    fn from_dictionary(name: String, dict: &Dictionary) -> Result<Self> {
        let sub_filter = dict
            .get(b"SubFilter")
            .and_then(Object::as_name)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        let contents = dict
            .get(b"Contents")
            .and_then(Object::as_str)
            .map_err(|_| PdfError::Structure(format!("signature {} has no /Contents", name)))?
            .to_vec();

        let range = dict
            .get(b"ByteRange")
            .and_then(Object::as_array)
            .map_err(|_| PdfError::Structure(format!("signature {} has no /ByteRange", name)))?;
        let values: Vec<usize> = range
            .iter()
            .filter_map(|o| o.as_i64().ok())
            .filter_map(|v| usize::try_from(v).ok())
            .collect();
        let byte_range: [usize; 4] = values.try_into().map_err(|_| {
            PdfError::Structure(format!("signature {} has a malformed /ByteRange", name))
        })?;

        Ok(Self {
            name,
            sub_filter,
            byte_range,
            contents,
        })
    }

    pub fn is_document_timestamp(&self) -> bool {
        self.sub_filter == SUB_FILTER_RFC3161
    }

    /// The DER container without trailing placeholder padding
    pub fn container(&self) -> Result<&[u8]> {
        let len = encoded_len(&self.contents)?;
        Ok(&self.contents[..len])
    }

    /// Length of the revision this signature was applied to
    pub fn revision_length(&self) -> usize {
        self.byte_range[2].saturating_add(self.byte_range[3])
    }

    pub fn covers_whole_document(&self, bytes: &[u8]) -> bool {
        self.revision_length() == bytes.len()
    }

    /// Concatenation of the two signed byte ranges
    pub fn signed_content(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let [a, b, c, d] = self.byte_range;
        let first = a.checked_add(b).and_then(|end| bytes.get(a..end));
        let second = c.checked_add(d).and_then(|end| bytes.get(c..end));
        match (first, second) {
            (Some(first), Some(second)) => Ok([first, second].concat()),
            _ => Err(self.invalid("byte range out of bounds")),
        }
    }

    fn invalid(&self, reason: &str) -> PdfError {
        PdfError::InvalidSignature {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a successful integrity check
#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    pub name: String,
    pub digest_algorithm: DigestAlgorithm,
    pub signer: Certificate,
    /// Signer certificate first, then its issuers
    pub chain: Vec<Certificate>,
    /// The document timestamp itself, or the signature's embedded timestamp
    pub timestamp_token: Option<Vec<u8>>,
    pub is_document_timestamp: bool,
    pub covers_whole_document: bool,
}

/// Signature lookup over a loaded document
pub struct SignatureUtil<'a> {
    document: &'a PdfDocument,
}

impl<'a> SignatureUtil<'a> {
    pub fn new(document: &'a PdfDocument) -> Self {
        Self { document }
    }

    /// Every signature and document timestamp, oldest revision first
    pub fn signatures(&self) -> Result<Vec<EmbeddedSignature>> {
        let mut signatures = Vec::new();
        for field in self.document.signed_fields()? {
            let Some(value) = field.value else {
                continue;
            };
            let dict = self.document.get_dict(value)?;
            if !dict.has(b"ByteRange") {
                continue;
            }
            signatures.push(EmbeddedSignature::from_dictionary(field.name, dict)?);
        }
        signatures.sort_by_key(EmbeddedSignature::revision_length);
        Ok(signatures)
    }

    pub fn signature_names(&self) -> Result<Vec<String>> {
        Ok(self.signatures()?.into_iter().map(|s| s.name).collect())
    }

    pub fn signature(&self, name: &str) -> Result<EmbeddedSignature> {
        self.signatures()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PdfError::SignatureNotFound(name.to_string()))
    }

    /// Every certificate embedded in any signature container, deduplicated
    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        let mut certificates: Vec<Certificate> = Vec::new();
        for signature in self.signatures()? {
            let signed = parse_signed_data(signature.container()?)?;
            let mut embedded = signed.certificates;
            if let Some(token) = signed.timestamp_token {
                embedded.extend(parse_signed_data(&token)?.certificates);
            }
            for cert in embedded {
                if !certificates.contains(&cert) {
                    certificates.push(cert);
                }
            }
        }
        Ok(certificates)
    }

    /// Check that `name` is intact and its CMS or timestamp verifies
    pub fn verify(&self, name: &str) -> Result<VerifiedSignature> {
        let signature = self.signature(name)?;
        let bytes = self.document.bytes();
        let [a, b, c, d] = signature.byte_range;

        if a != 0 || b >= c || c.checked_add(d).map_or(true, |end| end > bytes.len()) {
            return Err(signature.invalid("byte range out of bounds"));
        }
        if bytes.get(b) != Some(&b'<') || bytes.get(c - 1) != Some(&b'>') {
            return Err(signature.invalid("byte range gap is not the signature value"));
        }

        let content = signature.signed_content(bytes)?;
        let container = signature.container()?;
        let signed = parse_signed_data(container)?;
        if !signed.verify_signature()? {
            return Err(signature.invalid("signature value does not verify"));
        }

        let verified = if signature.is_document_timestamp() {
            let info = parse_tst_info(container)?;
            if info.digest_algorithm.digest_parts(&[&content]) != info.hashed_message {
                return Err(signature.invalid("timestamp imprint does not match the document"));
            }
            VerifiedSignature {
                name: signature.name.clone(),
                digest_algorithm: info.digest_algorithm,
                chain: signed.chain(),
                signer: signed.signer,
                timestamp_token: Some(container.to_vec()),
                is_document_timestamp: true,
                covers_whole_document: signature.covers_whole_document(bytes),
            }
        } else {
            if signed.digest_algorithm.digest_parts(&[&content]) != signed.message_digest {
                return Err(signature.invalid("document digest does not match"));
            }
            if let Some(token) = &signed.timestamp_token {
                let info = parse_tst_info(token)?;
                if info.digest_algorithm.digest_parts(&[&signed.signature]) != info.hashed_message {
                    return Err(signature.invalid("signature timestamp imprint does not match"));
                }
            }
            VerifiedSignature {
                name: signature.name.clone(),
                digest_algorithm: signed.digest_algorithm,
                chain: signed.chain(),
                signer: signed.signer,
                timestamp_token: signed.timestamp_token,
                is_document_timestamp: false,
                covers_whole_document: signature.covers_whole_document(bytes),
            }
        };

        debug!(
            name,
            signer = %verified.signer.subject_name(),
            whole = verified.covers_whole_document,
            "signature verified"
        );
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{PdfSigner, SignerProperties};
    use crate::testing::minimal_pdf;
    use pades_crypto::testing::{TestPki, TestTsaClient};
    use pades_crypto::{GeneralProvider, ProviderDigest};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn signed_pdf(pki: &TestPki, tsa: Option<&TestTsaClient>) -> Vec<u8> {
        let digest = ProviderDigest::new(Arc::new(GeneralProvider));
        let signer =
            PdfSigner::new(minimal_pdf("1.7", 2).unwrap(), Vec::new(), SignerProperties::default())
                .unwrap();
        signer
            .sign_detached(
                &digest,
                &pki.signature(DigestAlgorithm::Sha256),
                &pki.chain(),
                tsa.map(|t| t as &dyn pades_crypto::TsaClient),
                0,
            )
            .unwrap()
    }

    #[test]
    fn test_verify_fresh_signature() {
        let pki = TestPki::generate().unwrap();
        let doc = PdfDocument::load(signed_pdf(&pki, None)).unwrap();
        let verified = SignatureUtil::new(&doc).verify("Signature1").unwrap();

        assert_eq!(verified.signer, pki.leaf);
        assert_eq!(verified.chain, pki.chain());
        assert_eq!(verified.digest_algorithm, DigestAlgorithm::Sha256);
        assert!(verified.covers_whole_document);
        assert!(verified.timestamp_token.is_none());
    }

    #[test]
    fn test_verify_signature_timestamp() {
        let pki = TestPki::generate().unwrap();
        let tsa = TestTsaClient::new(&pki).unwrap();
        let doc = PdfDocument::load(signed_pdf(&pki, Some(&tsa))).unwrap();
        let verified = SignatureUtil::new(&doc).verify("Signature1").unwrap();
        assert!(verified.timestamp_token.is_some());
    }

    #[test]
    fn test_tampered_content_detected() {
        let pki = TestPki::generate().unwrap();
        let mut bytes = signed_pdf(&pki, None);
        let pos = crate::document::find_from(&bytes, b"(Page 1)", 0).unwrap();
        bytes[pos + 1] = b'X';

        let doc = PdfDocument::load(bytes).unwrap();
        let err = SignatureUtil::new(&doc).verify("Signature1").unwrap_err();
        assert!(matches!(err, PdfError::InvalidSignature { .. }));
    }

    #[test]
    fn test_unknown_signature() {
        let doc = PdfDocument::load(minimal_pdf("1.7", 1).unwrap()).unwrap();
        let util = SignatureUtil::new(&doc);
        assert!(util.signature_names().unwrap().is_empty());
        assert!(matches!(
            util.signature("Signature1"),
            Err(PdfError::SignatureNotFound(_))
        ));
    }

    #[test]
    fn test_certificates_are_collected() {
        let pki = TestPki::generate().unwrap();
        let tsa = TestTsaClient::new(&pki).unwrap();
        let doc = PdfDocument::load(signed_pdf(&pki, Some(&tsa))).unwrap();
        let certs = SignatureUtil::new(&doc).certificates().unwrap();

        assert!(certs.contains(&pki.leaf));
        assert!(certs.contains(&pki.root));
        assert!(certs.contains(tsa.certificate()));
    }

    #[test]
    fn test_container_trims_padding() {
        let pki = TestPki::generate().unwrap();
        let doc = PdfDocument::load(signed_pdf(&pki, None)).unwrap();
        let sig = SignatureUtil::new(&doc).signature("Signature1").unwrap();
        let container = sig.container().unwrap();
        assert!(container.len() < sig.contents.len());
        assert!(sig.contents[container.len()..].iter().all(|b| *b == 0));
    }
}
