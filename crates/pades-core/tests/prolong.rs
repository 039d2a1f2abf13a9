//! Prolonging existing signatures and staging cleanup on failure
//!
//! Run with: cargo test -p pades-core --test prolong

#[path = "common/fixtures.rs"]
mod fixtures;

use fixtures::{assert_chain_covered, assert_ocsp_responses_complete, signer_with_clients, unsigned_pdf};
use pades_core::{ErrorKind, PadesSigner, SignerProperties};
use pades_crypto::testing::{TestPki, TestTsaClient};
use pades_crypto::DigestAlgorithm;
use pades_pdf::{DssContent, PdfDocument, SignatureUtil};
use pretty_assertions::assert_eq;

fn baseline_b(pki: &TestPki) -> Vec<u8> {
    PadesSigner::new(unsigned_pdf(), Vec::new())
        .sign_with_baseline_b_profile(
            SignerProperties::default(),
            &pki.chain(),
            &pki.signature(DigestAlgorithm::Sha256),
        )
        .unwrap()
}

#[test]
fn test_prolong_adds_evidence() {
    let pki = TestPki::generate().unwrap();
    let signed = baseline_b(&pki);

    let out = signer_with_clients(signed.clone(), &pki)
        .prolong_signatures()
        .unwrap();

    assert!(out.starts_with(&signed));
    let doc = PdfDocument::load(out).unwrap();
    SignatureUtil::new(&doc).verify("Signature1").unwrap();
    let dss = DssContent::read(&doc).unwrap();
    assert_chain_covered(&dss, &pki.chain());
    assert_ocsp_responses_complete(&dss);
}

#[test]
fn test_prolong_with_timestamp() {
    let pki = TestPki::generate().unwrap();
    let tsa = TestTsaClient::new(&pki).unwrap();

    let out = signer_with_clients(baseline_b(&pki), &pki)
        .prolong_signatures_with_timestamp(&tsa)
        .unwrap();

    let doc = PdfDocument::load(out).unwrap();
    let util = SignatureUtil::new(&doc);
    let names = util.signature_names().unwrap();
    assert_eq!(names.len(), 2);
    let stamp = util.verify(&names[1]).unwrap();
    assert!(stamp.is_document_timestamp);
    assert!(stamp.covers_whole_document);
}

#[test]
fn test_prolong_covers_document_timestamps() {
    let pki = TestPki::generate().unwrap();
    let tsa = TestTsaClient::new(&pki).unwrap();

    let lta = signer_with_clients(unsigned_pdf(), &pki)
        .sign_with_baseline_lta_profile(
            SignerProperties::default(),
            &pki.chain(),
            &pki.signature(DigestAlgorithm::Sha256),
            &tsa,
        )
        .unwrap();

    let out = signer_with_clients(lta, &pki)
        .set_timestamp_signature_name("Renewal")
        .prolong_signatures_with_timestamp(&tsa)
        .unwrap();

    let doc = PdfDocument::load(out).unwrap();
    let dss = DssContent::read(&doc).unwrap();
    // Original signature and the first archive timestamp
    assert_eq!(dss.vri_keys.len(), 2);
    assert_chain_covered(&dss, &[tsa.certificate().clone(), pki.root.clone()]);
    assert!(SignatureUtil::new(&doc).verify("Renewal").unwrap().covers_whole_document);
}

#[test]
fn test_prolong_unsigned_document() {
    let pki = TestPki::generate().unwrap();
    let tsa = TestTsaClient::new(&pki).unwrap();
    let mut output = Vec::new();

    let err = PadesSigner::new(unsigned_pdf(), &mut output)
        .prolong_signatures_with_timestamp(&tsa)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Domain);
    assert_eq!(err.to_string(), "no signatures to prolong");
    assert!(output.is_empty());
    assert_eq!(tsa.requests(), 0);
}

#[test]
fn test_failed_stage_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let pki = TestPki::generate().unwrap();
    let tsa = TestTsaClient::new(&pki).unwrap();
    let mut output = Vec::new();

    // Silent OCSP and no CRL client: the LTV stage fails after signing
    let err = PadesSigner::new(unsigned_pdf(), &mut output)
        .set_temporary_directory(dir.path())
        .set_ocsp_client(std::sync::Arc::new(
            pades_crypto::testing::TestOcspClient::silent(),
        ))
        .set_crl_client(std::sync::Arc::new(NoCrls))
        .sign_with_baseline_lta_profile(
            SignerProperties::default(),
            &pki.chain(),
            &pki.signature(DigestAlgorithm::Sha256),
            &tsa,
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Security);
    assert!(output.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

struct NoCrls;

impl pades_crypto::CrlClient for NoCrls {
    fn get_encoded(
        &self,
        _cert: &pades_crypto::Certificate,
        _url: Option<&str>,
    ) -> pades_crypto::Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }
}
