//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use pades_core::PadesSigner;
use pades_crypto::asn1;
use pades_crypto::ocsp::{check_basic_response, CertStatus};
use pades_crypto::testing::{TestCrlClient, TestOcspClient, TestPki};
use pades_crypto::{Certificate, CryptoProvider, GeneralProvider};
use pades_pdf::testing::minimal_pdf;
use pades_pdf::DssContent;

/// Route crate logs to the test output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pades_core=debug,pades_pdf=debug")
        .with_test_writer()
        .try_init();
}

pub fn unsigned_pdf() -> Vec<u8> {
    minimal_pdf("1.7", 2).expect("fixture PDF")
}

/// Signer over `pdf` with canned revocation clients for `pki`
pub fn signer_with_clients(pdf: Vec<u8>, pki: &TestPki) -> PadesSigner<Vec<u8>> {
    PadesSigner::new(pdf, Vec::new())
        .set_ocsp_client(Arc::new(TestOcspClient::new(pki)))
        .set_crl_client(Arc::new(TestCrlClient::new(pki)))
}

/// Whether the DSS holds an OCSP response or CRL covering `cert`
pub fn has_evidence(dss: &DssContent, cert: &Certificate, issuer: &Certificate) -> bool {
    let ocsp = dss.ocsps.iter().any(|response| {
        GeneralProvider
            .decode_ocsp_response(response)
            .and_then(|basic| check_basic_response(&basic, cert, issuer))
            .is_ok_and(|status| status == CertStatus::Good)
    });
    let issuer_name = issuer.subject_der().expect("issuer name");
    let crl = dss
        .crls
        .iter()
        .any(|crl| crl.windows(issuer_name.len()).any(|w| w == issuer_name.as_slice()));
    ocsp || crl
}

/// Every non-root certificate of `chain` is covered by the DSS
pub fn assert_chain_covered(dss: &DssContent, chain: &[Certificate]) {
    for pair in chain.windows(2) {
        let (cert, issuer) = (&pair[0], &pair[1]);
        assert!(
            has_evidence(dss, cert, issuer),
            "no revocation evidence for {}",
            cert.subject_name()
        );
    }
    for cert in chain {
        assert!(
            dss.certs.iter().any(|der| der.as_slice() == cert.der()),
            "certificate {} missing from DSS",
            cert.subject_name()
        );
    }
}

/// Every DSS OCSP entry is a full OCSPResponse with status `successful`
pub fn assert_ocsp_responses_complete(dss: &DssContent) {
    for response in &dss.ocsps {
        // OCSPResponse ::= SEQUENCE { responseStatus ENUMERATED, ... }
        let outer = asn1::read_single(response, "OCSPResponse").expect("DER");
        assert_eq!(outer.tag, asn1::TAG_SEQUENCE);
        let parts = outer.children().expect("OCSPResponse fields");
        assert_eq!(parts[0].tag, asn1::TAG_ENUMERATED, "DSS entry is not an OCSPResponse");
        GeneralProvider
            .decode_ocsp_response(response)
            .expect("successful OCSPResponse");
    }
}
