//! Long-term validation evidence
//!
//! [`LtvVerification`] gathers OCSP responses, CRLs and certificates for
//! each named signature, then writes them all to the DSS in a single
//! appended revision. Nothing is written unless every signature's evidence
//! was collected.

use std::io::Write;

use tracing::{debug, info, warn};

use pades_crypto::cert::find_issuer;
use pades_crypto::cms::parse_signed_data;
use pades_crypto::ocsp::build_ocsp_response;
use pades_crypto::{Certificate, CrlClient, OcspClient};
use pades_pdf::{append_dss, vri_key, DssUpdate, PdfDocument, SignatureUtil, VriEntry};

use crate::error::{PadesError, Result};

/// Which certificates of a signature's chain are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateOption {
    SigningCertificate,
    WholeChain,
}

/// Which kinds of revocation evidence are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Ocsp,
    Crl,
    OcspCrl,
    /// OCSP, with CRLs only where no OCSP response was obtained
    OcspOptionalCrl,
}

impl Level {
    fn wants_ocsp(self) -> bool {
        !matches!(self, Level::Crl)
    }

    fn wants_crl(self, have_ocsp: bool) -> bool {
        match self {
            Level::Ocsp => false,
            Level::Crl | Level::OcspCrl => true,
            Level::OcspOptionalCrl => !have_ocsp,
        }
    }
}

/// Whether the checked certificates are stored alongside the evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateInclusion {
    Yes,
    No,
}

/// Evidence collection for the signatures of one document
pub struct LtvVerification<'a> {
    document: &'a PdfDocument,
    update: DssUpdate,
}

impl<'a> LtvVerification<'a> {
    pub fn new(document: &'a PdfDocument) -> Self {
        Self {
            document,
            update: DssUpdate::new(),
        }
    }

    /// Collect evidence for the signature in field `name`.
    ///
    /// Fails when a certificate other than a self-issued root ends up with
    /// no OCSP response and no CRL.
    pub fn add_verification(
        &mut self,
        name: &str,
        ocsp: &dyn OcspClient,
        crl: &dyn CrlClient,
        option: CertificateOption,
        level: Level,
        inclusion: CertificateInclusion,
    ) -> Result<()> {
        let signature = SignatureUtil::new(self.document).signature(name)?;
        let signed = parse_signed_data(signature.container()?)?;
        let chain = signed.chain();
        let key = vri_key(&signature.contents)?;

        let checked = match option {
            CertificateOption::SigningCertificate => &chain[..1],
            CertificateOption::WholeChain => &chain[..],
        };

        let mut entry = VriEntry::default();
        for cert in checked {
            let issuer = find_issuer(cert, &chain).or_else(|| find_issuer(cert, &signed.certificates));
            let evidence = collect_evidence(cert, issuer, ocsp, crl, level)?;
            if evidence.is_empty() && !cert.is_self_issued() {
                return Err(PadesError::Security(format!(
                    "no revocation evidence for {} in signature {}",
                    cert.subject_name(),
                    name
                )));
            }
            entry.ocsps.extend(evidence.ocsps);
            entry.crls.extend(evidence.crls);
        }
        if inclusion == CertificateInclusion::Yes {
            entry.certs = chain.iter().map(|c| c.der().to_vec()).collect();
        }

        debug!(
            signature = name,
            vri = %key,
            ocsps = entry.ocsps.len(),
            crls = entry.crls.len(),
            certs = entry.certs.len(),
            "collected revocation evidence"
        );
        let target = self.update.entry(key);
        target.certs.extend(entry.certs);
        target.ocsps.extend(entry.ocsps);
        target.crls.extend(entry.crls);
        Ok(())
    }

    /// Append the collected evidence as a new revision
    pub fn merge<W: Write>(self, output: W) -> Result<W> {
        info!(signatures = self.update.vri.len(), "merging evidence into DSS");
        Ok(append_dss(self.document, &self.update, output)?)
    }
}

/// OCSP and CRL evidence for one certificate
fn collect_evidence(
    cert: &Certificate,
    issuer: Option<&Certificate>,
    ocsp: &dyn OcspClient,
    crl: &dyn CrlClient,
    level: Level,
) -> Result<VriEntry> {
    let mut evidence = VriEntry::default();

    if level.wants_ocsp() {
        // The DSS holds full OCSPResponse structures
        if let Some(basic) = ocsp.get_encoded(cert, issuer, None)? {
            evidence.ocsps.push(build_ocsp_response(&basic));
        }
    }

    let have_ocsp = !evidence.ocsps.is_empty();
    if level.wants_crl(have_ocsp) {
        if level == Level::OcspOptionalCrl && !cert.is_self_issued() {
            warn!(subject = %cert.subject_name(), "no OCSP response, falling back to CRL");
        }
        evidence.crls = crl.get_encoded(cert, None)?;
    }
    Ok(evidence)
}
