//! PAdES baseline profile orchestration
//!
//! [`PadesSigner`] sequences the signing stages of each profile:
//!
//! - B: detached CAdES signature
//! - T: B with a signature timestamp
//! - LT: T, then revocation evidence for the chain in the DSS
//! - LTA: LT, then a document timestamp over the evidence
//!
//! Every later stage appends a revision to the previous stage's output,
//! staged through [`TempStorage`]. Only the last stage writes to the caller's
//! output, and each profile consumes the signer so the output is released on
//! every path.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument};

use pades_crypto::{
    Certificate, CrlClient, CryptoProvider, DigestAlgorithm, ExternalDigest, ExternalSignature,
    GeneralProvider, OcspClient, PrivateKeySignature, ProviderDigest, SigningKey, TsaClient,
};
use pades_pdf::{PdfDocument, PdfSigner, SignatureUtil, SignerProperties};

use crate::config::PadesConfig;
use crate::error::{PadesError, Result};
use crate::ltv::{CertificateInclusion, CertificateOption, Level, LtvVerification};
use crate::revocation::RevocationClients;
use crate::temp::TempStorage;
use crate::timestamp::apply_document_timestamp;

/// Digest used by the private-key convenience methods
pub const DEFAULT_DIGEST_ALGORITHM: DigestAlgorithm = DigestAlgorithm::Sha512;

/// Settings shared by every stage of a signing session
struct Settings {
    provider: Arc<dyn CryptoProvider>,
    temporary_directory: Option<PathBuf>,
    timestamp_signature_name: Option<String>,
    estimated_size: usize,
    ocsp_client: Option<Arc<dyn OcspClient>>,
    crl_client: Option<Arc<dyn CrlClient>>,
    external_digest: Option<Arc<dyn ExternalDigest>>,
}

/// Signs one document with a PAdES baseline profile, or prolongs the
/// signatures it already carries.
pub struct PadesSigner<W: Write> {
    document: Vec<u8>,
    output: W,
    settings: Settings,
}

impl<W: Write> PadesSigner<W> {
    pub fn new(document: Vec<u8>, output: W) -> Self {
        Self {
            document,
            output,
            settings: Settings {
                provider: Arc::new(GeneralProvider),
                temporary_directory: None,
                timestamp_signature_name: None,
                estimated_size: 0,
                ocsp_client: None,
                crl_client: None,
                external_digest: None,
            },
        }
    }

    /// Signer with every option of `config` applied
    pub fn from_config(document: Vec<u8>, output: W, config: &PadesConfig) -> Self {
        let provider = config.provider_kind().build();
        let mut signer = Self::new(document, output)
            .set_crypto_provider(Arc::clone(&provider))
            .set_estimated_size(config.estimated_size);
        if let Some(dir) = &config.temporary_directory {
            signer = signer.set_temporary_directory(dir.clone());
        }
        if let Some(name) = &config.timestamp_signature_name {
            signer = signer.set_timestamp_signature_name(name.clone());
        }
        if let Some(ocsp) = config.ocsp_client(&provider) {
            signer = signer.set_ocsp_client(Arc::new(ocsp));
        }
        if let Some(crl) = config.crl_client(&provider) {
            signer = signer.set_crl_client(Arc::new(crl));
        }
        signer
    }

    pub fn set_crypto_provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.settings.provider = provider;
        self
    }

    /// Stage intermediate outputs as files in `path` instead of memory
    pub fn set_temporary_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.temporary_directory = Some(path.into());
        self
    }

    /// Field name for LTA and prolong document timestamps
    pub fn set_timestamp_signature_name(mut self, name: impl Into<String>) -> Self {
        self.settings.timestamp_signature_name = Some(name.into());
        self
    }

    /// Bytes reserved for the signature container; 0 computes it
    pub fn set_estimated_size(mut self, size: usize) -> Self {
        self.settings.estimated_size = size;
        self
    }

    pub fn set_ocsp_client(mut self, client: Arc<dyn OcspClient>) -> Self {
        self.settings.ocsp_client = Some(client);
        self
    }

    pub fn set_crl_client(mut self, client: Arc<dyn CrlClient>) -> Self {
        self.settings.crl_client = Some(client);
        self
    }

    /// Digest implementation for hashing the document and the `_with_key`
    /// signatures
    pub fn set_external_digest(mut self, digest: Arc<dyn ExternalDigest>) -> Self {
        self.settings.external_digest = Some(digest);
        self
    }

    /// Baseline-B: a detached CAdES signature
    #[instrument(skip_all, fields(profile = "B"))]
    pub fn sign_with_baseline_b_profile(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        signature: &dyn ExternalSignature,
    ) -> Result<W> {
        let PadesSigner { document, output, settings } = self;
        info!("signing");
        let (output, name) = settings.perform_signing(document, output, properties, chain, signature, None)?;
        info!(signature = %name, "signed");
        Ok(output)
    }

    pub fn sign_with_baseline_b_profile_with_key(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        key: &SigningKey,
    ) -> Result<W> {
        let signature = self.settings.key_signature(key);
        self.sign_with_baseline_b_profile(properties, chain, &signature)
    }

    /// Baseline-T: B with the signature value timestamped
    #[instrument(skip_all, fields(profile = "T"))]
    pub fn sign_with_baseline_t_profile(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        signature: &dyn ExternalSignature,
        tsa: &dyn TsaClient,
    ) -> Result<W> {
        let PadesSigner { document, output, settings } = self;
        info!("signing");
        let (output, name) =
            settings.perform_signing(document, output, properties, chain, signature, Some(tsa))?;
        info!(signature = %name, "signed");
        Ok(output)
    }

    pub fn sign_with_baseline_t_profile_with_key(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        key: &SigningKey,
        tsa: &dyn TsaClient,
    ) -> Result<W> {
        let signature = self.settings.key_signature(key);
        self.sign_with_baseline_t_profile(properties, chain, &signature, tsa)
    }

    /// Baseline-LT: T, then OCSP/CRL evidence for the chain in the DSS
    #[instrument(skip_all, fields(profile = "LT"))]
    pub fn sign_with_baseline_lt_profile(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        signature: &dyn ExternalSignature,
        tsa: &dyn TsaClient,
    ) -> Result<W> {
        let PadesSigner { document, output, settings } = self;
        let clients = settings.revocation_clients(chain, true)?;
        info!("signing");

        let mut storage = settings.temp_storage();
        let staged = storage.allocate()?;
        let (staged, name) =
            settings.perform_signing(document, staged, properties, chain, signature, Some(tsa))?;
        let signed = PdfDocument::load(storage.reopen(staged)?)?;

        let output = settings.perform_ltv(&signed, output, &clients, &[name])?;
        info!("signed");
        Ok(output)
    }

    pub fn sign_with_baseline_lt_profile_with_key(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        key: &SigningKey,
        tsa: &dyn TsaClient,
    ) -> Result<W> {
        let signature = self.settings.key_signature(key);
        self.sign_with_baseline_lt_profile(properties, chain, &signature, tsa)
    }

    /// Baseline-LTA: LT, then a document timestamp sealing the evidence
    #[instrument(skip_all, fields(profile = "LTA"))]
    pub fn sign_with_baseline_lta_profile(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        signature: &dyn ExternalSignature,
        tsa: &dyn TsaClient,
    ) -> Result<W> {
        let PadesSigner { document, output, settings } = self;
        let clients = settings.revocation_clients(chain, true)?;
        info!("signing");

        let mut storage = settings.temp_storage();
        let staged = storage.allocate()?;
        let (staged, name) =
            settings.perform_signing(document, staged, properties, chain, signature, Some(tsa))?;
        let signed = PdfDocument::load(storage.reopen(staged)?)?;

        let staged = storage.allocate()?;
        let staged = settings.perform_ltv(&signed, staged, &clients, &[name])?;
        let with_evidence = storage.reopen(staged)?;

        let output = apply_document_timestamp(
            with_evidence,
            output,
            tsa,
            settings.timestamp_signature_name.as_deref(),
        )?;
        info!("signed");
        Ok(output)
    }

    pub fn sign_with_baseline_lta_profile_with_key(
        self,
        properties: SignerProperties,
        chain: &[Certificate],
        key: &SigningKey,
        tsa: &dyn TsaClient,
    ) -> Result<W> {
        let signature = self.settings.key_signature(key);
        self.sign_with_baseline_lta_profile(properties, chain, &signature, tsa)
    }

    /// Add revocation evidence for every existing signature
    #[instrument(skip_all)]
    pub fn prolong_signatures(self) -> Result<W> {
        self.prolong(None)
    }

    /// Add revocation evidence for every existing signature, then seal it
    /// with a document timestamp
    #[instrument(skip_all)]
    pub fn prolong_signatures_with_timestamp(self, tsa: &dyn TsaClient) -> Result<W> {
        self.prolong(Some(tsa))
    }

    fn prolong(self, tsa: Option<&dyn TsaClient>) -> Result<W> {
        let PadesSigner { document, output, settings } = self;
        let document = PdfDocument::load(document)?;
        let util = SignatureUtil::new(&document);
        let names = util.signature_names()?;
        if names.is_empty() {
            return Err(PadesError::Domain("no signatures to prolong".to_string()));
        }

        // Default clients are bound to the certificates already in the document
        let certificates = util.certificates()?;
        let clients = settings.revocation_clients(&certificates, false)?;
        info!(signatures = names.len(), "prolonging signatures");

        match tsa {
            None => settings.perform_ltv(&document, output, &clients, &names),
            Some(tsa) => {
                let mut storage = settings.temp_storage();
                let staged = storage.allocate()?;
                let staged = settings.perform_ltv(&document, staged, &clients, &names)?;
                let with_evidence = storage.reopen(staged)?;
                apply_document_timestamp(
                    with_evidence,
                    output,
                    tsa,
                    settings.timestamp_signature_name.as_deref(),
                )
            }
        }
    }
}

impl Settings {
    fn digest(&self) -> Arc<dyn ExternalDigest> {
        match &self.external_digest {
            Some(digest) => Arc::clone(digest),
            None => Arc::new(ProviderDigest::new(Arc::clone(&self.provider))),
        }
    }

    fn key_signature(&self, key: &SigningKey) -> PrivateKeySignature {
        PrivateKeySignature::new(key.clone(), DEFAULT_DIGEST_ALGORITHM, self.digest())
    }

    fn temp_storage(&self) -> TempStorage {
        TempStorage::new(self.temporary_directory.clone())
    }

    fn revocation_clients(&self, chain: &[Certificate], required: bool) -> Result<RevocationClients> {
        RevocationClients::resolve(
            self.ocsp_client.clone(),
            self.crl_client.clone(),
            chain,
            &self.provider,
            required,
        )
    }

    /// Sign `document` into `output`, returning the field name used
    fn perform_signing<O: Write>(
        &self,
        document: Vec<u8>,
        output: O,
        properties: SignerProperties,
        chain: &[Certificate],
        signature: &dyn ExternalSignature,
        tsa: Option<&dyn TsaClient>,
    ) -> Result<(O, String)> {
        let signer = PdfSigner::new(document, output, properties)?;
        let name = signer.field_name().to_string();
        let digest = self.digest();
        let output =
            signer.sign_detached(digest.as_ref(), signature, chain, tsa, self.estimated_size)?;
        Ok((output, name))
    }

    /// Collect evidence for `names` and append it to `document`
    fn perform_ltv<O: Write>(
        &self,
        document: &PdfDocument,
        output: O,
        clients: &RevocationClients,
        names: &[String],
    ) -> Result<O> {
        let mut ltv = LtvVerification::new(document);
        for name in names {
            ltv.add_verification(
                name,
                clients.ocsp.as_ref(),
                clients.crl.as_ref(),
                CertificateOption::WholeChain,
                Level::OcspOptionalCrl,
                CertificateInclusion::Yes,
            )?;
        }
        ltv.merge(output)
    }
}
