//! Resolution of the OCSP and CRL clients used for LTV evidence

use std::sync::Arc;

use tracing::debug;

use pades_crypto::{
    Certificate, CrlClient, CrlClientOnline, CryptoProvider, OcspClient, OcspClientOnline,
};

use crate::error::{PadesError, Result};

/// The OCSP and CRL sources for one signing or prolong call
#[derive(Clone)]
pub struct RevocationClients {
    pub ocsp: Arc<dyn OcspClient>,
    pub crl: Arc<dyn CrlClient>,
}

impl std::fmt::Debug for RevocationClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationClients").finish_non_exhaustive()
    }
}

impl RevocationClients {
    /// Use the configured clients, filling gaps with online clients bound to
    /// `chain`.
    ///
    /// With `required` set and nothing configured, the leaf certificate must
    /// name an OCSP responder or a CRL distribution point. Defaults never
    /// touch the network here.
    pub fn resolve(
        ocsp: Option<Arc<dyn OcspClient>>,
        crl: Option<Arc<dyn CrlClient>>,
        chain: &[Certificate],
        provider: &Arc<dyn CryptoProvider>,
        required: bool,
    ) -> Result<Self> {
        if let (Some(ocsp), Some(crl)) = (&ocsp, &crl) {
            return Ok(Self {
                ocsp: Arc::clone(ocsp),
                crl: Arc::clone(crl),
            });
        }

        if required && ocsp.is_none() && crl.is_none() {
            let has_sources = chain.first().is_some_and(Certificate::has_revocation_urls);
            if !has_sources {
                return Err(PadesError::Config(
                    "default clients cannot be created: the signing certificate names no OCSP \
                     responder or CRL distribution point, set an OCSP or CRL client explicitly"
                        .to_string(),
                ));
            }
        }

        let ocsp = ocsp.unwrap_or_else(|| {
            debug!("using default online OCSP client");
            Arc::new(OcspClientOnline::new(Arc::clone(provider)))
        });
        let crl = crl.unwrap_or_else(|| {
            debug!(chain = chain.len(), "using default online CRL client");
            Arc::new(CrlClientOnline::from_chain(Arc::clone(provider), chain))
        });
        Ok(Self { ocsp, crl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pades_crypto::testing::{TestCrlClient, TestOcspClient, TestPki};
    use pades_crypto::GeneralProvider;

    fn provider() -> Arc<dyn CryptoProvider> {
        Arc::new(GeneralProvider)
    }

    #[test]
    fn test_configured_clients_used_verbatim() {
        let pki = TestPki::generate_without_urls().unwrap();
        let ocsp: Arc<dyn OcspClient> = Arc::new(TestOcspClient::new(&pki));
        let crl: Arc<dyn CrlClient> = Arc::new(TestCrlClient::new(&pki));
        let clients = RevocationClients::resolve(
            Some(Arc::clone(&ocsp)),
            Some(Arc::clone(&crl)),
            &pki.chain(),
            &provider(),
            true,
        )
        .unwrap();
        assert!(Arc::ptr_eq(&clients.ocsp, &ocsp));
        assert!(Arc::ptr_eq(&clients.crl, &crl));
    }

    #[test]
    fn test_no_sources_fails() {
        let pki = TestPki::generate_without_urls().unwrap();
        let err = RevocationClients::resolve(None, None, &pki.chain(), &provider(), true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("default clients cannot be created"));
    }

    #[test]
    fn test_defaults_from_certificate_urls() {
        let pki = TestPki::generate().unwrap();
        assert!(RevocationClients::resolve(None, None, &pki.chain(), &provider(), true).is_ok());
    }

    #[test]
    fn test_one_configured_client_is_enough() {
        let pki = TestPki::generate_without_urls().unwrap();
        let crl: Arc<dyn CrlClient> = Arc::new(TestCrlClient::new(&pki));
        assert!(
            RevocationClients::resolve(None, Some(crl), &pki.chain(), &provider(), true).is_ok()
        );
    }

    #[test]
    fn test_not_required_skips_leaf_check() {
        assert!(RevocationClients::resolve(None, None, &[], &provider(), false).is_ok());
    }
}
