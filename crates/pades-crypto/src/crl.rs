//! CRL client
//!
//! [`CrlClientOnline`] downloads CRLs from distribution points. URLs are
//! resolved when a CRL is requested, never in the constructor, so building
//! a client cannot fail and performs no network access.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cert::Certificate;
use crate::error::{CryptoError, Result};
use crate::provider::CryptoProvider;

const MAX_CRL_BYTES: u64 = 10_000_000;

/// Source of DER-encoded CRLs
pub trait CrlClient: Send + Sync {
    /// CRLs covering `cert`. An empty list means none could be located.
    fn get_encoded(&self, cert: &Certificate, url: Option<&str>) -> Result<Vec<Vec<u8>>>;
}

/// CRL client fetching over HTTP
pub struct CrlClientOnline {
    provider: Arc<dyn CryptoProvider>,
    urls: Vec<String>,
    chain: Vec<Certificate>,
}

impl CrlClientOnline {
    /// Client with a fixed set of distribution point URLs
    pub fn new(provider: Arc<dyn CryptoProvider>, urls: Vec<String>) -> Self {
        Self {
            provider,
            urls,
            chain: Vec::new(),
        }
    }

    /// Client falling back to the distribution points of `chain`
    pub fn from_chain(provider: Arc<dyn CryptoProvider>, chain: &[Certificate]) -> Self {
        Self {
            provider,
            urls: Vec::new(),
            chain: chain.to_vec(),
        }
    }

    /// URLs to try for `cert`, most specific first, without duplicates
    pub fn candidate_urls(&self, cert: &Certificate, url: Option<&str>) -> Vec<String> {
        if let Some(url) = url {
            return vec![url.to_string()];
        }

        let mut urls: Vec<String> = Vec::new();
        let candidates = cert
            .crl_urls()
            .into_iter()
            .chain(self.urls.iter().cloned())
            .chain(self.chain.iter().flat_map(|c| c.crl_urls()));
        for candidate in candidates {
            if !urls.contains(&candidate) {
                urls.push(candidate);
            }
        }
        urls
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = ureq::get(url).call().map_err(|e| CryptoError::http(url, e))?;
        if response.status() != 200 {
            return Err(CryptoError::HttpStatus(
                response.status(),
                response.content_type().to_string(),
            ));
        }

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_CRL_BYTES)
            .read_to_end(&mut body)?;
        self.provider.decode_crl(&body)
    }
}

impl CrlClient for CrlClientOnline {
    #[instrument(skip_all, fields(subject = %cert.subject_name()))]
    fn get_encoded(&self, cert: &Certificate, url: Option<&str>) -> Result<Vec<Vec<u8>>> {
        let urls = self.candidate_urls(cert, url);
        if urls.is_empty() {
            debug!("no CRL distribution point");
            return Ok(Vec::new());
        }

        let mut crls = Vec::new();
        let mut last_error = None;
        for url in &urls {
            match self.fetch(url) {
                Ok(crl) => {
                    debug!(%url, bytes = crl.len(), "downloaded CRL");
                    crls.push(crl);
                }
                Err(e) => {
                    warn!(%url, error = %e, "CRL download failed");
                    last_error = Some(e);
                }
            }
        }

        match (crls.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(crls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::GeneralProvider;
    use crate::testing::TestPki;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_own_distribution_point_first() {
        let pki = TestPki::generate().unwrap();
        let client = CrlClientOnline::from_chain(Arc::new(GeneralProvider), &pki.chain());

        let urls = client.candidate_urls(&pki.leaf, None);
        assert_eq!(urls[0], pki.leaf.crl_urls()[0]);
        // Intermediate's distribution point follows
        assert!(urls.contains(&pki.intermediate.crl_urls()[0]));
    }

    #[test]
    fn test_explicit_url_wins() {
        let pki = TestPki::generate().unwrap();
        let client = CrlClientOnline::from_chain(Arc::new(GeneralProvider), &pki.chain());
        assert_eq!(
            client.candidate_urls(&pki.leaf, Some("http://crl.example.test/x.crl")),
            vec!["http://crl.example.test/x.crl".to_string()]
        );
    }

    #[test]
    fn test_construction_is_lazy() {
        let pki = TestPki::generate_without_urls().unwrap();
        let client = CrlClientOnline::from_chain(Arc::new(GeneralProvider), &pki.chain());
        assert!(client.candidate_urls(&pki.leaf, None).is_empty());
        assert!(client.get_encoded(&pki.leaf, None).unwrap().is_empty());
    }

    #[test]
    fn test_fixed_urls() {
        let pki = TestPki::generate_without_urls().unwrap();
        let client = CrlClientOnline::new(
            Arc::new(GeneralProvider),
            vec!["http://crl.example.test/a.crl".to_string()],
        );
        assert_eq!(client.candidate_urls(&pki.leaf, None).len(), 1);
    }
}
