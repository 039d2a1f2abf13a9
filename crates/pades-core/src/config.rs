//! Signer configuration
//!
//! Everything the fluent setters of [`crate::PadesSigner`] accept can also be
//! loaded from TOML:
//!
//! ```toml
//! temporary_directory = "/var/tmp/pades"
//! timestamp_signature_name = "ArchiveTimestamp"
//! estimated_size = 0
//! crypto_provider = "fips"
//! tsa_url = "https://tsa.example.com/tsr"
//! ocsp_url = "http://ocsp.example.com"
//! crl_urls = ["http://crl.example.com/ca.crl"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pades_crypto::{CrlClientOnline, CryptoProvider, HttpTsaClient, OcspClientOnline, ProviderKind};

use crate::error::{PadesError, Result};

/// Crypto backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoProviderSetting {
    #[default]
    General,
    Fips,
}

impl From<CryptoProviderSetting> for ProviderKind {
    fn from(setting: CryptoProviderSetting) -> Self {
        match setting {
            CryptoProviderSetting::General => ProviderKind::General,
            CryptoProviderSetting::Fips => ProviderKind::Fips,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadesConfig {
    /// Stage outputs go to files here instead of memory
    pub temporary_directory: Option<PathBuf>,
    /// Field name of LTA and prolong document timestamps
    pub timestamp_signature_name: Option<String>,
    /// Bytes reserved for the signature container; 0 computes it
    pub estimated_size: usize,
    pub crypto_provider: CryptoProviderSetting,
    pub tsa_url: Option<String>,
    /// Fixed OCSP responder, overriding certificate AIA
    pub ocsp_url: Option<String>,
    /// Fixed CRL locations, overriding certificate distribution points
    pub crl_urls: Vec<String>,
}

impl PadesConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PadesError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| PadesError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.crypto_provider.into()
    }

    /// HTTP TSA client for `tsa_url`, if set
    pub fn tsa_client(&self) -> Result<Option<HttpTsaClient>> {
        self.tsa_url
            .as_deref()
            .map(|url| HttpTsaClient::new(url).map_err(PadesError::from))
            .transpose()
    }

    /// OCSP client bound to `ocsp_url`, if set
    pub fn ocsp_client(&self, provider: &Arc<dyn CryptoProvider>) -> Option<OcspClientOnline> {
        self.ocsp_url
            .as_ref()
            .map(|url| OcspClientOnline::new(Arc::clone(provider)).with_url(url.clone()))
    }

    /// CRL client bound to `crl_urls`, if any
    pub fn crl_client(&self, provider: &Arc<dyn CryptoProvider>) -> Option<CrlClientOnline> {
        if self.crl_urls.is_empty() {
            return None;
        }
        Some(CrlClientOnline::new(Arc::clone(provider), self.crl_urls.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(PadesConfig::from_toml("").unwrap(), PadesConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = PadesConfig::from_toml(
            r#"
            temporary_directory = "/var/tmp/pades"
            timestamp_signature_name = "Archive"
            estimated_size = 20000
            crypto_provider = "fips"
            tsa_url = "https://tsa.example.com/tsr"
            ocsp_url = "http://ocsp.example.com"
            crl_urls = ["http://crl.example.com/ca.crl"]
            "#,
        )
        .unwrap();

        assert_eq!(config.temporary_directory, Some(PathBuf::from("/var/tmp/pades")));
        assert_eq!(config.timestamp_signature_name.as_deref(), Some("Archive"));
        assert_eq!(config.estimated_size, 20000);
        assert_eq!(config.provider_kind(), ProviderKind::Fips);

        let provider = config.provider_kind().build();
        assert!(provider.is_fips());
        assert!(config.ocsp_client(&provider).is_some());
        assert!(config.crl_client(&provider).is_some());
        let tsa = config.tsa_client().unwrap().unwrap();
        assert_eq!(tsa.url(), "https://tsa.example.com/tsr");
    }

    #[test]
    fn test_invalid_values() {
        let err = PadesConfig::from_toml("crypto_provider = \"quantum\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let config = PadesConfig::from_toml("tsa_url = \"not a url\"").unwrap();
        assert!(config.tsa_client().is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PadesConfig::from_file(dir.path().join("pades.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = PadesConfig {
            estimated_size: 4096,
            crl_urls: vec!["http://crl.example.com/a.crl".to_string()],
            ..PadesConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(PadesConfig::from_toml(&text).unwrap(), config);
    }
}
