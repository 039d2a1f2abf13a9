//! PAdES signing orchestrator
//!
//! Signs PDFs with the baseline B, T, LT and LTA profiles, extends existing
//! signatures with revocation evidence and archive timestamps, and protects
//! encrypted PDF 2.0 documents with a MAC.
//!
//! ```no_run
//! use pades_core::{PadesSigner, SignerProperties};
//! use pades_crypto::{EphemeralIdentity, HttpTsaClient};
//!
//! # fn example() -> pades_core::Result<()> {
//! let identity = EphemeralIdentity::generate("Signer")?;
//! let tsa = HttpTsaClient::new("https://tsa.example.com/tsr")?;
//! let pdf = std::fs::read("contract.pdf")?;
//! let output = std::fs::File::create("contract-signed.pdf")?;
//!
//! PadesSigner::new(pdf, output)
//!     .set_temporary_directory(std::env::temp_dir())
//!     .sign_with_baseline_lta_profile_with_key(
//!         SignerProperties::default().with_reason("Approved"),
//!         &[identity.certificate().clone()],
//!         identity.signing_key(),
//!         &tsa,
//!     )?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ltv;
pub mod mac;
pub mod revocation;
pub mod signer;
pub mod temp;
pub mod timestamp;

pub use config::{CryptoProviderSetting, PadesConfig};
pub use error::{ErrorKind, PadesError, Result};
pub use ltv::{CertificateInclusion, CertificateOption, Level, LtvVerification};
pub use mac::{
    EncryptionAlgorithm, EncryptionScheme, EncryptionSettings, KeyWrappingAlgorithm, MacAlgorithm,
    MacDigestAlgorithm, MacIntegrityProtector, MacProperties, PdfVersion,
};
pub use revocation::RevocationClients;
pub use signer::PadesSigner;
pub use temp::{TempOutput, TempStorage};
pub use timestamp::apply_document_timestamp;

pub use pades_pdf::SignerProperties;
