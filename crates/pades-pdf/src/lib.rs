//! PDF structure for PAdES signing
//!
//! Loads documents, appends incremental revisions, injects CMS signatures
//! and document timestamps, and maintains the Document Security Store.

pub mod document;
pub mod dss;
pub mod error;
pub mod incremental;
pub mod signatures;
pub mod signer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use document::PdfDocument;
pub use dss::{append_dss, vri_key, DssContent, DssUpdate, VriEntry};
pub use error::{PdfError, Result};
pub use incremental::IncrementalUpdate;
pub use signatures::{EmbeddedSignature, SignatureUtil, VerifiedSignature};
pub use signer::{PdfSigner, SignerProperties};
