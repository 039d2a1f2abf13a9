//! Document timestamps

use std::io::Write;

use tracing::info;

use pades_crypto::TsaClient;
use pades_pdf::{PdfSigner, SignerProperties};

use crate::error::Result;

/// Append an RFC 3161 document timestamp to `document`, writing to `output`.
///
/// `name` picks the timestamp field; `None` generates one. TSA failures
/// propagate without anything being written.
pub fn apply_document_timestamp<W: Write>(
    document: Vec<u8>,
    output: W,
    tsa: &dyn TsaClient,
    name: Option<&str>,
) -> Result<W> {
    let properties = match name {
        Some(name) => SignerProperties::default().with_field_name(name),
        None => SignerProperties::default(),
    };
    let signer = PdfSigner::new(document, output, properties)?;
    info!(field = signer.field_name(), "applying document timestamp");
    Ok(signer.timestamp(tsa)?)
}
