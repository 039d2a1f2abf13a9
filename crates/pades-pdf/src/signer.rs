//! PAdES signature injection into PDFs
//!
//! Every signature is added as a new revision: the signature dictionary,
//! its widget field, the AcroForm and the page annotations are appended
//! after the existing bytes, then the reserved `/Contents` placeholder is
//! filled with the CMS container (or RFC 3161 token for document
//! timestamps).

use std::io::Write;

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, instrument};

use pades_crypto::cms::CmsBuilder;
use pades_crypto::tsa::{build_timestamp_unsigned_attr, TsaClient};
use pades_crypto::{Certificate, CryptoError, ExternalDigest, ExternalSignature};

use crate::document::{find_from, PdfDocument};
use crate::error::{PdfError, Result};
use crate::incremental::IncrementalUpdate;

/// Base reservation for a CMS container before certificates and tokens
pub const BASE_CONTAINER_SIZE: usize = 8192;

/// Room for the attribute wrapping an embedded signature timestamp
const TIMESTAMP_ATTRIBUTE_OVERHEAD: usize = 96;

/// Room around a document timestamp token
const DOCUMENT_TIMESTAMP_OVERHEAD: usize = 32;

/// Wide enough for any offset of a file below 10 GB
pub const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

pub const SUB_FILTER_CADES_DETACHED: &[u8] = b"ETSI.CAdES.detached";
pub const SUB_FILTER_RFC3161: &[u8] = b"ETSI.RFC3161";

/// Appearance and metadata of a new signature field
#[derive(Debug, Clone)]
pub struct SignerProperties {
    /// `None` picks the first free `Signature<N>`
    pub field_name: Option<String>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    /// 1-indexed page holding the widget
    pub page: u32,
    /// [x, y, width, height] in PDF coordinates; zero size is invisible
    pub rect: [f64; 4],
    pub signing_time: DateTime<Utc>,
}

impl Default for SignerProperties {
    fn default() -> Self {
        Self {
            field_name: None,
            reason: None,
            location: None,
            contact_info: None,
            page: 1,
            rect: [0.0; 4],
            signing_time: Utc::now(),
        }
    }
}

impl SignerProperties {
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_rect(mut self, rect: [f64; 4]) -> Self {
        self.rect = rect;
        self
    }

    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = time;
        self
    }
}

/// Container reservation when the caller gives no estimate
pub fn estimate_container_size(chain: &[Certificate], tsa: Option<&dyn TsaClient>) -> usize {
    let certificates: usize = chain.iter().map(|c| c.der().len() + 10).sum();
    let timestamp = tsa
        .map(|t| t.token_size_estimate() + TIMESTAMP_ATTRIBUTE_OVERHEAD)
        .unwrap_or(0);
    BASE_CONTAINER_SIZE + certificates + timestamp
}

/// First `Signature<N>` not among `existing`
pub fn generate_field_name(existing: &[String]) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("Signature{}", n);
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Document bytes with a placeholder-filled `/Contents`
struct PreparedDocument {
    bytes: Vec<u8>,
    /// Offset of `<`
    contents_start: usize,
    /// Offset just past `>`
    contents_end: usize,
}

impl PreparedDocument {
    /// The two byte-range slices covered by the signature
    fn signed_ranges(&self) -> [&[u8]; 2] {
        [
            &self.bytes[..self.contents_start],
            &self.bytes[self.contents_end..],
        ]
    }

    /// Capacity of the placeholder in bytes
    fn capacity(&self) -> usize {
        (self.contents_end - self.contents_start - 2) / 2
    }
}

/// Adds one signature or document timestamp to a PDF, writing the signed
/// revision to `output`.
///
/// Signing consumes the signer, so the output is dropped on every error path
/// and handed back only once fully written.
pub struct PdfSigner<W: Write> {
    document: PdfDocument,
    output: W,
    properties: SignerProperties,
    field_name: String,
}

impl<W: Write> PdfSigner<W> {
    pub fn new(bytes: Vec<u8>, output: W, properties: SignerProperties) -> Result<Self> {
        let document = PdfDocument::load(bytes)?;
        let existing = document.field_names()?;
        let field_name = match &properties.field_name {
            Some(name) if existing.contains(name) => {
                return Err(PdfError::Structure(format!("field {} already exists", name)))
            }
            Some(name) => name.clone(),
            None => generate_field_name(&existing),
        };
        Ok(Self {
            document,
            output,
            properties,
            field_name,
        })
    }

    pub fn document(&self) -> &PdfDocument {
        &self.document
    }

    /// Name of the field the signature will be bound to
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Send the signed document to a different destination
    pub fn redirect_output<O: Write>(self, output: O) -> PdfSigner<O> {
        PdfSigner {
            document: self.document,
            output,
            properties: self.properties,
            field_name: self.field_name,
        }
    }

    /// Add a detached CAdES signature by the first certificate of `chain`.
    ///
    /// With a TSA the signature value is timestamped and the token stored as
    /// an unsigned attribute. `estimated_size` 0 computes a reservation.
    #[instrument(skip_all, fields(field = %self.field_name))]
    pub fn sign_detached(
        self,
        digest: &dyn ExternalDigest,
        signature: &dyn ExternalSignature,
        chain: &[Certificate],
        tsa: Option<&dyn TsaClient>,
        estimated_size: usize,
    ) -> Result<W> {
        let signer_cert = chain
            .first()
            .ok_or_else(|| CryptoError::Certificate("empty certificate chain".to_string()))?;
        let reserved = match estimated_size {
            0 => estimate_container_size(chain, tsa),
            size => size,
        };

        let mut dict = signature_dictionary(b"Sig", SUB_FILTER_CADES_DETACHED, reserved);
        dict.set("Name", text_string(&signer_cert.subject_name()));
        dict.set(
            "M",
            Object::String(pdf_date(&self.properties.signing_time), StringFormat::Literal),
        );
        if let Some(reason) = &self.properties.reason {
            dict.set("Reason", text_string(reason));
        }
        if let Some(location) = &self.properties.location {
            dict.set("Location", text_string(location));
        }
        if let Some(contact) = &self.properties.contact_info {
            dict.set("ContactInfo", text_string(contact));
        }

        let prepared = self.prepare(dict, reserved)?;

        let algorithm = signature.digest_algorithm();
        let [head, tail] = prepared.signed_ranges();
        let document_digest = digest.digest(algorithm, &[head, tail])?;

        let builder = CmsBuilder::detached(algorithm, signer_cert, chain);
        let signed_attrs = builder.signed_attributes(&document_digest)?;
        let signature_value = signature.sign(&signed_attrs)?;

        let unsigned_attrs = match tsa {
            Some(tsa) => {
                let imprint = digest.digest(tsa.digest_algorithm(), &[&signature_value])?;
                let token = tsa.get_timestamp_token(&imprint)?;
                debug!(bytes = token.len(), "received signature timestamp");
                vec![build_timestamp_unsigned_attr(&token)]
            }
            None => Vec::new(),
        };

        let container = builder.build(
            &signed_attrs,
            signature.signature_algorithm_oid(),
            &signature_value,
            &unsigned_attrs,
        )?;
        debug!(container = container.len(), reserved, %algorithm, "built CMS container");

        self.finish(prepared, &container)
    }

    /// Add an RFC 3161 document timestamp covering the whole document
    #[instrument(skip_all, fields(field = %self.field_name))]
    pub fn timestamp(self, tsa: &dyn TsaClient) -> Result<W> {
        let reserved = tsa.token_size_estimate() + DOCUMENT_TIMESTAMP_OVERHEAD;
        let dict = signature_dictionary(b"DocTimeStamp", SUB_FILTER_RFC3161, reserved);
        let prepared = self.prepare(dict, reserved)?;

        let [head, tail] = prepared.signed_ranges();
        let imprint = tsa.digest_algorithm().digest_parts(&[head, tail]);
        let token = tsa.get_timestamp_token(&imprint)?;
        debug!(bytes = token.len(), "received document timestamp");

        self.finish(prepared, &token)
    }

    /// Append the signature revision and fix up `/ByteRange`
    fn prepare(&self, signature: Dictionary, reserved: usize) -> Result<PreparedDocument> {
        let doc = &self.document;
        let page_id = doc
            .page_id(self.properties.page)
            .ok_or_else(|| PdfError::Structure(format!("Page {} not found", self.properties.page)))?;

        let mut update = IncrementalUpdate::new(doc)?;
        let sig_id = update.add(signature);
        let appearance_id = update.add(self.appearance_stream());
        let field_id = update.add(self.field_dictionary(sig_id, page_id, appearance_id));
        self.add_to_acroform(&mut update, field_id)?;
        self.add_to_page_annots(&mut update, page_id, field_id)?;

        let written = update.write(doc.bytes());
        let sig_offset = written
            .offsets
            .get(&sig_id.0)
            .copied()
            .ok_or_else(|| PdfError::Structure("signature dictionary not written".to_string()))?;
        let mut bytes = written.bytes;

        let contents_key = find_from(&bytes, b"/Contents", sig_offset)
            .ok_or_else(|| PdfError::Structure("Could not find /Contents marker".to_string()))?;
        let contents_start = find_from(&bytes, b"<", contents_key)
            .ok_or_else(|| PdfError::Structure("Could not find /Contents value".to_string()))?;
        let contents_end = contents_start + reserved * 2 + 2;
        if bytes.get(contents_end - 1) != Some(&b'>') {
            return Err(PdfError::Structure("malformed /Contents placeholder".to_string()));
        }

        let byte_range = [0, contents_start, contents_end, bytes.len() - contents_end];
        replace_byte_range(&mut bytes, sig_offset, &byte_range)?;
        debug!(?byte_range, "prepared signature revision");

        Ok(PreparedDocument {
            bytes,
            contents_start,
            contents_end,
        })
    }

    /// Write `container` into the placeholder and emit the document
    fn finish(self, prepared: PreparedDocument, container: &[u8]) -> Result<W> {
        let available = prepared.capacity();
        if container.len() > available {
            return Err(PdfError::NotEnoughSpace {
                needed: container.len(),
                available,
            });
        }

        let mut bytes = prepared.bytes;
        let hex = hex::encode_upper(container);
        let start = prepared.contents_start + 1;
        bytes[start..start + hex.len()].copy_from_slice(hex.as_bytes());

        let mut output = self.output;
        output.write_all(&bytes)?;
        output.flush()?;
        Ok(output)
    }

    /// Widget annotation that is also the signature field
    fn field_dictionary(&self, sig_id: ObjectId, page_id: ObjectId, appearance_id: ObjectId) -> Dictionary {
        let [x, y, width, height] = self.properties.rect;
        let mut field = Dictionary::new();
        field.set("Type", Object::Name(b"Annot".to_vec()));
        field.set("Subtype", Object::Name(b"Widget".to_vec()));
        field.set(
            "Rect",
            Object::Array(vec![
                Object::Real(x as f32),
                Object::Real(y as f32),
                Object::Real((x + width) as f32),
                Object::Real((y + height) as f32),
            ]),
        );
        field.set("FT", Object::Name(b"Sig".to_vec()));
        field.set("T", text_string(&self.field_name));
        field.set("V", Object::Reference(sig_id));
        // Print
        field.set("F", Object::Integer(4));
        field.set("P", Object::Reference(page_id));
        field.set(
            "AP",
            Dictionary::from_iter(vec![("N", Object::Reference(appearance_id))]),
        );
        field
    }

    /// Empty form XObject sized to the widget
    fn appearance_stream(&self) -> Stream {
        let [_, _, width, height] = self.properties.rect;
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set(
            "BBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width.abs() as f32),
                Object::Real(height.abs() as f32),
            ]),
        );
        Stream::new(dict, Vec::new())
    }

    /// Register the field in the AcroForm, creating it when missing
    fn add_to_acroform(&self, update: &mut IncrementalUpdate, field_id: ObjectId) -> Result<()> {
        let doc = &self.document;
        let catalog_id = doc.catalog_id()?;
        let catalog = doc.catalog()?;

        match catalog.get(b"AcroForm") {
            Ok(Object::Reference(acroform_id)) => {
                let mut acroform = doc.get_dict(*acroform_id)?.clone();
                self.append_field(update, &mut acroform, field_id)?;
                update.update(*acroform_id, acroform);
            }
            Ok(Object::Dictionary(inline)) => {
                let mut acroform = inline.clone();
                self.append_field(update, &mut acroform, field_id)?;
                let mut catalog = catalog.clone();
                catalog.set("AcroForm", acroform);
                update.update(catalog_id, catalog);
            }
            _ => {
                let mut acroform = Dictionary::new();
                acroform.set("Fields", Object::Array(vec![Object::Reference(field_id)]));
                // SignaturesExist | AppendOnly
                acroform.set("SigFlags", Object::Integer(3));
                let acroform_id = update.add(acroform);

                let mut catalog = catalog.clone();
                catalog.set("AcroForm", Object::Reference(acroform_id));
                update.update(catalog_id, catalog);
            }
        }
        Ok(())
    }

    fn append_field(
        &self,
        update: &mut IncrementalUpdate,
        acroform: &mut Dictionary,
        field_id: ObjectId,
    ) -> Result<()> {
        match acroform.get(b"Fields") {
            Ok(Object::Reference(fields_id)) => {
                let fields_id = *fields_id;
                let mut fields = self.document.get_object(fields_id)?.as_array()?.clone();
                fields.push(Object::Reference(field_id));
                update.update(fields_id, Object::Array(fields));
            }
            Ok(Object::Array(fields)) => {
                let mut fields = fields.clone();
                fields.push(Object::Reference(field_id));
                acroform.set("Fields", Object::Array(fields));
            }
            _ => acroform.set("Fields", Object::Array(vec![Object::Reference(field_id)])),
        }
        acroform.set("SigFlags", Object::Integer(3));
        Ok(())
    }

    /// Add the widget to the page's Annots array
    fn add_to_page_annots(
        &self,
        update: &mut IncrementalUpdate,
        page_id: ObjectId,
        field_id: ObjectId,
    ) -> Result<()> {
        let page = self.document.get_dict(page_id)?;
        match page.get(b"Annots") {
            Ok(Object::Reference(annots_id)) => {
                let mut annots = self.document.get_object(*annots_id)?.as_array()?.clone();
                annots.push(Object::Reference(field_id));
                update.update(*annots_id, Object::Array(annots));
            }
            Ok(Object::Array(annots)) => {
                let mut annots = annots.clone();
                annots.push(Object::Reference(field_id));
                let mut page = page.clone();
                page.set("Annots", Object::Array(annots));
                update.update(page_id, page);
            }
            _ => {
                let mut page = page.clone();
                page.set("Annots", Object::Array(vec![Object::Reference(field_id)]));
                update.update(page_id, page);
            }
        }
        Ok(())
    }
}

/// Signature dictionary with `/ByteRange` and `/Contents` placeholders first
fn signature_dictionary(kind: &[u8], sub_filter: &[u8], reserved: usize) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(kind.to_vec()));
    dict.set(
        "ByteRange",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(BYTE_RANGE_PLACEHOLDER),
            Object::Integer(BYTE_RANGE_PLACEHOLDER),
            Object::Integer(BYTE_RANGE_PLACEHOLDER),
        ]),
    );
    dict.set(
        "Contents",
        Object::String(vec![0u8; reserved], StringFormat::Hexadecimal),
    );
    dict.set("Filter", Object::Name(b"Adobe.PPKLite".to_vec()));
    dict.set("SubFilter", Object::Name(sub_filter.to_vec()));
    dict
}

/// Replace the ByteRange placeholder found after `from`
pub fn replace_byte_range(pdf_bytes: &mut [u8], from: usize, byte_range: &[usize; 4]) -> Result<()> {
    let start = find_from(pdf_bytes, b"/ByteRange", from)
        .ok_or_else(|| PdfError::Structure("Could not find /ByteRange marker".to_string()))?;
    let bracket_start = find_from(pdf_bytes, b"[", start)
        .ok_or_else(|| PdfError::Structure("malformed /ByteRange".to_string()))?;
    let bracket_end = find_from(pdf_bytes, b"]", bracket_start)
        .ok_or_else(|| PdfError::Structure("malformed /ByteRange".to_string()))?
        + 1;

    let new_range = format!(
        "[{} {} {} {}]",
        byte_range[0], byte_range[1], byte_range[2], byte_range[3]
    );
    let new_range = new_range.as_bytes();
    if new_range.len() > bracket_end - bracket_start {
        return Err(PdfError::Structure("ByteRange string too long".to_string()));
    }

    pdf_bytes[bracket_start..bracket_start + new_range.len()].copy_from_slice(new_range);
    // Pad with spaces if the new range is shorter
    for byte in pdf_bytes
        .iter_mut()
        .take(bracket_end)
        .skip(bracket_start + new_range.len())
    {
        *byte = b' ';
    }
    Ok(())
}

/// PDF date string, e.g. `D:20240101120000+00'00'`
fn pdf_date(time: &DateTime<Utc>) -> Vec<u8> {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string().into_bytes()
}

/// PDF text string: ASCII as-is, anything else UTF-16BE with BOM
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::SignatureUtil;
    use crate::testing::minimal_pdf;
    use pades_crypto::testing::{FailingTsaClient, TestPki, TestTsaClient};
    use pades_crypto::{DigestAlgorithm, GeneralProvider, ProviderDigest};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn digest() -> ProviderDigest {
        ProviderDigest::new(Arc::new(GeneralProvider))
    }

    fn sign(pdf: Vec<u8>, pki: &TestPki, properties: SignerProperties) -> Result<Vec<u8>> {
        let signer = PdfSigner::new(pdf, Vec::new(), properties)?;
        signer.sign_detached(
            &digest(),
            &pki.signature(DigestAlgorithm::Sha256),
            &pki.chain(),
            None,
            0,
        )
    }

    #[test]
    fn test_signing_appends_revision() {
        let pki = TestPki::generate().unwrap();
        let original = minimal_pdf("1.7", 1).unwrap();
        let signed = sign(original.clone(), &pki, SignerProperties::default()).unwrap();

        assert!(signed.starts_with(&original));
        let doc = PdfDocument::load(signed).unwrap();
        let names = SignatureUtil::new(&doc).signature_names().unwrap();
        assert_eq!(names, vec!["Signature1".to_string()]);
    }

    #[test]
    fn test_byte_range_excludes_only_contents() {
        let pki = TestPki::generate().unwrap();
        let signed = sign(minimal_pdf("1.7", 1).unwrap(), &pki, SignerProperties::default()).unwrap();
        let doc = PdfDocument::load(signed.clone()).unwrap();
        let sig = SignatureUtil::new(&doc).signature("Signature1").unwrap();

        let [a, b, c, d] = sig.byte_range;
        assert_eq!(a, 0);
        assert_eq!(signed[b], b'<');
        assert_eq!(signed[c - 1], b'>');
        assert_eq!(c + d, signed.len());
    }

    #[test]
    fn test_generated_names_are_unique() {
        let pki = TestPki::generate().unwrap();
        let once = sign(minimal_pdf("1.7", 1).unwrap(), &pki, SignerProperties::default()).unwrap();
        let twice = sign(once, &pki, SignerProperties::default()).unwrap();

        let doc = PdfDocument::load(twice).unwrap();
        assert_eq!(
            SignatureUtil::new(&doc).signature_names().unwrap(),
            vec!["Signature1".to_string(), "Signature2".to_string()]
        );
    }

    #[test]
    fn test_duplicate_field_name_rejected() {
        let pki = TestPki::generate().unwrap();
        let props = SignerProperties::default().with_field_name("Approval");
        let signed = sign(minimal_pdf("1.7", 1).unwrap(), &pki, props.clone()).unwrap();
        assert!(PdfSigner::new(signed, Vec::new(), props).is_err());
    }

    #[test]
    fn test_too_small_reservation() {
        let pki = TestPki::generate().unwrap();
        let signer =
            PdfSigner::new(minimal_pdf("1.7", 1).unwrap(), Vec::new(), SignerProperties::default())
                .unwrap();
        let err = signer
            .sign_detached(
                &digest(),
                &pki.signature(DigestAlgorithm::Sha256),
                &pki.chain(),
                None,
                64,
            )
            .unwrap_err();
        assert!(matches!(err, PdfError::NotEnoughSpace { available: 64, .. }));
    }

    #[test]
    fn test_missing_page_rejected() {
        let pki = TestPki::generate().unwrap();
        let props = SignerProperties::default().with_page(5);
        assert!(sign(minimal_pdf("1.7", 1).unwrap(), &pki, props).is_err());
    }

    #[test]
    fn test_tsa_failure_propagates() {
        let pki = TestPki::generate().unwrap();
        let signer =
            PdfSigner::new(minimal_pdf("1.7", 1).unwrap(), Vec::new(), SignerProperties::default())
                .unwrap();
        let err = signer
            .sign_detached(
                &digest(),
                &pki.signature(DigestAlgorithm::Sha256),
                &pki.chain(),
                Some(&FailingTsaClient),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, PdfError::Crypto(CryptoError::Tsa(_))));
    }

    #[test]
    fn test_document_timestamp() {
        let pki = TestPki::generate().unwrap();
        let tsa = TestTsaClient::new(&pki).unwrap();
        let props = SignerProperties::default().with_field_name("Archive");
        let signer = PdfSigner::new(minimal_pdf("1.7", 1).unwrap(), Vec::new(), props).unwrap();
        let stamped = signer.timestamp(&tsa).unwrap();

        let doc = PdfDocument::load(stamped).unwrap();
        let sig = SignatureUtil::new(&doc).signature("Archive").unwrap();
        assert!(sig.is_document_timestamp());
        assert_eq!(tsa.requests(), 1);
    }

    #[test]
    fn test_redirect_output() {
        let pki = TestPki::generate().unwrap();
        let signer =
            PdfSigner::new(minimal_pdf("1.7", 1).unwrap(), Vec::new(), SignerProperties::default())
                .unwrap();
        let signer = signer.redirect_output(std::io::Cursor::new(Vec::new()));
        let out = signer
            .sign_detached(
                &digest(),
                &pki.signature(DigestAlgorithm::Sha256),
                &pki.chain(),
                None,
                0,
            )
            .unwrap();
        assert!(!out.into_inner().is_empty());
    }

    #[test]
    fn test_estimate_grows_with_tsa() {
        let pki = TestPki::generate().unwrap();
        let tsa = TestTsaClient::new(&pki).unwrap();
        let chain = pki.chain();
        assert!(estimate_container_size(&chain, Some(&tsa)) > estimate_container_size(&chain, None));
        assert!(estimate_container_size(&[], None) == BASE_CONTAINER_SIZE);
    }

    #[test]
    fn test_generate_field_name() {
        assert_eq!(generate_field_name(&[]), "Signature1");
        assert_eq!(
            generate_field_name(&["Signature1".to_string(), "Signature3".to_string()]),
            "Signature2"
        );
    }

    #[test]
    fn test_text_string_encoding() {
        assert_eq!(
            text_string("Ab"),
            Object::String(b"Ab".to_vec(), StringFormat::Literal)
        );
        assert_eq!(
            text_string("é"),
            Object::String(vec![0xFE, 0xFF, 0x00, 0xE9], StringFormat::Hexadecimal)
        );
    }
}
