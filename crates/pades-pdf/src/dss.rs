//! Document Security Store
//!
//! Validation material (certificates, OCSP responses, CRLs) is stored in the
//! catalog's `/DSS` dictionary, with one VRI entry per signature keyed by the
//! uppercase hex SHA-1 of its container. Appending the store is an
//! incremental update; earlier entries and streams are preserved and
//! identical streams are shared.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::Utc;
use lopdf::{Dictionary, Object, Stream, StringFormat};
use tracing::debug;

use pades_crypto::asn1::encoded_len;
use pades_crypto::DigestAlgorithm;

use crate::document::PdfDocument;
use crate::error::{PdfError, Result};
use crate::incremental::IncrementalUpdate;

/// Validation material for one signature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VriEntry {
    pub certs: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
}

impl VriEntry {
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty() && self.ocsps.is_empty() && self.crls.is_empty()
    }
}

/// Material to merge into the DSS, keyed by VRI key
#[derive(Debug, Clone, Default)]
pub struct DssUpdate {
    pub vri: BTreeMap<String, VriEntry>,
}

impl DssUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, key: String) -> &mut VriEntry {
        self.vri.entry(key).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.vri.values().all(VriEntry::is_empty)
    }
}

/// VRI key of a signature: uppercase hex SHA-1 of its DER container
pub fn vri_key(contents: &[u8]) -> Result<String> {
    let container = &contents[..encoded_len(contents)?];
    Ok(hex::encode_upper(
        DigestAlgorithm::Sha1.digest_parts(&[container]),
    ))
}

/// Streams of one DSS array, existing and newly added
struct StreamPool {
    entries: Vec<(Vec<u8>, Object)>,
    added: usize,
}

impl StreamPool {
    fn load(document: &PdfDocument, dss: Option<&Dictionary>, key: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        if let Some(array) = dss.and_then(|d| d.get(key).ok()) {
            for item in document.resolve(array)?.as_array()? {
                let Object::Reference(id) = item else {
                    continue;
                };
                let stream = document.get_object(*id)?.as_stream()?;
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                entries.push((data, Object::Reference(*id)));
            }
        }
        Ok(Self { entries, added: 0 })
    }

    /// Reference to a stream holding `data`, adding one if needed
    fn intern(&mut self, update: &mut IncrementalUpdate, data: &[u8]) -> Object {
        if let Some((_, reference)) = self.entries.iter().find(|(d, _)| d == data) {
            return reference.clone();
        }
        let id = update.add(Stream::new(Dictionary::new(), data.to_vec()));
        let reference = Object::Reference(id);
        self.entries.push((data.to_vec(), reference.clone()));
        self.added += 1;
        reference
    }

    fn references(&self) -> Vec<Object> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    fn intern_all(&mut self, update: &mut IncrementalUpdate, items: &[Vec<u8>]) -> Vec<Object> {
        let mut references: Vec<Object> = Vec::new();
        for item in items {
            let reference = self.intern(update, item);
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
        references
    }
}

/// Append a revision merging `update` into the document's DSS
pub fn append_dss<W: Write>(document: &PdfDocument, update: &DssUpdate, mut output: W) -> Result<W> {
    let existing = document.dss()?;
    let mut certs = StreamPool::load(document, existing, b"Certs")?;
    let mut ocsps = StreamPool::load(document, existing, b"OCSPs")?;
    let mut crls = StreamPool::load(document, existing, b"CRLs")?;

    let mut vri = existing
        .and_then(|dss| document.dict_entry(dss, b"VRI"))
        .cloned()
        .unwrap_or_default();

    let mut revision = IncrementalUpdate::new(document)?;
    let timestamp = Utc::now().format("D:%Y%m%d%H%M%S+00'00'").to_string();

    for (key, entry) in &update.vri {
        // An entry for the same signature keeps what it already lists
        let mut dict = match vri.get(key.as_bytes()) {
            Ok(previous) => document.resolve(previous)?.as_dict()?.clone(),
            Err(_) => Dictionary::new(),
        };
        let cert_refs = certs.intern_all(&mut revision, &entry.certs);
        let ocsp_refs = ocsps.intern_all(&mut revision, &entry.ocsps);
        let crl_refs = crls.intern_all(&mut revision, &entry.crls);
        for (name, added) in [("Cert", cert_refs), ("OCSP", ocsp_refs), ("CRL", crl_refs)] {
            let merged = merge_references(document, &dict, name.as_bytes(), added)?;
            if !merged.is_empty() {
                dict.set(name, Object::Array(merged));
            }
        }
        dict.set(
            "TU",
            Object::String(timestamp.clone().into_bytes(), StringFormat::Literal),
        );
        vri.set(key.as_bytes().to_vec(), Object::Dictionary(dict));
    }

    let mut dss = existing.cloned().unwrap_or_default();
    dss.set("Type", Object::Name(b"DSS".to_vec()));
    for (key, pool) in [("Certs", &certs), ("OCSPs", &ocsps), ("CRLs", &crls)] {
        if !pool.entries.is_empty() {
            dss.set(key, Object::Array(pool.references()));
        }
    }
    if !vri.is_empty() {
        let vri_id = revision.add(vri);
        dss.set("VRI", Object::Reference(vri_id));
    }
    let dss_id = revision.add(dss);

    let catalog_id = document.catalog_id()?;
    let mut catalog = document.catalog()?.clone();
    catalog.set("DSS", Object::Reference(dss_id));
    if !document.is_version_at_least(2, 0) {
        add_esic_extension(&mut catalog);
    }
    revision.update(catalog_id, catalog);

    let written = revision.write(document.bytes());
    output.write_all(&written.bytes)?;
    output.flush()?;

    debug!(
        signatures = update.vri.len(),
        certs = certs.added,
        ocsps = ocsps.added,
        crls = crls.added,
        "appended DSS revision"
    );
    Ok(output)
}

/// References listed under `key` in `dict`, followed by those in `added` not yet present
fn merge_references(
    document: &PdfDocument,
    dict: &Dictionary,
    key: &[u8],
    added: Vec<Object>,
) -> Result<Vec<Object>> {
    let mut merged = match dict.get(key) {
        Ok(existing) => document.resolve(existing)?.as_array()?.clone(),
        Err(_) => Vec::new(),
    };
    for reference in added {
        if !merged.contains(&reference) {
            merged.push(reference);
        }
    }
    Ok(merged)
}

/// Declare the ETSI extension that introduced the DSS
fn add_esic_extension(catalog: &mut Dictionary) {
    let esic = Dictionary::from_iter(vec![
        ("BaseVersion", Object::Name(b"1.7".to_vec())),
        ("ExtensionLevel", Object::Integer(5)),
    ]);
    match catalog.get_mut(b"Extensions") {
        Ok(Object::Dictionary(extensions)) => {
            if !extensions.has(b"ESIC") {
                extensions.set("ESIC", esic);
            }
        }
        // An indirect extensions dictionary is left untouched
        Ok(_) => {}
        Err(_) => catalog.set(
            "Extensions",
            Dictionary::from_iter(vec![("ESIC", Object::Dictionary(esic))]),
        ),
    }
}

/// Decoded DSS contents
#[derive(Debug, Clone, Default)]
pub struct DssContent {
    pub certs: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub vri_keys: Vec<String>,
}

impl DssContent {
    /// Read the DSS of `document`; empty when there is none
    pub fn read(document: &PdfDocument) -> Result<Self> {
        let Some(dss) = document.dss()? else {
            return Ok(Self::default());
        };
        let streams = |key: &[u8]| -> Result<Vec<Vec<u8>>> {
            Ok(StreamPool::load(document, Some(dss), key)?
                .entries
                .into_iter()
                .map(|(data, _)| data)
                .collect())
        };
        let vri_keys = match document.dict_entry(dss, b"VRI") {
            Some(vri) => vri
                .iter()
                .map(|(k, _)| String::from_utf8(k.clone()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| PdfError::Structure("VRI key is not ASCII".to_string()))?,
            None => Vec::new(),
        };
        Ok(Self {
            certs: streams(b"Certs")?,
            ocsps: streams(b"OCSPs")?,
            crls: streams(b"CRLs")?,
            vri_keys,
        })
    }
}
