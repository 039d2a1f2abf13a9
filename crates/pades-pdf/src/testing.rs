//! Minimal PDF fixtures

use lopdf::xref::XrefType;
use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::Result;

/// A PDF with `num_pages` text pages, saved with a classic xref table
pub fn minimal_pdf(version: &str, num_pages: u32) -> Result<Vec<u8>> {
    build(version, num_pages, XrefType::CrossReferenceTable)
}

/// Same as [`minimal_pdf`], but the file ends in a cross-reference stream
pub fn minimal_pdf_with_xref_stream(version: &str, num_pages: u32) -> Result<Vec<u8>> {
    build(version, num_pages, XrefType::CrossReferenceStream)
}

fn build(version: &str, num_pages: u32, xref_type: XrefType) -> Result<Vec<u8>> {
    let mut doc = Document::with_version(version);
    doc.reference_table.cross_reference_type = xref_type;
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for i in 0..num_pages {
        let content = format!("BT /F1 12 Tf 100 700 Td (Page {}) Tj ET", i + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}
