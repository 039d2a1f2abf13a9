//! Append-mode (incremental) PDF writer
//!
//! New and changed objects are serialized after the existing bytes, followed
//! by a cross-reference section covering only those objects and a trailer
//! whose `/Prev` points at the previous section. The section is a classic
//! table or a cross-reference stream, matching the file's last section.
//! Bytes already covered by a signature are never touched.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::document::PdfDocument;
use crate::error::Result;

/// Trailer entries carried into every new section
const INHERITED_TRAILER_KEYS: &[&[u8]] = &[b"Root", b"Info", b"ID", b"Encrypt"];

/// Trailer entries that describe a particular cross-reference section
const SECTION_TRAILER_KEYS: &[&[u8]] = &[
    b"Size",
    b"Prev",
    b"XRefStm",
    b"Type",
    b"W",
    b"Index",
    b"Filter",
    b"DecodeParms",
    b"Length",
];

/// Objects staged for one new revision
pub struct IncrementalUpdate {
    objects: BTreeMap<ObjectId, Object>,
    next_id: u32,
    base_size: u32,
    prev_startxref: usize,
    xref_stream: bool,
    trailer: Dictionary,
}

/// Result of [`IncrementalUpdate::write`]
#[derive(Debug, Clone)]
pub struct WrittenUpdate {
    /// Previous bytes followed by the new revision
    pub bytes: Vec<u8>,
    /// Offset of each written object, by object number
    pub offsets: BTreeMap<u32, usize>,
}

impl IncrementalUpdate {
    pub fn new(document: &PdfDocument) -> Result<Self> {
        let max_id = document.max_object_id();
        let mut trailer = Dictionary::new();
        for key in INHERITED_TRAILER_KEYS {
            if let Ok(value) = document.trailer().get(key) {
                trailer.set(key.to_vec(), value.clone());
            }
        }
        let declared_size = document
            .trailer()
            .get(b"Size")
            .and_then(Object::as_i64)
            .unwrap_or(0);

        Ok(Self {
            objects: BTreeMap::new(),
            next_id: max_id + 1,
            base_size: (max_id + 1).max(u32::try_from(declared_size).unwrap_or(0)),
            prev_startxref: document.startxref()?,
            xref_stream: document.has_xref_stream()?,
            trailer,
        })
    }

    /// Stage a new object and return its id
    pub fn add(&mut self, object: impl Into<Object>) -> ObjectId {
        let id = self.allocate();
        self.objects.insert(id, object.into());
        id
    }

    /// Reserve an id for an object staged later with [`Self::update`]
    pub fn allocate(&mut self) -> ObjectId {
        let id = (self.next_id, 0);
        self.next_id += 1;
        id
    }

    /// Stage a replacement for an existing object
    pub fn update(&mut self, id: ObjectId, object: impl Into<Object>) {
        self.objects.insert(id, object.into());
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize `base` followed by the staged revision
    pub fn write(&self, base: &[u8]) -> WrittenUpdate {
        let mut bytes = base.to_vec();
        if !bytes.ends_with(b"\n") {
            bytes.push(b'\n');
        }

        let mut offsets = BTreeMap::new();
        for (id, object) in &self.objects {
            offsets.insert(id.0, bytes.len());
            write_indirect_object(&mut bytes, *id, object);
        }

        let xref_offset = bytes.len();
        let mut entries: Vec<(ObjectId, usize)> = self
            .objects
            .keys()
            .filter_map(|id| offsets.get(&id.0).map(|offset| (*id, *offset)))
            .collect();

        let mut trailer = self.trailer.clone();
        trailer.set("Prev", Object::Integer(self.prev_startxref as i64));

        if self.xref_stream {
            // The stream takes the next free number and lists itself
            let stream_id = (self.next_id, 0);
            entries.push((stream_id, xref_offset));
            let size = self.base_size.max(self.next_id + 1);
            trailer.set("Size", Object::Integer(size as i64));
            write_xref_stream(&mut bytes, stream_id, &entries, trailer);
            write_startxref(&mut bytes, xref_offset);
        } else {
            write_xref_section(&mut bytes, &entries, false);
            let size = self.base_size.max(self.next_id);
            trailer.set("Size", Object::Integer(size as i64));
            write_trailer(&mut bytes, &trailer, xref_offset);
        }

        WrittenUpdate { bytes, offsets }
    }
}

/// Serialize a whole document with a single classic cross-reference table.
///
/// Used where the document is produced from scratch rather than appended to.
pub fn write_document(doc: &Document) -> WrittenUpdate {
    let mut bytes = format!("%PDF-{}\n", doc.version).into_bytes();
    // Binary marker comment
    bytes.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = BTreeMap::new();
    let mut entries = Vec::new();
    for (id, object) in &doc.objects {
        offsets.insert(id.0, bytes.len());
        entries.push((*id, bytes.len()));
        write_indirect_object(&mut bytes, *id, object);
    }

    let xref_offset = bytes.len();
    write_xref_section(&mut bytes, &entries, true);

    let mut trailer = Dictionary::new();
    for (key, value) in doc.trailer.iter() {
        if !SECTION_TRAILER_KEYS.contains(&key.as_slice()) {
            trailer.set(key.clone(), value.clone());
        }
    }
    let max_id = doc.objects.keys().map(|id| id.0).max().unwrap_or(0);
    trailer.set("Size", Object::Integer(max_id as i64 + 1));
    write_trailer(&mut bytes, &trailer, xref_offset);

    WrittenUpdate { bytes, offsets }
}

fn write_indirect_object(out: &mut Vec<u8>, id: ObjectId, object: &Object) {
    out.extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
    serialize_object(out, object);
    out.extend_from_slice(b"\nendobj\n");
}

/// `xref` keyword and one subsection per run of consecutive object numbers
fn write_xref_section(out: &mut Vec<u8>, entries: &[(ObjectId, usize)], with_free_head: bool) {
    out.extend_from_slice(b"xref\n");

    let mut rows: Vec<(u32, String)> = Vec::new();
    if with_free_head {
        rows.push((0, "0000000000 65535 f\r\n".to_string()));
    }
    for (id, offset) in entries {
        rows.push((id.0, format!("{:010} {:05} n\r\n", offset, id.1)));
    }

    let numbers: Vec<u32> = rows.iter().map(|(number, _)| *number).collect();
    for (start, end) in consecutive_runs(&numbers) {
        out.extend_from_slice(format!("{} {}\n", rows[start].0, end - start).as_bytes());
        for (_, row) in &rows[start..end] {
            out.extend_from_slice(row.as_bytes());
        }
    }
}

/// Uncompressed `/Type /XRef` stream object whose dictionary is also the trailer.
///
/// `entries` must be sorted by object number.
fn write_xref_stream(
    out: &mut Vec<u8>,
    id: ObjectId,
    entries: &[(ObjectId, usize)],
    mut dict: Dictionary,
) {
    let max_offset = entries.iter().map(|(_, offset)| *offset).max().unwrap_or(0);
    let width = offset_width(max_offset);

    let mut content = Vec::with_capacity(entries.len() * (width + 3));
    for (entry_id, offset) in entries {
        content.push(1);
        content.extend_from_slice(&(*offset as u64).to_be_bytes()[8 - width..]);
        content.extend_from_slice(&entry_id.1.to_be_bytes());
    }

    let numbers: Vec<u32> = entries.iter().map(|(entry_id, _)| entry_id.0).collect();
    let index = consecutive_runs(&numbers)
        .into_iter()
        .flat_map(|(start, end)| {
            [
                Object::Integer(numbers[start] as i64),
                Object::Integer((end - start) as i64),
            ]
        })
        .collect();

    dict.set("Type", Object::Name(b"XRef".to_vec()));
    dict.set(
        "W",
        Object::Array(vec![
            Object::Integer(1),
            Object::Integer(width as i64),
            Object::Integer(2),
        ]),
    );
    dict.set("Index", Object::Array(index));
    write_indirect_object(out, id, &Object::Stream(Stream::new(dict, content)));
}

/// Bytes needed to hold `offset` big-endian, at least one
fn offset_width(offset: usize) -> usize {
    let bits = (usize::BITS - offset.leading_zeros()) as usize;
    bits.div_ceil(8).max(1)
}

/// Half-open index ranges of runs of consecutive numbers
fn consecutive_runs(numbers: &[u32]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0;
    while start < numbers.len() {
        let mut end = start + 1;
        while end < numbers.len() && numbers[end] == numbers[end - 1] + 1 {
            end += 1;
        }
        runs.push((start, end));
        start = end;
    }
    runs
}

fn write_trailer(out: &mut Vec<u8>, trailer: &Dictionary, xref_offset: usize) {
    out.extend_from_slice(b"trailer\n");
    serialize_dictionary(out, trailer);
    out.push(b'\n');
    write_startxref(out, xref_offset);
}

fn write_startxref(out: &mut Vec<u8>, xref_offset: usize) {
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
}

/// Serialize a direct object in PDF syntax
pub fn serialize_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => out.extend_from_slice(format_real(*value).as_bytes()),
        Object::Name(name) => serialize_name(out, name),
        Object::String(content, StringFormat::Literal) => serialize_literal_string(out, content),
        Object::String(content, StringFormat::Hexadecimal) => {
            out.push(b'<');
            out.extend_from_slice(hex::encode_upper(content).as_bytes());
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                serialize_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => serialize_dictionary(out, dict),
        Object::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.set("Length", Object::Integer(stream.content.len() as i64));
            serialize_dictionary(out, &dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(id) => out.extend_from_slice(format!("{} {} R", id.0, id.1).as_bytes()),
    }
}

fn serialize_dictionary(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        serialize_name(out, key);
        out.push(b' ');
        serialize_object(out, value);
    }
    out.extend_from_slice(b">>");
}

fn serialize_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &b in name {
        let delimiter = b"()<>[]{}/%#".contains(&b);
        if (0x21..=0x7E).contains(&b) && !delimiter {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{:02X}", b).as_bytes());
        }
    }
}

fn serialize_literal_string(out: &mut Vec<u8>, content: &[u8]) {
    out.push(b'(');
    for &b in content {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

fn format_real(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.6}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
