//! PDF parsing using lopdf
//!
//! [`PdfDocument`] keeps the parsed object graph together with the exact
//! bytes it was read from, since every update is appended to those bytes.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{PdfError, Result};

/// Deepest form field hierarchy that is walked
const MAX_FIELD_DEPTH: usize = 32;

/// Longest chain of indirect references followed by [`PdfDocument::resolve`]
const MAX_REFERENCE_CHAIN: usize = 32;

/// A terminal AcroForm field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    /// Fully qualified name (`parent.child`)
    pub name: String,
    pub id: Option<ObjectId>,
    /// Field type is `/Sig`, directly or inherited
    pub is_signature: bool,
    /// Indirect `/V` value, the signature dictionary for signed fields
    pub value: Option<ObjectId>,
}

/// A parsed PDF and its original bytes
pub struct PdfDocument {
    doc: Document,
    bytes: Vec<u8>,
}

impl PdfDocument {
    /// Parse a PDF from raw bytes
    pub fn load(bytes: Vec<u8>) -> Result<Self> {
        let doc = Document::load_mem(&bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        Ok(Self { doc, bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn inner(&self) -> &Document {
        &self.doc
    }

    /// Effective version: the catalog `/Version` overrides the header when later
    pub fn version(&self) -> String {
        let header = self.doc.version.clone();
        let catalog_version = self
            .catalog()
            .ok()
            .and_then(|c| c.get(b"Version").ok())
            .and_then(|v| v.as_name().ok())
            .map(|v| String::from_utf8_lossy(v).into_owned());
        match catalog_version {
            Some(v) if parse_version(&v) > parse_version(&header) => v,
            _ => header,
        }
    }

    /// Whether the effective version is at least `major.minor`
    pub fn is_version_at_least(&self, major: u32, minor: u32) -> bool {
        parse_version(&self.version()).is_some_and(|v| v >= (major, minor))
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Page object ID for a 1-indexed page number
    pub fn page_id(&self, page_num: u32) -> Option<ObjectId> {
        self.doc.get_pages().get(&page_num).copied()
    }

    pub fn catalog_id(&self) -> Result<ObjectId> {
        self.doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| PdfError::Structure("trailer has no /Root reference".to_string()))
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        self.get_dict(self.catalog_id()?)
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.doc.trailer
    }

    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        Ok(self.doc.get_object(id)?)
    }

    pub fn get_dict(&self, id: ObjectId) -> Result<&Dictionary> {
        self.get_object(id)?
            .as_dict()
            .map_err(|_| PdfError::Structure(format!("object {} {} is not a dictionary", id.0, id.1)))
    }

    /// Follow indirect references to a direct object
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        let mut current = object;
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current {
                Object::Reference(id) => current = self.get_object(*id)?,
                direct => return Ok(direct),
            }
        }
        Err(PdfError::Structure("reference chain too long".to_string()))
    }

    /// Dictionary-valued entry of `dict`, resolving references
    pub fn dict_entry<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
        let object = dict.get(key).ok()?;
        self.resolve(object).ok()?.as_dict().ok()
    }

    pub fn acroform(&self) -> Result<Option<&Dictionary>> {
        Ok(self.dict_entry(self.catalog()?, b"AcroForm"))
    }

    /// Document Security Store of the catalog, if any
    pub fn dss(&self) -> Result<Option<&Dictionary>> {
        Ok(self.dict_entry(self.catalog()?, b"DSS"))
    }

    pub fn is_encrypted(&self) -> bool {
        self.doc.trailer.has(b"Encrypt")
    }

    /// Highest object number in use
    pub fn max_object_id(&self) -> u32 {
        self.doc
            .objects
            .keys()
            .map(|id| id.0)
            .max()
            .unwrap_or(0)
            .max(self.doc.max_id)
    }

    /// Offset of the last cross-reference section, from the final `startxref`
    pub fn startxref(&self) -> Result<usize> {
        let marker = b"startxref";
        let pos = find_last_occurrence(&self.bytes, marker)
            .ok_or_else(|| PdfError::Structure("missing startxref".to_string()))?;
        let digits: String = self.bytes[pos + marker.len()..]
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .take_while(|b| b.is_ascii_digit())
            .map(|b| *b as char)
            .collect();
        digits
            .parse()
            .map_err(|_| PdfError::Structure("invalid startxref offset".to_string()))
    }

    /// Whether the last cross-reference section is a stream rather than a table
    pub fn has_xref_stream(&self) -> Result<bool> {
        let offset = self.startxref()?;
        let section = self
            .bytes
            .get(offset..)
            .ok_or_else(|| PdfError::Structure("startxref offset past end of file".to_string()))?;
        let start = section
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(section.len());
        Ok(!section[start..].starts_with(b"xref"))
    }

    /// Every terminal form field, in document order
    pub fn form_fields(&self) -> Result<Vec<FormField>> {
        let Some(acroform) = self.acroform()? else {
            return Ok(Vec::new());
        };
        let Ok(fields) = acroform.get(b"Fields") else {
            return Ok(Vec::new());
        };
        let fields = self
            .resolve(fields)?
            .as_array()
            .map_err(|_| PdfError::Structure("Fields is not an array".to_string()))?;

        let mut out = Vec::new();
        for field in fields {
            self.collect_field(field, None, None, &mut out, 0)?;
        }
        Ok(out)
    }

    fn collect_field(
        &self,
        object: &Object,
        parent_name: Option<&str>,
        inherited_type: Option<&[u8]>,
        out: &mut Vec<FormField>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_FIELD_DEPTH {
            return Err(PdfError::Structure("form field tree too deep".to_string()));
        }

        let id = object.as_reference().ok();
        let Ok(dict) = self.resolve(object)?.as_dict() else {
            return Ok(());
        };

        // Kids without /T are widget annotations of the parent field
        let Some(partial) = dict
            .get(b"T")
            .ok()
            .and_then(|t| t.as_str().ok())
            .map(decode_text_string)
        else {
            return Ok(());
        };
        let name = match parent_name {
            Some(parent) => format!("{}.{}", parent, partial),
            None => partial,
        };
        let field_type = dict
            .get(b"FT")
            .ok()
            .and_then(|ft| ft.as_name().ok())
            .or(inherited_type);

        let kids: Vec<&Object> = dict
            .get(b"Kids")
            .ok()
            .and_then(|k| self.resolve(k).ok())
            .and_then(|k| k.as_array().ok())
            .map(|k| k.iter().collect())
            .unwrap_or_default();
        let child_fields: Vec<&Object> = kids
            .into_iter()
            .filter(|kid| {
                self.resolve(kid)
                    .ok()
                    .and_then(|o| o.as_dict().ok())
                    .is_some_and(|d| d.has(b"T"))
            })
            .collect();

        if child_fields.is_empty() {
            out.push(FormField {
                name,
                id,
                is_signature: field_type == Some(b"Sig".as_slice()),
                value: dict.get(b"V").ok().and_then(|v| v.as_reference().ok()),
            });
        } else {
            for kid in child_fields {
                self.collect_field(kid, Some(&name), field_type, out, depth + 1)?;
            }
        }
        Ok(())
    }

    pub fn field_names(&self) -> Result<Vec<String>> {
        Ok(self.form_fields()?.into_iter().map(|f| f.name).collect())
    }

    /// Signature fields that carry a signature dictionary
    pub fn signed_fields(&self) -> Result<Vec<FormField>> {
        Ok(self
            .form_fields()?
            .into_iter()
            .filter(|f| f.is_signature && f.value.is_some())
            .collect())
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise byte-per-char)
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|b| *b as char).collect(),
    }
}

/// Numeric `(major, minor)` of a version string such as `1.7`
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Find the last occurrence of a pattern in bytes
pub fn find_last_occurrence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let len = needle.len();
    if len == 0 || len > haystack.len() {
        return None;
    }

    (0..=(haystack.len() - len))
        .rev()
        .find(|&i| &haystack[i..i + len] == needle)
}

/// Find the first occurrence of a pattern at or after `from`
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
