//! ASN.1 DER encoding/decoding helpers
//!
//! Small hand-rolled TLV builders used to assemble CMS, RFC 3161, OCSP and
//! X.509 structures, plus a reader for walking DER without a schema.

use crate::error::{CryptoError, Result};

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_ENUMERATED: u8 = 0x0A;
pub const TAG_UTF8_STRING: u8 = 0x0C;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;

// === Encoding ===

pub fn build_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(content.len() + 6);
    result.push(tag);
    let len = content.len();

    if len < 128 {
        result.push(len as u8);
    } else {
        let bytes = (len as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        result.push(0x80 | (4 - skip) as u8);
        result.extend(&bytes[skip..]);
    }

    result.extend(content);
    result
}

pub fn build_sequence(items: &[&[u8]]) -> Vec<u8> {
    let content: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    build_tlv(TAG_SEQUENCE, &content)
}

/// SET with a single pre-encoded element (or pre-sorted content)
pub fn build_set(content: &[u8]) -> Vec<u8> {
    build_tlv(TAG_SET, content)
}

/// DER SET OF: elements sorted by their encodings
pub fn build_set_of(items: &[Vec<u8>]) -> Vec<u8> {
    build_tlv(TAG_SET, &sorted_concat(items))
}

/// Concatenate encodings in DER SET OF order
pub fn sorted_concat(items: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted: Vec<&Vec<u8>> = items.iter().collect();
    sorted.sort();
    sorted.into_iter().flat_map(|i| i.iter().copied()).collect()
}

pub fn build_oid(oid_bytes: &[u8]) -> Vec<u8> {
    build_tlv(TAG_OID, oid_bytes)
}

pub fn build_integer(value: &[u8]) -> Vec<u8> {
    // Strip redundant leading zeros, then pad if the high bit is set
    let first = value
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(value.len().saturating_sub(1));
    let value = &value[first..];

    if value.is_empty() {
        build_tlv(TAG_INTEGER, &[0])
    } else if value[0] & 0x80 != 0 {
        let mut padded = vec![0];
        padded.extend(value);
        build_tlv(TAG_INTEGER, &padded)
    } else {
        build_tlv(TAG_INTEGER, value)
    }
}

pub fn build_small_integer(value: u64) -> Vec<u8> {
    build_integer(&value.to_be_bytes())
}

pub fn build_octet_string(content: &[u8]) -> Vec<u8> {
    build_tlv(TAG_OCTET_STRING, content)
}

pub fn build_bit_string(content: &[u8]) -> Vec<u8> {
    let mut bs = vec![0]; // No unused bits
    bs.extend(content);
    build_tlv(TAG_BIT_STRING, &bs)
}

pub fn build_boolean(value: bool) -> Vec<u8> {
    build_tlv(TAG_BOOLEAN, &[if value { 0xFF } else { 0x00 }])
}

pub fn build_null() -> Vec<u8> {
    vec![TAG_NULL, 0x00]
}

pub fn build_enumerated(value: u8) -> Vec<u8> {
    build_tlv(TAG_ENUMERATED, &[value])
}

pub fn build_utf8_string(s: &str) -> Vec<u8> {
    build_tlv(TAG_UTF8_STRING, s.as_bytes())
}

/// UTCTime from a `chrono` timestamp (YYMMDDHHMMSSZ)
pub fn build_utc_time(time: &chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    build_tlv(
        TAG_UTC_TIME,
        time.format("%y%m%d%H%M%SZ").to_string().as_bytes(),
    )
}

/// GeneralizedTime from a `chrono` timestamp (YYYYMMDDHHMMSSZ)
pub fn build_generalized_time(time: &chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    build_tlv(
        TAG_GENERALIZED_TIME,
        time.format("%Y%m%d%H%M%SZ").to_string().as_bytes(),
    )
}

/// Constructed context-specific tag `[n]`
pub fn build_context_specific(tag: u8, content: &[u8]) -> Vec<u8> {
    build_tlv(0xA0 | tag, content)
}

/// Primitive context-specific tag `[n] IMPLICIT`
pub fn build_context_primitive(tag: u8, content: &[u8]) -> Vec<u8> {
    build_tlv(0x80 | tag, content)
}

/// AlgorithmIdentifier with NULL parameters (digest algorithms)
pub fn build_algorithm_identifier(oid: &[u8]) -> Vec<u8> {
    let oid_encoded = build_oid(oid);
    build_sequence(&[&oid_encoded, &build_null()])
}

/// AlgorithmIdentifier with absent parameters (ECDSA signature algorithms)
pub fn build_algorithm_identifier_no_params(oid: &[u8]) -> Vec<u8> {
    build_sequence(&[&build_oid(oid)])
}

// === Decoding ===

/// One decoded TLV element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub content: &'a [u8],
    /// Full encoding including tag and length
    pub raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Decode the children of a constructed element
    pub fn children(&self) -> Result<Vec<Tlv<'a>>> {
        elements(self.content)
    }

    pub fn expect_tag(self, tag: u8, what: &str) -> Result<Self> {
        if self.tag != tag {
            return Err(CryptoError::Asn1(format!(
                "{}: expected tag 0x{:02X}, found 0x{:02X}",
                what, tag, self.tag
            )));
        }
        Ok(self)
    }
}

/// Read one TLV element, returning it and the remaining bytes
pub fn read_tlv(data: &[u8]) -> Result<(Tlv<'_>, &[u8])> {
    if data.is_empty() {
        return Err(CryptoError::Asn1("Empty TLV data".to_string()));
    }

    let (len, header_len) = parse_length(&data[1..])?;
    let total_header = 1 + header_len;

    if data.len() < total_header + len {
        return Err(CryptoError::Asn1("TLV data too short".to_string()));
    }

    let tlv = Tlv {
        tag: data[0],
        content: &data[total_header..total_header + len],
        raw: &data[..total_header + len],
    };
    Ok((tlv, &data[total_header + len..]))
}

/// Read a single element that must span all of `data`
pub fn read_single<'a>(data: &'a [u8], what: &str) -> Result<Tlv<'a>> {
    let (tlv, rest) = read_tlv(data)?;
    if !rest.is_empty() {
        return Err(CryptoError::Asn1(format!("{}: trailing data", what)));
    }
    Ok(tlv)
}

/// Decode a run of consecutive TLV elements
pub fn elements(mut data: &[u8]) -> Result<Vec<Tlv<'_>>> {
    let mut items = Vec::new();
    while !data.is_empty() {
        let (tlv, rest) = read_tlv(data)?;
        items.push(tlv);
        data = rest;
    }
    Ok(items)
}

/// Total encoded length of the element at the start of `data`.
///
/// Used to strip zero padding after a DER structure.
pub fn encoded_len(data: &[u8]) -> Result<usize> {
    read_tlv(data).map(|(tlv, _)| tlv.raw.len())
}

pub fn parse_length(data: &[u8]) -> Result<(usize, usize)> {
    if data.is_empty() {
        return Err(CryptoError::Asn1("No length byte".to_string()));
    }

    if data[0] < 128 {
        return Ok((data[0] as usize, 1));
    }

    let count = (data[0] & 0x7F) as usize;
    if count == 0 || count > 4 {
        return Err(CryptoError::Asn1("Unsupported length encoding".to_string()));
    }
    if data.len() < 1 + count {
        return Err(CryptoError::Asn1("Length bytes missing".to_string()));
    }

    let len = data[1..=count]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok((len, 1 + count))
}

/// Unsigned big-endian value of an INTEGER's content bytes
pub fn integer_value(content: &[u8]) -> &[u8] {
    let start = content.iter().position(|b| *b != 0).unwrap_or(content.len());
    &content[start..]
}
